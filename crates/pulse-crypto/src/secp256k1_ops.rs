use pulse_types::{EcdsaSignature, EthAddress, PulseError, PulseResult};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

thread_local! {
    static SECP256K1_CTX: Secp256k1<secp256k1::All> = Secp256k1::new();
}

/// EIP-191 hash of an arbitrary message, as produced by wallet
/// `personal_sign`.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

fn eth_address_of(pubkey: &PublicKey) -> EthAddress {
    let uncompressed = pubkey.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    EthAddress::from_bytes(address)
}

/// Recovers the signing address from a recoverable signature over a
/// 32-byte message hash.
pub fn recover_address(
    signature: &EcdsaSignature,
    message_hash: &[u8; 32],
) -> PulseResult<EthAddress> {
    SECP256K1_CTX.with(|ctx| {
        let v = if signature.v >= 27 {
            signature.v - 27
        } else {
            signature.v
        };

        let recovery_id = secp256k1::ecdsa::RecoveryId::from_i32(v as i32)
            .map_err(|e| PulseError::InvalidSignature(e.to_string()))?;

        let mut sig_bytes = [0u8; 64];
        sig_bytes[..32].copy_from_slice(&signature.r);
        sig_bytes[32..].copy_from_slice(&signature.s);

        let recoverable_sig =
            secp256k1::ecdsa::RecoverableSignature::from_compact(&sig_bytes, recovery_id)
                .map_err(|e| PulseError::InvalidSignature(e.to_string()))?;

        let message = Message::from_digest_slice(message_hash)
            .map_err(|e| PulseError::Crypto(e.to_string()))?;

        let public_key = ctx
            .recover_ecdsa(&message, &recoverable_sig)
            .map_err(|e| PulseError::InvalidSignature(e.to_string()))?;

        Ok(eth_address_of(&public_key))
    })
}

/// Recovers the address that personal-signed `message`.
pub fn recover_personal_signer(
    signature: &EcdsaSignature,
    message: &[u8],
) -> PulseResult<EthAddress> {
    let hash = personal_message_hash(message);
    recover_address(signature, &hash)
}

/// True when `signature` over `message` (EIP-191) was produced by
/// `expected`.
pub fn verify_personal_signature(
    signature: &EcdsaSignature,
    message: &[u8],
    expected: &EthAddress,
) -> PulseResult<bool> {
    let recovered = recover_personal_signer(signature, message)?;
    Ok(recovered == *expected)
}

/// Signs a 32-byte hash with a recoverable signature. Used by node clients
/// and the handshake tests; the daemon itself never holds a signing key.
pub fn sign_message(secret: &SecretKey, message_hash: &[u8; 32]) -> PulseResult<EcdsaSignature> {
    SECP256K1_CTX.with(|ctx| {
        let message = Message::from_digest_slice(message_hash)
            .map_err(|e| PulseError::Crypto(e.to_string()))?;

        let (recovery_id, signature) = ctx
            .sign_ecdsa_recoverable(&message, secret)
            .serialize_compact();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&signature[..32]);
        s.copy_from_slice(&signature[32..]);

        let v = recovery_id.to_i32() as u8 + 27;

        Ok(EcdsaSignature::new(r, s, v))
    })
}

/// EIP-191 signature over `message`.
pub fn sign_personal_message(secret: &SecretKey, message: &[u8]) -> PulseResult<EcdsaSignature> {
    let hash = personal_message_hash(message);
    sign_message(secret, &hash)
}

/// Address controlled by `secret`.
pub fn address_of_secret(secret: &SecretKey) -> EthAddress {
    SECP256K1_CTX.with(|ctx| eth_address_of(&PublicKey::from_secret_key(ctx, secret)))
}
