use pulse_types::EthAddress;

const CHALLENGE_DOMAIN: &str = "pulse-auth";

/// Builds the one-time challenge text a wallet must personal-sign.
///
/// Embeds the wallet, a handshake nonce and the issue timestamp so the
/// signed text is bound to exactly one registration attempt.
pub fn build_challenge(wallet: &EthAddress, nonce: &str, issued_at: i64) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        CHALLENGE_DOMAIN,
        wallet.to_hex(),
        nonce,
        issued_at,
        super::random_hex::<8>(),
    )
}

/// Fresh handshake nonce.
pub fn generate_nonce() -> String {
    super::random_hex::<16>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_embeds_wallet_and_nonce() {
        let wallet = EthAddress::from_bytes([0x11; 20]);
        let text = build_challenge(&wallet, "abcd", 1_700_000_000);
        assert!(text.starts_with("pulse-auth:"));
        assert!(text.contains(&wallet.to_hex()));
        assert!(text.contains(":abcd:"));
        assert!(text.contains(":1700000000:"));
    }

    #[test]
    fn test_challenges_are_unique_per_issue() {
        let wallet = EthAddress::from_bytes([0x11; 20]);
        let a = build_challenge(&wallet, "abcd", 1_700_000_000);
        let b = build_challenge(&wallet, "abcd", 1_700_000_000);
        assert_ne!(a, b);
    }

    #[test]
    fn test_nonce_is_32_hex_chars() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), 32);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
