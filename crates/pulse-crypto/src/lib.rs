#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod challenge;
pub mod fingerprint;
pub mod secp256k1_ops;

pub use challenge::*;
pub use fingerprint::*;
pub use secp256k1_ops::*;

pub fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Random lowercase-hex string of `2 * N` characters.
pub fn random_hex<const N: usize>() -> String {
    hex::encode(random_bytes::<N>())
}
