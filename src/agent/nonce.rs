use ethers::{
    core::rand::{thread_rng, RngCore},
    types::U256,
};

/// Random bytes forming the 192-bit nonce key.
pub const NONCE_KEY_BYTES: usize = 24;

/// Fresh nonce on a random key with sequence zero.
///
/// The entry point tracks a separate sequence per 192-bit key, so operations
/// prepared concurrently do not contend for one counter. Two calls picking
/// the same key collide and the relay rejects the second one.
pub fn random_nonce() -> U256 {
    let mut word = [0u8; 32];
    thread_rng().fill_bytes(&mut word[..NONCE_KEY_BYTES]);
    U256::from_big_endian(&word)
}

/// Upper 192 bits of a nonce.
pub fn nonce_key(nonce: U256) -> U256 {
    nonce >> 64
}

/// Lower 64 bits of a nonce.
pub fn nonce_sequence(nonce: U256) -> u64 {
    nonce.low_u64()
}
