use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Produces a standard RNG for cryptographic use: key generation, nonce generation, and
/// randomized ECDSA signing.
pub fn crypto_rng() -> ChaCha20Rng {
    ChaCha20Rng::from_entropy()
}

/// Helper utility to get the current time in milliseconds since the Unix epoch. This is the finest
/// level of precision on timestamps supported by BanyanFS and matches the precision of other
/// formats.
///
/// The underlying time library is likely to be removed in favor of more standard uses to reduce
/// the dependency footprint in some of the environments we target.
pub fn current_time_ms() -> i64 {
    use time::OffsetDateTime;
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Useful as a low character count way to generate informative [`std::io::Error`] error messages.
/// Maybe be removed in the future for concrete error types.
pub(crate) fn std_io_err(msg: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, msg)
}
