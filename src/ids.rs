//! Session identifier generation.

use rand::Rng;

/// Length of identifiers produced by [`RandomIdGenerator`].
pub const SESSION_ID_LEN: usize = 17;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Source of opaque, unique identifiers.
pub trait IdGenerator: Send + Sync + 'static {
    /// Produce a fresh identifier.
    fn new_id(&self) -> String;
}

/// Random identifiers drawn from `[a-zA-Z]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn new_id(&self) -> String {
        let mut rng = rand::rng();
        (0..SESSION_ID_LEN)
            .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
            .collect()
    }
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync + 'static,
{
    fn new_id(&self) -> String { self() }
}
