//! Identifier and activation-token generation.

use rand::Rng;

/// The 62-character alphabet used for stream ids, target ids, and
/// activation tokens.
const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of every identifier and token the vault mints.
const ID_LEN: usize = 36;

/// Returns a random sequence of `len` characters from the id alphabet.
#[must_use]
pub fn rand_seq(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Mints a fresh 36-character stream id.
#[must_use]
pub fn new_stream_id() -> String {
    rand_seq(ID_LEN)
}

/// Mints a fresh 36-character activation token.
#[must_use]
pub fn new_token() -> String {
    rand_seq(ID_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rand_seq_length_and_alphabet() {
        let s = rand_seq(36);
        assert_eq!(s.len(), 36);
        assert!(s.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_tokens_are_distinct() {
        let tokens: HashSet<String> = (0..1000).map(|_| new_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
