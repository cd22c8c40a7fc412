//! Short opaque identifier generation for documents and changes.
//!
//! `uuid` gives us 36-char (or 32 hex) ids; the wire format here calls for
//! 22-char doc ids and 8-char change ids sampled from a 62-char alphabet,
//! so we sample directly with `rand` instead.

use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

const DOC_ID_LEN: usize = 22;
const CHANGE_ID_LEN: usize = 8;

fn sample(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

/// Generate a new globally-unique document id (22 chars).
pub fn new_doc_id() -> String {
    sample(DOC_ID_LEN)
}

/// Generate a new globally-unique change id (8 chars).
pub fn new_change_id() -> String {
    sample(CHANGE_ID_LEN)
}
