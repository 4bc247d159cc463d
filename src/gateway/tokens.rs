//! Token counting with the `o200k_base` vocabulary.

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

static ENCODER: Lazy<CoreBPE> =
    Lazy::new(|| tiktoken_rs::o200k_base().expect("embedded o200k_base vocabulary"));

/// Number of `o200k_base` tokens in a text.
pub fn count_tokens(text: &str) -> usize {
    ENCODER.encode_with_special_tokens(text).len()
}
