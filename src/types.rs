//! Type aliases and shared types for BPE training and encoding.
//!
//! These type aliases provide semantic clarity throughout the codebase.

use std::collections::BTreeMap;

/// Represents a token identifier in the vocabulary.
///
/// Ids 0-255 are reserved for the single-byte tokens; special tokens and
/// learned merges are assigned sequentially after them.
pub type TokenId = u32;

/// The byte content of a token.
///
/// Not necessarily valid UTF-8: a merge can straddle a multi-byte character.
pub type Token = Vec<u8>;

/// Vocabulary mapping token ids to their bytes.
///
/// Ordered by id so artifacts are written deterministically.
pub type Vocab = BTreeMap<TokenId, Token>;

/// Frequency count for words and symbol pairs during training.
pub(crate) type TokenFreq = u64;

/// Merge order indicates when a merge rule was learned during training.
///
/// Lower values represent earlier merges (e.g., 0 = first merge, 1 = second merge).
pub(crate) type MergeOrder = usize;

/// Number of single-byte tokens at the start of every vocabulary.
pub const BYTE_VOCAB_SIZE: usize = 256;

/// A learned merge rule: two adjacent tokens that combine into one.
///
/// The list of rules, in creation order, is part of the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MergeRule {
    pub left: Token,
    pub right: Token,
}

impl MergeRule {
    pub fn new(left: impl Into<Token>, right: impl Into<Token>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Bytes of the token produced by this rule.
    pub fn merged(&self) -> Token {
        let mut out = Vec::with_capacity(self.left.len() + self.right.len());
        out.extend_from_slice(&self.left);
        out.extend_from_slice(&self.right);
        out
    }
}

/// A pair of adjacent token ids.
///
/// Used as a key for looking up merge rules during encoding and for
/// tracking pair frequencies during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TokenPair(pub(crate) TokenId, pub(crate) TokenId);

/// Builds the 256-entry byte vocabulary.
pub fn byte_vocab() -> Vocab {
    (0..=u8::MAX).map(|b| (TokenId::from(b), vec![b])).collect()
}
