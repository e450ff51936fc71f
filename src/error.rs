//! Error types for BPE tokenizer and trainer operations.

use std::path::PathBuf;

use indicatif::style::TemplateError;
use thiserror::Error;

use crate::types::TokenId;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by the public API.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    TokenizerInit(#[from] TokenizerInitError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// Invalid trainer or pretokenizer configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("vocab_size must be positive")]
    ZeroVocabSize,

    #[error("vocab_size={requested} < initial vocab size {initial}")]
    VocabBelowInitial { requested: usize, initial: usize },

    #[error("special tokens must not be empty strings")]
    EmptySpecialToken,
}

/// Errors that can occur during training.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Corpus file could not be read.
    #[error("failed to read corpus {path}: {source}")]
    Corpus {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(#[from] TemplateError),
}

/// Errors that can occur when initializing a tokenizer.
#[derive(Error, Debug)]
pub enum TokenizerInitError {
    /// The special-token pattern failed to compile.
    #[error("invalid special-token pattern: {0}")]
    InvalidPattern(#[from] Box<fancy_regex::Error>),

    /// A byte id is missing or does not map to its own byte.
    #[error("vocab id {0} must map to the single byte {0}")]
    MissingByteToken(u8),

    /// A merge rule references bytes with no vocabulary entry.
    #[error("merge rule {index} references a token missing from the vocab: {token:?}")]
    UnknownMergeToken { index: usize, token: Vec<u8> },

    /// A configured special token has no vocabulary entry.
    #[error("special token {0:?} is not in the vocab")]
    UnknownSpecialToken(String),
}

/// Errors that can occur during text encoding.
#[derive(Error, Debug)]
pub enum EncodeError {
    /// Regex engine failed while locating special tokens.
    #[error("regex match failed: {0}")]
    RegexMatch(String),

    /// A merged symbol has no id; the vocab and merges are inconsistent.
    #[error("symbol missing from vocab: {0:?}")]
    UnknownSymbol(Vec<u8>),
}

/// Errors that can occur during token decoding.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Token ID not found in vocabulary.
    #[error("unknown token id: {0}")]
    UnknownToken(TokenId),
}

/// Errors reading or writing vocab/merges artifacts.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("serde_json error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// A token string holds a code point outside U+0000..=U+00FF.
    #[error("character {0:?} does not encode a byte")]
    NonByteChar(char),
}

/// Errors sampling training batches.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BatchError {
    #[error("dataset too small (len={len}) for context_length={context_length}")]
    DatasetTooSmall { len: usize, context_length: usize },
}

impl From<fancy_regex::Error> for TokenizerInitError {
    fn from(e: fancy_regex::Error) -> Self {
        Self::InvalidPattern(Box::new(e))
    }
}
