//! Byte-level BPE tokenizer.
//!
//! - [`trainer`] learns a vocab and an ordered merge list from a corpus.
//! - [`serializer`] stores both losslessly as JSON.
//! - [`Tokenizer`] replays the merges to encode text and decodes ids back.
//! - [`batch`] samples next-token training windows from encoded ids.
//!
//! Python bindings are available behind the `python` feature.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]

pub mod batch;
pub mod error;
pub mod pretokenizer;
pub mod serializer;
pub mod tokenizer;
pub mod trainer;
pub mod types;

mod converter;

#[cfg(feature = "python")]
mod python;

pub use batch::{get_batch, Batch};
pub use error::{Error, Result};
pub use pretokenizer::{Pretoken, Pretokenizer};
pub use serializer::{artifact_paths, load_vocab_and_merges, save_vocab_and_merges};
pub use tokenizer::Tokenizer;
pub use trainer::{train_bpe, train_bpe_from_file, BpeTrainer, StopReason, TrainOutput, TrainerConfig};
pub use types::{MergeRule, Token, TokenId, Vocab};
