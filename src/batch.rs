//! Random next-token training windows over a flat id sequence.

use rand::Rng;

use crate::error::{BatchError, Result};
use crate::types::TokenId;

/// `batch_size` input rows and the same rows shifted one position right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub inputs: Vec<Vec<TokenId>>,
    pub targets: Vec<Vec<TokenId>>,
}

/// Samples `batch_size` windows of `context_length` ids from `data`.
///
/// Each start is drawn uniformly from `[0, data.len() - context_length)`;
/// row `i` of `targets` is row `i` of `inputs` shifted by one.
///
/// # Errors
///
/// Returns [`BatchError::DatasetTooSmall`] if `data.len() <= context_length`.
pub fn get_batch<R: Rng + ?Sized>(
    data: &[TokenId],
    batch_size: usize,
    context_length: usize,
    rng: &mut R,
) -> Result<Batch> {
    let len = data.len();
    if len <= context_length {
        return Err(BatchError::DatasetTooSmall {
            len,
            context_length,
        }
        .into());
    }

    let num_starts = len - context_length;
    let mut inputs = Vec::with_capacity(batch_size);
    let mut targets = Vec::with_capacity(batch_size);

    for _ in 0..batch_size {
        let start = rng.gen_range(0..num_starts);
        inputs.push(data[start..start + context_length].to_vec());
        targets.push(data[start + 1..start + context_length + 1].to_vec());
    }

    Ok(Batch { inputs, targets })
}
