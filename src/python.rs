//! Python bindings, exposed as the `_bytepair` extension module.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::serializer::save_vocab_and_merges;
use crate::trainer::{train_bpe_from_file, TrainerConfig};
use crate::types::TokenId;
use crate::Tokenizer;

fn to_py_err(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Python wrapper for [`Tokenizer`].
#[pyclass(name = "Tokenizer")]
pub struct PyTokenizer {
    inner: Tokenizer,
}

#[pymethods]
impl PyTokenizer {
    #[staticmethod]
    #[pyo3(signature = (vocab_path, merges_path, special_tokens = None))]
    fn from_files(
        vocab_path: &str,
        merges_path: &str,
        special_tokens: Option<Vec<String>>,
    ) -> PyResult<Self> {
        let special_tokens = special_tokens.unwrap_or_default();
        let inner =
            Tokenizer::from_files(vocab_path, merges_path, &special_tokens).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    fn encode(&self, py: Python<'_>, text: &str) -> PyResult<Vec<TokenId>> {
        py.allow_threads(|| self.inner.encode(text)).map_err(to_py_err)
    }

    fn decode(&self, ids: Vec<TokenId>) -> PyResult<String> {
        self.inner.decode(&ids).map_err(to_py_err)
    }

    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }
}

/// Trains on the file at `input_path` and writes the artifacts.
///
/// Returns `(vocab_size, num_merges)`.
#[pyfunction]
#[pyo3(signature = (input_path, vocab_size, special_tokens, vocab_path, merges_path))]
fn train_bpe(
    py: Python<'_>,
    input_path: &str,
    vocab_size: usize,
    special_tokens: Vec<String>,
    vocab_path: &str,
    merges_path: &str,
) -> PyResult<(usize, usize)> {
    let config = TrainerConfig::new(vocab_size, special_tokens);
    let out = py
        .allow_threads(|| train_bpe_from_file(input_path, &config))
        .map_err(to_py_err)?;
    save_vocab_and_merges(&out.vocab, &out.merges, vocab_path, merges_path).map_err(to_py_err)?;
    Ok((out.vocab.len(), out.merges.len()))
}

#[pymodule]
fn _bytepair(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTokenizer>()?;
    m.add_function(wrap_pyfunction!(train_bpe, m)?)?;
    Ok(())
}
