//! Vocab and merges artifacts.
//!
//! Tokens are arbitrary bytes, so each byte is stored as the code point with
//! the same value (U+0000..=U+00FF). The vocab file is a JSON object keyed by
//! decimal id; the merges file is a JSON array of `[left, right]` pairs in
//! creation order.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ArtifactError;
use crate::types::{MergeRule, TokenId, Vocab};

type Result<T> = std::result::Result<T, ArtifactError>;

type VocabJson = BTreeMap<TokenId, String>;
type MergesJson = Vec<(String, String)>;

/// Maps each byte to the code point of the same value.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Inverse of [`bytes_to_text`].
///
/// # Errors
///
/// Returns [`ArtifactError::NonByteChar`] for a code point above U+00FF.
pub fn text_to_bytes(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| u8::try_from(c).map_err(|_| ArtifactError::NonByteChar(c)))
        .collect()
}

/// Paths `dir/{name}.vocab.json` and `dir/{name}.merges.json`.
pub fn artifact_paths(dir: impl AsRef<Path>, name: &str) -> (PathBuf, PathBuf) {
    let dir = dir.as_ref();
    (
        dir.join(format!("{name}.vocab.json")),
        dir.join(format!("{name}.merges.json")),
    )
}

pub fn vocab_to_json(vocab: &Vocab) -> Result<String> {
    Ok(serde_json::to_string(&vocab_to_repr(vocab))?)
}

pub fn vocab_from_json(json: &str) -> Result<Vocab> {
    vocab_from_repr(serde_json::from_str(json)?)
}

pub fn merges_to_json(merges: &[MergeRule]) -> Result<String> {
    Ok(serde_json::to_string(&merges_to_repr(merges))?)
}

pub fn merges_from_json(json: &str) -> Result<Vec<MergeRule>> {
    merges_from_repr(serde_json::from_str(json)?)
}

/// Writes `vocab` and `merges` to their artifact files.
///
/// Missing parent directories are created.
///
/// # Errors
///
/// IO failures carry the path being written.
pub fn save_vocab_and_merges(
    vocab: &Vocab,
    merges: &[MergeRule],
    vocab_path: impl AsRef<Path>,
    merges_path: impl AsRef<Path>,
) -> Result<()> {
    write_json(vocab_path.as_ref(), &vocab_to_repr(vocab))?;
    write_json(merges_path.as_ref(), &merges_to_repr(merges))?;
    debug!(
        "saved {} vocab entries and {} merges",
        vocab.len(),
        merges.len()
    );
    Ok(())
}

/// Reads artifacts written by [`save_vocab_and_merges`].
///
/// # Errors
///
/// Returns an [`ArtifactError`] if either file cannot be read, is not the
/// expected JSON shape, has a non-numeric vocab key, or holds a code point
/// above U+00FF.
pub fn load_vocab_and_merges(
    vocab_path: impl AsRef<Path>,
    merges_path: impl AsRef<Path>,
) -> Result<(Vocab, Vec<MergeRule>)> {
    let vocab = vocab_from_repr(read_json(vocab_path.as_ref())?)?;
    let merges = merges_from_repr(read_json(merges_path.as_ref())?)?;
    Ok((vocab, merges))
}

fn vocab_to_repr(vocab: &Vocab) -> VocabJson {
    vocab
        .iter()
        .map(|(&id, token)| (id, bytes_to_text(token)))
        .collect()
}

fn vocab_from_repr(repr: VocabJson) -> Result<Vocab> {
    repr.into_iter()
        .map(|(id, text)| Ok((id, text_to_bytes(&text)?)))
        .collect()
}

fn merges_to_repr(merges: &[MergeRule]) -> MergesJson {
    merges
        .iter()
        .map(|m| (bytes_to_text(&m.left), bytes_to_text(&m.right)))
        .collect()
}

fn merges_from_repr(repr: MergesJson) -> Result<Vec<MergeRule>> {
    repr.into_iter()
        .map(|(left, right)| Ok(MergeRule::new(text_to_bytes(&left)?, text_to_bytes(&right)?)))
        .collect()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let io_err = |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::byte_vocab;

    fn sample() -> (Vocab, Vec<MergeRule>) {
        let mut vocab = byte_vocab();
        vocab.insert(256, b"<|endoftext|>".to_vec());
        vocab.insert(257, vec![0xE2, 0x82]);
        vocab.insert(258, b"th".to_vec());
        let merges = vec![MergeRule::new(vec![0xE2], vec![0x82]), MergeRule::new("t", "h")];
        (vocab, merges)
    }

    #[test]
    fn test_latin1_mapping() {
        assert_eq!(bytes_to_text(&[0x41, 0xFF, 0x00]), "A\u{ff}\u{0}");
        assert_eq!(
            text_to_bytes("A\u{ff}\u{0}").expect("decode failed"),
            vec![0x41, 0xFF, 0x00]
        );
    }

    #[test]
    fn test_code_point_above_ff_rejected() {
        assert!(matches!(
            text_to_bytes("\u{100}"),
            Err(ArtifactError::NonByteChar('\u{100}'))
        ));
    }

    #[test]
    fn test_save_load_exact() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let (vocab_path, merges_path) = artifact_paths(dir.path().join("nested"), "tok");
        let (vocab, merges) = sample();

        save_vocab_and_merges(&vocab, &merges, &vocab_path, &merges_path).expect("save failed");
        let (loaded_vocab, loaded_merges) =
            load_vocab_and_merges(&vocab_path, &merges_path).expect("load failed");

        assert_eq!(loaded_vocab, vocab);
        assert_eq!(loaded_merges, merges);
    }

    #[test]
    fn test_artifact_paths() {
        let (v, m) = artifact_paths("/out", "tinystories");
        assert_eq!(v, PathBuf::from("/out/tinystories.vocab.json"));
        assert_eq!(m, PathBuf::from("/out/tinystories.merges.json"));
    }

    #[test]
    fn test_vocab_json_keys_are_decimal_strings() {
        let mut vocab = Vocab::new();
        vocab.insert(2, b"b".to_vec());
        vocab.insert(10, b"k".to_vec());
        let json = vocab_to_json(&vocab).expect("serialize failed");
        assert_eq!(json, r#"{"2":"b","10":"k"}"#);
    }

    #[test]
    fn test_merges_json_shape() {
        let json = merges_to_json(&[MergeRule::new(" ", "t")]).expect("serialize failed");
        assert_eq!(json, r#"[[" ","t"]]"#);
        let merges = merges_from_json(&json).expect("parse failed");
        assert_eq!(merges, vec![MergeRule::new(" ", "t")]);
    }

    #[test]
    fn test_non_numeric_key_rejected() {
        assert!(vocab_from_json(r#"{"x":"a"}"#).is_err());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let missing = dir.path().join("missing.vocab.json");
        let err = load_vocab_and_merges(&missing, &missing).expect_err("load should fail");
        match err {
            ArtifactError::Io { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }
}
