//! Byte-level BPE tokenizer built from a trained vocab and merge list.
//!
//! Encoding pipeline:
//! 1. Pretokenize, keeping special tokens atomic.
//! 2. Map each ordinary pretoken to its single-byte ids.
//! 3. Replay the merge rules in training order.
//!
//! Decoding concatenates token bytes and replaces invalid UTF-8 with U+FFFD.

use std::collections::HashMap;
use std::path::Path;

use log::{debug, warn};

use crate::{
    converter::BpeConverter,
    error::{DecodeError, EncodeError, Result, TokenizerInitError},
    pretokenizer::Pretokenizer,
    serializer::load_vocab_and_merges,
    types::{MergeRule, Token, TokenId, Vocab},
};

/// Encoder/decoder over a fixed vocab and merge list.
///
/// The vocab and merges are immutable once the tokenizer is built; the
/// reverse index and merge table are derived at construction.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: Vocab,
    merges: Vec<MergeRule>,
    pretokenizer: Pretokenizer,
    converter: BpeConverter,

    /// Token bytes to id. Single bytes map to their byte id; other
    /// duplicated bytes map to the highest id holding them.
    token_ids: HashMap<Token, TokenId>,

    /// Special token to the lowest id holding its bytes.
    special_ids: HashMap<String, TokenId>,
}

impl Tokenizer {
    /// Builds a tokenizer from a vocab, ordered merge rules and special tokens.
    ///
    /// # Arguments
    ///
    /// * `vocab` - Id to token bytes; ids 0-255 must be the single bytes.
    /// * `merges` - Merge rules in creation order.
    /// * `special_tokens` - Strings kept atomic during encoding. Each must
    ///   appear in `vocab`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizerInitError::MissingByteToken`] if a byte id is absent
    /// or remapped, [`TokenizerInitError::UnknownMergeToken`] if a merge rule
    /// references bytes outside the vocab, and
    /// [`TokenizerInitError::UnknownSpecialToken`] for an unmapped special
    /// token. Empty special tokens are a [`crate::error::ConfigError`].
    pub fn new<S: AsRef<str>>(
        vocab: Vocab,
        merges: Vec<MergeRule>,
        special_tokens: &[S],
    ) -> Result<Self> {
        let pretokenizer = Pretokenizer::new(special_tokens)?;

        for b in 0..=u8::MAX {
            match vocab.get(&TokenId::from(b)) {
                Some(token) if token.as_slice() == [b] => {}
                _ => return Err(TokenizerInitError::MissingByteToken(b).into()),
            }
        }

        let (token_ids, lowest_ids) = reverse_index(&vocab);

        let mut special_ids = HashMap::with_capacity(special_tokens.len());
        for special in pretokenizer.special_tokens() {
            let id = lowest_ids
                .get(special.as_bytes())
                .copied()
                .ok_or_else(|| TokenizerInitError::UnknownSpecialToken(special.clone()))?;
            special_ids.insert(special.clone(), id);
        }

        let mut history = Vec::with_capacity(merges.len());
        for (index, rule) in merges.iter().enumerate() {
            let lookup = |token: Token| {
                token_ids
                    .get(&token)
                    .copied()
                    .ok_or(TokenizerInitError::UnknownMergeToken { index, token })
            };
            let left = lookup(rule.left.clone())?;
            let right = lookup(rule.right.clone())?;
            let merged = lookup(rule.merged())?;
            history.push(((left, right), merged));
        }
        let converter = BpeConverter::new(history);

        debug!(
            "tokenizer ready: {} vocab entries, {} merges, {} special tokens",
            vocab.len(),
            converter.num_merges(),
            special_ids.len()
        );

        Ok(Self {
            vocab,
            merges,
            pretokenizer,
            converter,
            token_ids,
            special_ids,
        })
    }

    /// Loads vocab and merges artifacts and builds a tokenizer from them.
    pub fn from_files<S: AsRef<str>>(
        vocab_path: impl AsRef<Path>,
        merges_path: impl AsRef<Path>,
        special_tokens: &[S],
    ) -> Result<Self> {
        let (vocab, merges) = load_vocab_and_merges(vocab_path, merges_path)?;
        Self::new(vocab, merges, special_tokens)
    }

    /// Encodes `text` into token ids.
    ///
    /// Special tokens map to their own id. Every other pretoken starts as
    /// single bytes and has each merge rule applied in training order.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::RegexMatch`] if the special-token matcher fails.
    pub fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        let mut ids = Vec::with_capacity(text.len() / 3);

        for pretoken in self.pretokenizer.pretokens(text) {
            let pretoken = pretoken?;

            if pretoken.special {
                let id = self
                    .special_ids
                    .get(pretoken.text)
                    .copied()
                    .ok_or_else(|| EncodeError::UnknownSymbol(pretoken.as_bytes().to_vec()))?;
                ids.push(id);
                continue;
            }

            let bytes: Vec<TokenId> = pretoken.as_bytes().iter().map(|&b| TokenId::from(b)).collect();
            ids.extend(self.converter.encode(bytes));
        }

        Ok(ids)
    }

    /// Lazily encodes a sequence of texts, yielding ids in order.
    ///
    /// Texts are encoded independently; no merge spans two texts. Only the
    /// text currently being yielded is held in memory.
    pub fn encode_iterable<'a, I>(&'a self, texts: I) -> impl Iterator<Item = Result<TokenId>> + 'a
    where
        I: IntoIterator + 'a,
        I::IntoIter: 'a,
        I::Item: AsRef<str>,
    {
        texts.into_iter().flat_map(move |text| match self.encode(text.as_ref()) {
            Ok(ids) => ids.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        })
    }

    /// Concatenated bytes of `ids`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] for an id outside the vocab.
    pub fn decode_bytes(&self, ids: &[TokenId]) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(ids.len() * 2);
        for &id in ids {
            let token = self.vocab.get(&id).ok_or(DecodeError::UnknownToken(id))?;
            bytes.extend_from_slice(token);
        }
        Ok(bytes)
    }

    /// Decodes `ids` to text, replacing each invalid UTF-8 run with U+FFFD.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] for an id outside the vocab.
    pub fn decode(&self, ids: &[TokenId]) -> Result<String> {
        let bytes = self.decode_bytes(ids)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }

    pub fn special_tokens(&self) -> &[String] {
        self.pretokenizer.special_tokens()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Id for `token`; special tokens resolve to their own id.
    pub fn token_to_id(&self, token: &[u8]) -> Option<TokenId> {
        if let Ok(text) = std::str::from_utf8(token) {
            if let Some(&id) = self.special_ids.get(text) {
                return Some(id);
            }
        }
        self.token_ids.get(token).copied()
    }

    pub fn id_to_token(&self, id: TokenId) -> Option<&[u8]> {
        self.vocab.get(&id).map(Vec::as_slice)
    }
}

/// Builds `(bytes -> highest id, bytes -> lowest id)`, with single bytes
/// pinned to their byte id in the first map.
fn reverse_index(vocab: &Vocab) -> (HashMap<Token, TokenId>, HashMap<Token, TokenId>) {
    let mut highest = HashMap::with_capacity(vocab.len());
    let mut lowest = HashMap::with_capacity(vocab.len());
    let mut duplicates = 0usize;

    // ascending id order: later inserts overwrite, first insert is kept.
    for (&id, token) in vocab {
        if highest.insert(token.clone(), id).is_some() {
            duplicates += 1;
        }
        lowest.entry(token.clone()).or_insert(id);
    }

    for b in 0..=u8::MAX {
        highest.insert(vec![b], TokenId::from(b));
    }

    if duplicates > 0 {
        warn!("vocab holds {duplicates} duplicate token(s); encoding uses the highest id");
    }

    (highest, lowest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, Error};
    use crate::types::byte_vocab;

    const EOT: &str = "<|endoftext|>";

    /// Vocab and merges for the classic "low lower" example.
    fn model() -> (Vocab, Vec<MergeRule>) {
        let mut vocab = byte_vocab();
        vocab.insert(256, EOT.as_bytes().to_vec());
        let merges = vec![
            MergeRule::new(" ", "l"),
            MergeRule::new("o", "w"),
            MergeRule::new(" l", "ow"),
            MergeRule::new("l", "ow"),
            MergeRule::new("e", "r"),
        ];
        let mut next = 257;
        for rule in &merges {
            vocab.insert(next, rule.merged());
            next += 1;
        }
        (vocab, merges)
    }

    fn tokenizer(specials: &[&str]) -> Tokenizer {
        let (vocab, merges) = model();
        Tokenizer::new(vocab, merges, specials).expect("tokenizer init failed")
    }

    fn ids_to_tokens(tok: &Tokenizer, ids: &[TokenId]) -> Vec<Vec<u8>> {
        ids.iter()
            .map(|&id| tok.id_to_token(id).expect("id in vocab").to_vec())
            .collect()
    }

    #[test]
    fn test_encode_applies_merges() {
        let tok = tokenizer(&[]);
        let ids = tok.encode("low lower").expect("encode failed");
        assert_eq!(
            ids_to_tokens(&tok, &ids),
            vec![b"low".to_vec(), b" low".to_vec(), b"er".to_vec()]
        );
    }

    #[test]
    fn test_special_token_single_id() {
        let tok = tokenizer(&[EOT]);
        let ids = tok.encode(&format!("low{EOT}low")).expect("encode failed");
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[1], 256);
    }

    #[test]
    fn test_special_token_without_config_is_split() {
        let tok = tokenizer(&[]);
        let ids = tok.encode(EOT).expect("encode failed");
        assert!(ids.len() > 1);
        assert!(!ids.contains(&256));
    }

    #[test]
    fn test_round_trip() {
        let tok = tokenizer(&[EOT]);
        let text = format!("lower slow, lowest 42!\n{EOT} héllo 🙂");
        let ids = tok.encode(&text).expect("encode failed");
        assert_eq!(tok.decode(&ids).expect("decode failed"), text);
    }

    #[test]
    fn test_empty_text() {
        let tok = tokenizer(&[]);
        assert!(tok.encode("").expect("encode failed").is_empty());
        assert_eq!(tok.decode(&[]).expect("decode failed"), "");
    }

    #[test]
    fn test_decode_invalid_utf8_uses_replacement() {
        let tok = tokenizer(&[]);
        // first two bytes of the three-byte encoding of U+20AC
        let decoded = tok.decode(&[0xE2, 0x82, 0x41]).expect("decode failed");
        assert_eq!(decoded, "\u{FFFD}A");
    }

    #[test]
    fn test_decode_unknown_id() {
        let tok = tokenizer(&[]);
        let err = tok.decode(&[97, 9999]).expect_err("decode should fail");
        assert!(matches!(err, Error::Decode(DecodeError::UnknownToken(9999))));
    }

    #[test]
    fn test_merges_replay_in_training_order() {
        // a frequency-driven encoder would pick "bc" first.
        let mut vocab = byte_vocab();
        let merges = vec![MergeRule::new("a", "b"), MergeRule::new("b", "c")];
        vocab.insert(256, b"ab".to_vec());
        vocab.insert(257, b"bc".to_vec());
        let tok = Tokenizer::new(vocab, merges, &[] as &[&str]).expect("init failed");

        let ids = tok.encode("abcbcbc").expect("encode failed");
        assert_eq!(ids, vec![256, 99, 257, 257]);
    }

    #[test]
    fn test_encode_iterable_matches_encode() {
        let tok = tokenizer(&[EOT]);
        let texts = vec!["low lower\n", "slow", EOT];
        let expected: Vec<TokenId> = texts
            .iter()
            .flat_map(|t| tok.encode(t).expect("encode failed"))
            .collect();
        let streamed: Vec<TokenId> = tok
            .encode_iterable(texts.iter().copied())
            .collect::<Result<_>>()
            .expect("streaming encode failed");
        assert_eq!(streamed, expected);
    }

    #[test]
    fn test_encode_iterable_is_lazy() {
        let tok = tokenizer(&[]);
        let mut stream = tok.encode_iterable(std::iter::repeat("low"));
        let first: Vec<TokenId> = stream
            .by_ref()
            .take(3)
            .collect::<Result<_>>()
            .expect("streaming encode failed");
        assert_eq!(first, vec![260, 260, 260]);
    }

    #[test]
    fn test_missing_byte_token_rejected() {
        let (mut vocab, merges) = model();
        vocab.remove(&65);
        let err = Tokenizer::new(vocab, merges, &[] as &[&str]).expect_err("init should fail");
        assert!(matches!(
            err,
            Error::TokenizerInit(TokenizerInitError::MissingByteToken(65))
        ));
    }

    #[test]
    fn test_unknown_merge_token_rejected() {
        let (vocab, mut merges) = model();
        merges.push(MergeRule::new("x", "y"));
        let err = Tokenizer::new(vocab, merges, &[] as &[&str]).expect_err("init should fail");
        match err {
            Error::TokenizerInit(TokenizerInitError::UnknownMergeToken { index, token }) => {
                assert_eq!(index, 5);
                assert_eq!(token, b"xy".to_vec());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_special_token_rejected() {
        let (vocab, merges) = model();
        let err = Tokenizer::new(vocab, merges, &["<pad>"]).expect_err("init should fail");
        assert!(matches!(
            err,
            Error::TokenizerInit(TokenizerInitError::UnknownSpecialToken(ref s)) if s == "<pad>"
        ));
    }

    #[test]
    fn test_empty_special_token_rejected() {
        let (vocab, merges) = model();
        let err = Tokenizer::new(vocab, merges, &[""]).expect_err("init should fail");
        assert!(matches!(err, Error::Config(ConfigError::EmptySpecialToken)));
    }

    #[test]
    fn test_duplicate_vocab_entries() {
        let mut vocab = byte_vocab();
        vocab.insert(256, b"ab".to_vec());
        vocab.insert(257, b"ab".to_vec());
        let merges = vec![MergeRule::new("a", "b")];
        let tok = Tokenizer::new(vocab, merges, &["ab"]).expect("init failed");

        // special "ab" resolves to the lowest id, merged "ab" to the highest.
        assert_eq!(tok.encode("ab").expect("encode failed"), vec![256]);
        assert_eq!(tok.encode(" ab").expect("encode failed"), vec![32, 256]);
        assert_eq!(tok.token_to_id(b"ab"), Some(256));
    }

    #[test]
    fn test_duplicate_merge_token_maps_to_highest_id() {
        let mut vocab = byte_vocab();
        vocab.insert(256, b"ab".to_vec());
        vocab.insert(257, b"ab".to_vec());
        let merges = vec![MergeRule::new("a", "b")];
        let tok = Tokenizer::new(vocab, merges, &[] as &[&str]).expect("init failed");
        assert_eq!(tok.encode("ab").expect("encode failed"), vec![257]);
    }

    #[test]
    fn test_accessors() {
        let tok = tokenizer(&[EOT]);
        assert_eq!(tok.vocab_size(), 262);
        assert_eq!(tok.merges().len(), 5);
        assert_eq!(tok.special_tokens(), [EOT.to_owned()]);
        assert_eq!(tok.token_to_id(b"low"), Some(260));
        assert_eq!(tok.id_to_token(258), Some(b"ow".as_slice()));
        assert_eq!(tok.token_to_id(b"zzz"), None);
    }
}
