//! Byte-level BPE training.
//!
//! The corpus is split into pretokens, aggregated into a word/frequency
//! table, and then repeatedly merged: each step picks the most frequent
//! adjacent symbol pair, records it as a merge rule, rewrites every word and
//! recounts all pairs from scratch.
//!
//! Ties between equally frequent pairs go to the pair that is greatest when
//! compared as `(left bytes, right bytes)`. Changing this rule changes the
//! trained vocabulary.

use std::{
    cmp::Ordering,
    collections::HashMap,
    fs,
    ops::ControlFlow,
    path::Path,
    time::Duration,
};

use indicatif::{style::TemplateError, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result, TrainError},
    pretokenizer::Pretokenizer,
    types::{byte_vocab, MergeRule, Token, TokenFreq, TokenId, Vocab, BYTE_VOCAB_SIZE},
};

/// Pairs seen fewer times than this are never merged.
const MIN_MERGE_FREQ: TokenFreq = 2;

/// Index of an interned symbol (a distinct byte string) inside the trainer.
type SymbolId = usize;

/// Training hyperparameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Target vocabulary size, including the 256 bytes and special tokens.
    pub vocab_size: usize,
    /// Tokens kept atomic; assigned ids right after the bytes, in order.
    #[serde(default)]
    pub special_tokens: Vec<String>,
    /// Render a progress bar over the merge budget.
    #[serde(default)]
    pub show_progress: bool,
}

impl TrainerConfig {
    pub fn new(vocab_size: usize, special_tokens: Vec<String>) -> Self {
        Self {
            vocab_size,
            special_tokens,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Size of the vocabulary before any merge: the bytes plus every special
    /// token whose bytes are not already present.
    pub fn initial_vocab_size(&self) -> usize {
        initial_vocab(&self.special_tokens).len()
    }

    /// Checks the configuration before any corpus is read.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `vocab_size` is zero, any special token is
    /// empty, or `vocab_size` is below [`Self::initial_vocab_size`].
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.vocab_size == 0 {
            return Err(ConfigError::ZeroVocabSize);
        }
        if self.special_tokens.iter().any(String::is_empty) {
            return Err(ConfigError::EmptySpecialToken);
        }
        let initial = self.initial_vocab_size();
        if self.vocab_size < initial {
            return Err(ConfigError::VocabBelowInitial {
                requested: self.vocab_size,
                initial,
            });
        }
        Ok(())
    }
}

/// Why the merge loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The vocabulary reached the requested size.
    TargetReached,
    /// No word had two or more symbols left.
    NoPairs,
    /// The most frequent pair occurred fewer than two times.
    BelowMinFrequency,
}

/// Result of a training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainOutput {
    pub vocab: Vocab,
    /// Merge rules in creation order.
    pub merges: Vec<MergeRule>,
    pub stop_reason: StopReason,
}

/// Candidate pair scored for selection.
///
/// Orders by frequency, then by the pair's bytes so that the maximum is the
/// most frequent pair with the lexicographically greatest `(left, right)`.
#[derive(Debug, PartialEq, Eq)]
struct PairScore<'a> {
    freq: TokenFreq,
    left: &'a [u8],
    right: &'a [u8],
    pair: (SymbolId, SymbolId),
}

impl PartialOrd for PairScore<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PairScore<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.freq
            .cmp(&other.freq)
            .then_with(|| self.left.cmp(other.left))
            .then_with(|| self.right.cmp(other.right))
    }
}

/// BPE training state.
///
/// Symbols are interned by their bytes so that two merges producing the same
/// byte string yield the same symbol, exactly as if words held raw bytes.
/// The word and pair tables are rebuilt into fresh maps after every merge.
#[derive(Debug)]
pub struct BpeTrainer {
    config: TrainerConfig,
    pretokenizer: Pretokenizer,

    /// Interned symbol bytes, indexed by [`SymbolId`]. Ids 0-255 are the bytes.
    symbols: Vec<Token>,
    symbol_ids: HashMap<Token, SymbolId>,

    /// Symbol sequence -> number of occurrences in the corpus.
    words: HashMap<Vec<SymbolId>, TokenFreq>,

    /// Adjacent pair -> summed frequency over all words.
    pair_freqs: HashMap<(SymbolId, SymbolId), TokenFreq>,

    vocab: Vocab,
    next_id: TokenId,

    /// History of merges in creation order.
    merges: Vec<MergeRule>,
}

impl BpeTrainer {
    /// Creates a trainer with the byte vocabulary and special tokens in place.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid.
    pub fn new(config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        let pretokenizer = Pretokenizer::new(config.special_tokens.as_slice())?;

        let vocab = initial_vocab(&config.special_tokens);
        let next_id = next_free_id(&vocab);

        let symbols: Vec<Token> = (0..=u8::MAX).map(|b| vec![b]).collect();
        let symbol_ids = symbols
            .iter()
            .enumerate()
            .map(|(id, bytes)| (bytes.clone(), id))
            .collect();

        Ok(Self {
            config,
            pretokenizer,
            symbols,
            symbol_ids,
            words: HashMap::new(),
            pair_freqs: HashMap::new(),
            vocab,
            next_id,
            merges: Vec::new(),
        })
    }

    /// Adds the pretokens of `text` to the word table.
    ///
    /// May be called several times before [`Self::train`]; counts accumulate.
    pub fn feed(&mut self, text: &str) -> Result<()> {
        for pretoken in self.pretokenizer.pretokens(text) {
            let pretoken = pretoken?;
            let word = if pretoken.special {
                vec![intern(
                    &mut self.symbols,
                    &mut self.symbol_ids,
                    pretoken.as_bytes(),
                )]
            } else {
                pretoken.as_bytes().iter().map(|&b| SymbolId::from(b)).collect()
            };
            *self.words.entry(word).or_insert(0) += 1;
        }
        self.pair_freqs = count_pairs(&self.words);
        Ok(())
    }

    /// Runs the merge loop until the target size or an early stop.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::ProgressBarSetup`] if the progress bar cannot be
    /// styled.
    pub fn train(mut self) -> Result<TrainOutput> {
        let budget = self.config.vocab_size.saturating_sub(self.vocab.len());
        let pb = progress_bar(budget as u64, "Training merges", self.config.show_progress)
            .map_err(TrainError::from)?;

        let mut stop_reason = StopReason::TargetReached;
        while self.vocab.len() < self.config.vocab_size {
            if let ControlFlow::Break(reason) = self.merge_step() {
                stop_reason = reason;
                break;
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(
            "completed {} merges; vocab size {}; stop reason {:?}",
            self.merges.len(),
            self.vocab.len(),
            stop_reason
        );

        Ok(TrainOutput {
            vocab: self.vocab,
            merges: self.merges,
            stop_reason,
        })
    }

    /// Performs one merge operation.
    ///
    /// Returns `Break` with the reason when no eligible pair is left.
    fn merge_step(&mut self) -> ControlFlow<StopReason> {
        let Some((pair, freq)) = self.best_pair() else {
            return ControlFlow::Break(StopReason::NoPairs);
        };
        if freq < MIN_MERGE_FREQ {
            return ControlFlow::Break(StopReason::BelowMinFrequency);
        }

        let rule = MergeRule::new(self.symbols[pair.0].clone(), self.symbols[pair.1].clone());
        let merged = rule.merged();
        let merged_sym = intern(&mut self.symbols, &mut self.symbol_ids, &merged);

        let new_id = self.next_id;
        self.next_id += 1;

        debug!(
            "merging pair ({:?}, {:?}) x{} -> token {}",
            String::from_utf8_lossy(&rule.left),
            String::from_utf8_lossy(&rule.right),
            freq,
            new_id
        );

        self.vocab.insert(new_id, merged);
        self.merges.push(rule);

        // rebuild both tables; nothing carries over from the previous step.
        let mut words: HashMap<Vec<SymbolId>, TokenFreq> = HashMap::with_capacity(self.words.len());
        for (word, freq) in &self.words {
            let rewritten = merge_word(word, pair, merged_sym);
            *words.entry(rewritten).or_insert(0) += *freq;
        }
        self.pair_freqs = count_pairs(&words);
        self.words = words;

        ControlFlow::Continue(())
    }

    /// Most frequent pair under the byte-wise tie-break, with its count.
    fn best_pair(&self) -> Option<((SymbolId, SymbolId), TokenFreq)> {
        self.pair_freqs
            .iter()
            .map(|(&pair, &freq)| PairScore {
                freq,
                left: &self.symbols[pair.0],
                right: &self.symbols[pair.1],
                pair,
            })
            .max()
            .map(|score| (score.pair, score.freq))
    }
}

/// Trains a tokenizer on an in-memory corpus.
///
/// # Example
///
/// ```
/// use bytepair::{train_bpe, TrainerConfig};
///
/// let cfg = TrainerConfig::new(259, vec![]);
/// let out = train_bpe("aaabdaaabac", &cfg).unwrap();
/// assert_eq!(out.merges.len(), 3);
/// assert_eq!(out.merges[0].left, b"a".to_vec());
/// ```
pub fn train_bpe(text: &str, config: &TrainerConfig) -> Result<TrainOutput> {
    let mut trainer = BpeTrainer::new(config.clone())?;
    trainer.feed(text)?;
    trainer.train()
}

/// Reads a UTF-8 corpus file and trains on its contents.
pub fn train_bpe_from_file(path: impl AsRef<Path>, config: &TrainerConfig) -> Result<TrainOutput> {
    let path = path.as_ref();
    config.validate()?;
    let text = fs::read_to_string(path).map_err(|source| TrainError::Corpus {
        path: path.to_path_buf(),
        source,
    })?;
    info!("read {} bytes of corpus from {}", text.len(), path.display());
    train_bpe(&text, config)
}

/// Byte vocabulary followed by the special tokens that are not yet present.
fn initial_vocab(special_tokens: &[String]) -> Vocab {
    let mut vocab = byte_vocab();
    let mut next_id = BYTE_VOCAB_SIZE as TokenId;
    for token in special_tokens {
        let bytes = token.as_bytes();
        if vocab.values().any(|existing| existing.as_slice() == bytes) {
            continue;
        }
        vocab.insert(next_id, bytes.to_vec());
        next_id += 1;
    }
    vocab
}

fn next_free_id(vocab: &Vocab) -> TokenId {
    vocab.keys().next_back().map_or(0, |&id| id + 1)
}

fn intern(
    symbols: &mut Vec<Token>,
    symbol_ids: &mut HashMap<Token, SymbolId>,
    bytes: &[u8],
) -> SymbolId {
    if let Some(&id) = symbol_ids.get(bytes) {
        return id;
    }
    let id = symbols.len();
    symbols.push(bytes.to_vec());
    symbol_ids.insert(bytes.to_vec(), id);
    id
}

fn count_pairs(
    words: &HashMap<Vec<SymbolId>, TokenFreq>,
) -> HashMap<(SymbolId, SymbolId), TokenFreq> {
    let mut pair_freqs = HashMap::new();
    for (word, &freq) in words {
        for window in word.windows(2) {
            *pair_freqs.entry((window[0], window[1])).or_insert(0) += freq;
        }
    }
    pair_freqs
}

/// Replaces every non-overlapping occurrence of `pair`, scanning left to right.
fn merge_word(word: &[SymbolId], pair: (SymbolId, SymbolId), merged: SymbolId) -> Vec<SymbolId> {
    let mut out = Vec::with_capacity(word.len());
    let mut i = 0;
    while i < word.len() {
        if i + 1 < word.len() && word[i] == pair.0 && word[i + 1] == pair.1 {
            out.push(merged);
            i += 2;
        } else {
            out.push(word[i]);
            i += 1;
        }
    }
    out
}

/// Creates a styled progress bar, hidden unless `show` is set.
///
/// # Errors
///
/// Returns a [`TemplateError`] if the progress bar style template is invalid.
fn progress_bar(size: u64, msg: &str, show: bool) -> std::result::Result<ProgressBar, TemplateError> {
    let pb = ProgressBar::new(size);
    if !show {
        // create dummy progress bar and force to not render
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return Ok(pb);
    }

    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {msg:<20!} {wide_bar} {pos}/{len}")?;
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_secs(1));
    Ok(pb)
}
