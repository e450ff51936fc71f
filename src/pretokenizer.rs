//! Splits raw text into pretokens: the units BPE merges never cross.
//!
//! Special tokens are located first and emitted whole. Every other span is
//! cut by a priority-ordered scan over code points:
//!
//! 1. `'` followed by `s`, `d`, `m`, `t`, `ll`, `ve` or `re`;
//! 2. an optional space and a run of letters;
//! 3. an optional space and a run of numbers;
//! 4. an optional space and a run of anything that is not whitespace, a
//!    letter or a number;
//! 5. a whitespace run not followed by non-whitespace;
//! 6. any other whitespace run.
//!
//! At each position the first rule that matches wins and consumes its
//! longest match.

use fancy_regex::{Matches, Regex};
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::error::{ConfigError, EncodeError, Result, TokenizerInitError};

/// Contraction suffixes accepted after an apostrophe, in match priority.
const CONTRACTIONS: [&str; 7] = ["s", "d", "m", "t", "ll", "ve", "re"];

/// One pretoken borrowed from the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pretoken<'t> {
    pub text: &'t str,
    pub special: bool,
}

impl<'t> Pretoken<'t> {
    pub fn as_bytes(&self) -> &'t [u8] {
        self.text.as_bytes()
    }
}

/// Pretokenizer configured with a list of special tokens.
#[derive(Debug, Clone)]
pub struct Pretokenizer {
    special_tokens: Vec<String>,
    /// Literal alternation of the escaped special tokens, if any.
    pattern: Option<Regex>,
}

impl Pretokenizer {
    /// Creates a pretokenizer that keeps `special_tokens` atomic.
    ///
    /// When two special tokens match at the same position the one listed
    /// first wins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySpecialToken`] for an empty special token,
    /// or [`TokenizerInitError::InvalidPattern`] if the special-token
    /// alternation fails to compile.
    pub fn new<S: AsRef<str>>(special_tokens: &[S]) -> Result<Self> {
        let special_tokens: Vec<String> = special_tokens
            .iter()
            .map(|s| s.as_ref().to_owned())
            .collect();

        if special_tokens.iter().any(String::is_empty) {
            return Err(ConfigError::EmptySpecialToken.into());
        }

        let pattern = if special_tokens.is_empty() {
            None
        } else {
            // escape regex metachars so every special token matches literally.
            let alternation = special_tokens
                .iter()
                .map(|s| fancy_regex::escape(s))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&alternation).map_err(TokenizerInitError::from)?)
        };

        Ok(Self {
            special_tokens,
            pattern,
        })
    }

    pub fn special_tokens(&self) -> &[String] {
        &self.special_tokens
    }

    /// Returns a lazy iterator over the pretokens of `text`.
    ///
    /// Calling this again on the same text restarts from the beginning.
    pub fn pretokens<'p, 't>(&'p self, text: &'t str) -> Pretokens<'p, 't> {
        Pretokens {
            text,
            specials: self.pattern.as_ref().map(|re| re.find_iter(text)),
            cursor: 0,
            span_end: 0,
            pending_special: None,
        }
    }
}

/// Iterator returned by [`Pretokenizer::pretokens`].
pub struct Pretokens<'p, 't> {
    text: &'t str,
    /// Remaining special-token matches; `None` once exhausted or never configured.
    specials: Option<Matches<'p, 't>>,
    /// Start of the not-yet-emitted ordinary text.
    cursor: usize,
    /// End of the ordinary span currently being scanned.
    span_end: usize,
    /// Special token that closes the current ordinary span.
    pending_special: Option<(usize, usize)>,
}

impl<'p, 't> Iterator for Pretokens<'p, 't> {
    type Item = std::result::Result<Pretoken<'t>, EncodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cursor < self.span_end {
                let start = self.cursor;
                self.cursor += match_len(&self.text[start..self.span_end]);
                return Some(Ok(Pretoken {
                    text: &self.text[start..self.cursor],
                    special: false,
                }));
            }

            if let Some((start, end)) = self.pending_special.take() {
                self.cursor = end;
                self.span_end = end;
                return Some(Ok(Pretoken {
                    text: &self.text[start..end],
                    special: true,
                }));
            }

            let next_match = match self.specials.as_mut() {
                Some(matches) => matches.next(),
                None => None,
            };

            match next_match {
                Some(Ok(m)) => {
                    self.span_end = m.start();
                    self.pending_special = Some((m.start(), m.end()));
                }
                Some(Err(e)) => {
                    self.specials = None;
                    self.cursor = self.text.len();
                    self.span_end = self.text.len();
                    return Some(Err(EncodeError::RegexMatch(e.to_string())));
                }
                None => {
                    self.specials = None;
                    if self.span_end >= self.text.len() {
                        return None;
                    }
                    self.span_end = self.text.len();
                }
            }
        }
    }
}

/// Coarse character class used by the scan rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Letter,
    Number,
    Space,
    Other,
}

fn classify(c: char) -> CharClass {
    if c.is_whitespace() {
        return CharClass::Space;
    }
    match get_general_category(c) {
        GeneralCategory::UppercaseLetter
        | GeneralCategory::LowercaseLetter
        | GeneralCategory::TitlecaseLetter
        | GeneralCategory::ModifierLetter
        | GeneralCategory::OtherLetter => CharClass::Letter,
        GeneralCategory::DecimalNumber
        | GeneralCategory::LetterNumber
        | GeneralCategory::OtherNumber => CharClass::Number,
        _ => CharClass::Other,
    }
}

/// Byte length of the pretoken starting at the beginning of `s`.
///
/// `s` must be non-empty; every code point matches some rule so the result
/// is always positive.
fn match_len(s: &str) -> usize {
    if let Some(len) = contraction_len(s) {
        return len;
    }

    let mut chars = s.char_indices().peekable();
    let Some((_, first)) = chars.next() else {
        return 0;
    };

    // rules b-d: optional leading space then a run of one class.
    let (class, run_start) = match (first, chars.peek()) {
        (' ', Some(&(idx, next))) if classify(next) != CharClass::Space => (classify(next), idx),
        _ => (classify(first), 0),
    };
    if class != CharClass::Space {
        return run_end(s, run_start, |c| classify(c) == class);
    }

    // rules e-f: whitespace run.
    let end = run_end(s, 0, char::is_whitespace);
    if end == s.len() {
        return end;
    }
    // followed by non-whitespace: leave the last whitespace char for the next
    // token unless the run is a single char.
    let last_start = s[..end]
        .char_indices()
        .next_back()
        .map_or(0, |(idx, _)| idx);
    if last_start > 0 {
        last_start
    } else {
        end
    }
}

fn contraction_len(s: &str) -> Option<usize> {
    let rest = s.strip_prefix('\'')?;
    CONTRACTIONS
        .iter()
        .find(|suffix| rest.starts_with(*suffix))
        .map(|suffix| 1 + suffix.len())
}

/// End offset of the run of chars matching `pred` starting at `start`.
fn run_end(s: &str, start: usize, pred: impl Fn(char) -> bool) -> usize {
    s[start..]
        .char_indices()
        .find(|&(_, c)| !pred(c))
        .map_or(s.len(), |(idx, _)| start + idx)
}
