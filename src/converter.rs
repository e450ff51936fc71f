//! BPE Converter - replays learned merge rules over token id sequences.
//!
//! Encoding must give the same result as applying every merge rule in
//! training order, each rule merging all of its non-overlapping occurrences
//! left to right before the next rule runs. Instead of rescanning the
//! sequence once per rule, candidates sit in a priority queue keyed by
//! `(merge_order, position)` so only pairs that have a rule are visited.
//!
//! A pair formed by a merge is only queued under a rule that comes later
//! than the one just applied; earlier rules have already had their turn.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

use crate::types::{MergeOrder, TokenId, TokenPair};

/// A pair occurrence waiting to be merged under a specific rule.
#[derive(Debug, PartialEq, Eq)]
struct MergeCandidate {
    merge_order: MergeOrder,
    pair: TokenPair,
    /// Index of the left token in the working sequence.
    position: usize,
}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCandidate {
    // reversed so BinaryHeap pops the lowest (merge_order, position) first
    fn cmp(&self, other: &Self) -> Ordering {
        (other.merge_order, other.position).cmp(&(self.merge_order, self.position))
    }
}

/// Which side of a slot to look for a live neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Index of the nearest live slot beside `pos`, skipping consumed ones.
fn live_neighbor(slots: &[Option<TokenId>], pos: usize, side: Side) -> Option<usize> {
    match side {
        Side::Left => slots[..pos].iter().rposition(Option::is_some),
        Side::Right => slots
            .get(pos + 1..)?
            .iter()
            .position(Option::is_some)
            .map(|offset| pos + 1 + offset),
    }
}

/// Merge-rule table over token ids.
///
/// # Example
///
/// ```ignore
/// let converter = BpeConverter::new(vec![((0, 1), 2), ((2, 0), 3)]);
/// assert_eq!(converter.encode(vec![0, 1, 0]), vec![3]);
/// ```
#[derive(Debug, Clone, Default)]
pub(crate) struct BpeConverter {
    /// Maps token pairs to every `(merged_token, merge_order)` registered for
    /// them, in ascending merge order.
    ///
    /// A pair normally has exactly one rule; a loaded merge list may repeat a
    /// pair, and each repeat gets its own turn during replay.
    merges: HashMap<TokenPair, Vec<(TokenId, MergeOrder)>>,
    num_merges: usize,
}

impl BpeConverter {
    /// Creates a converter from merge history.
    ///
    /// # Arguments
    ///
    /// * `merge_history` - Merge rules as `((left_token, right_token), merged_token)`.
    ///   Iteration order is the replay order.
    pub(crate) fn new(merge_history: impl IntoIterator<Item = ((TokenId, TokenId), TokenId)>) -> Self {
        let mut merges: HashMap<TokenPair, Vec<(TokenId, MergeOrder)>> = HashMap::new();
        let mut num_merges = 0;
        for (merge_order, ((left, right), merged)) in merge_history.into_iter().enumerate() {
            merges
                .entry(TokenPair(left, right))
                .or_default()
                .push((merged, merge_order));
            num_merges += 1;
        }
        Self { merges, num_merges }
    }

    /// Applies the merge rules to a token sequence.
    ///
    /// Runs in O(N log N) for N input tokens; the result is never longer
    /// than the input.
    pub(crate) fn encode(&self, tokens: Vec<TokenId>) -> Vec<TokenId> {
        if tokens.len() < 2 || self.merges.is_empty() {
            return tokens;
        }

        let mut queue = BinaryHeap::new();
        for (position, window) in tokens.windows(2).enumerate() {
            let pair = TokenPair(window[0], window[1]);
            if let Some((_, merge_order)) = self.next_rule(pair, None) {
                queue.push(MergeCandidate {
                    merge_order,
                    pair,
                    position,
                });
            }
        }

        // None marks a slot absorbed into the token on its left.
        let mut slots: Vec<Option<TokenId>> = tokens.into_iter().map(Some).collect();

        while let Some(MergeCandidate {
            merge_order,
            pair,
            position,
        }) = queue.pop()
        {
            let Some(left) = slots[position] else {
                continue;
            };
            let Some(right_pos) = live_neighbor(&slots, position, Side::Right) else {
                continue;
            };
            let Some(right) = slots[right_pos] else {
                continue;
            };
            // stale: an earlier merge changed one side of the pair
            if TokenPair(left, right) != pair {
                continue;
            }
            let Some(merged) = self.merged_token(pair, merge_order) else {
                continue;
            };

            slots[position] = Some(merged);
            slots[right_pos] = None;

            for side in [Side::Left, Side::Right] {
                if let Some(candidate) = self.follow_up(&slots, position, merged, merge_order, side) {
                    queue.push(candidate);
                }
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// Returns the total number of merge rules in this converter.
    pub(crate) fn num_merges(&self) -> usize {
        self.num_merges
    }

    /// First rule for `pair` that comes strictly after `after`.
    fn next_rule(&self, pair: TokenPair, after: Option<MergeOrder>) -> Option<(TokenId, MergeOrder)> {
        self.merges.get(&pair)?.iter().copied().find(|&(_, order)| match after {
            Some(after) => order > after,
            None => true,
        })
    }

    fn merged_token(&self, pair: TokenPair, merge_order: MergeOrder) -> Option<TokenId> {
        self.merges
            .get(&pair)?
            .iter()
            .find(|&&(_, order)| order == merge_order)
            .map(|&(tok, _)| tok)
    }

    /// Candidate formed by `merged` at `pos` and its live neighbour on `side`,
    /// restricted to rules later than `after`.
    fn follow_up(
        &self,
        slots: &[Option<TokenId>],
        pos: usize,
        merged: TokenId,
        after: MergeOrder,
        side: Side,
    ) -> Option<MergeCandidate> {
        let other = live_neighbor(slots, pos, side)?;
        let neighbor = slots[other]?;
        let (pair, position) = match side {
            Side::Left => (TokenPair(neighbor, merged), other),
            Side::Right => (TokenPair(merged, neighbor), pos),
        };
        let (_, merge_order) = self.next_rule(pair, Some(after))?;
        Some(MergeCandidate {
            merge_order,
            pair,
            position,
        })
    }
}
