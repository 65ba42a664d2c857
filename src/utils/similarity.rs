//! Approximate string matching for duplicate detection
//!
//! Implements Ratcliff/Obershelp "gestalt pattern matching": find the longest
//! common contiguous block, recurse into the unmatched text on either side,
//! and score `2 * M / (len(a) + len(b))` where `M` is the number of matched
//! characters. Spaces in the second string are treated as junk: they never
//! seed a match but may extend one. Long second strings (200+ characters)
//! additionally ignore characters that make up more than 1% of the text as
//! match seeds, which keeps extended descriptions cheap to compare.

use std::collections::HashMap;

/// Strings at least this long get popular-character pruning
const AUTOJUNK_MIN_LEN: usize = 200;

/// A matching block: `a[a_start..a_start + size] == b[b_start..b_start + size]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchBlock {
    pub a_start: usize,
    pub b_start: usize,
    pub size: usize,
}

/// Compares one pair of strings
pub struct SequenceMatcher {
    a: Vec<char>,
    b: Vec<char>,
    /// Positions of every non-junk, non-popular character of `b`
    b2j: HashMap<char, Vec<usize>>,
}

impl SequenceMatcher {
    pub fn new(a: &str, b: &str) -> Self {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let b2j = Self::index_b(&b);
        Self { a, b, b2j }
    }

    fn is_junk(c: char) -> bool {
        c == ' '
    }

    fn index_b(b: &[char]) -> HashMap<char, Vec<usize>> {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &c) in b.iter().enumerate() {
            if !Self::is_junk(c) {
                b2j.entry(c).or_default().push(j);
            }
        }

        let n = b.len();
        if n >= AUTOJUNK_MIN_LEN {
            let threshold = n / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= threshold);
        }
        b2j
    }

    /// Longest matching block in `a[alo..ahi]` and `b[blo..bhi]`, earliest in
    /// `a` (then in `b`) on ties, widened over popular and junk characters
    pub fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> MatchBlock {
        let (a, b) = (&self.a, &self.b);
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0usize);

        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut new_j2len: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    new_j2len.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            j2len = new_j2len;
        }

        // widen over equal characters that were pruned as popular
        while best_i > alo
            && best_j > blo
            && !Self::is_junk(b[best_j - 1])
            && a[best_i - 1] == b[best_j - 1]
        {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && !Self::is_junk(b[best_j + best_size])
            && a[best_i + best_size] == b[best_j + best_size]
        {
            best_size += 1;
        }

        // then over equal junk on both edges
        while best_i > alo
            && best_j > blo
            && Self::is_junk(b[best_j - 1])
            && a[best_i - 1] == b[best_j - 1]
        {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && Self::is_junk(b[best_j + best_size])
            && a[best_i + best_size] == b[best_j + best_size]
        {
            best_size += 1;
        }

        MatchBlock {
            a_start: best_i,
            b_start: best_j,
            size: best_size,
        }
    }

    /// All matching blocks, found by recursing on both sides of each longest match
    pub fn matching_blocks(&self) -> Vec<MatchBlock> {
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let block = self.find_longest_match(alo, ahi, blo, bhi);
            if block.size == 0 {
                continue;
            }
            let (i, j, k) = (block.a_start, block.b_start, block.size);
            blocks.push(block);
            if alo < i && blo < j {
                pending.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                pending.push((i + k, ahi, j + k, bhi));
            }
        }

        blocks.sort_by_key(|b| (b.a_start, b.b_start));
        blocks
    }

    /// Similarity in `[0, 1]`; two empty strings score 0
    pub fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 0.0;
        }
        let matches: usize = self.matching_blocks().iter().map(|b| b.size).sum();
        2.0 * matches as f64 / total as f64
    }
}

/// Similarity ratio of two strings
pub fn ratio(a: &str, b: &str) -> f64 {
    SequenceMatcher::new(a, b).ratio()
}
