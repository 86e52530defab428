//! Gestalt (Ratcliff/Obershelp) sequence similarity
//!
//! `ratio = 2·M / (|a| + |b|)` where `M` is the number of characters in the
//! recursively found longest common blocks. Works on Unicode scalar values so
//! CJK names compare character by character.

use std::collections::HashMap;

/// Similarity ratio in `[0, 1]` between `a` and `b`
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(a, b) as f64 / total as f64
}

/// Upper bound on `ratio` from lengths alone
fn length_bound(a_len: usize, b_len: usize) -> f64 {
    let total = a_len + b_len;
    if total == 0 {
        return 1.0;
    }
    2.0 * a_len.min(b_len) as f64 / total as f64
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, &c) in b.iter().enumerate() {
        b2j.entry(c).or_default().push(j);
    }

    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`.
/// Ties resolve to the earliest start in `a`, then in `b`.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // j2len[j] = length of the match ending at a[i-1], b[j]
    let mut j2len: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = if j == 0 { 0 } else { j2len.get(&(j - 1)).copied().unwrap_or(0) } + 1;
                next.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        j2len = next;
    }

    (best_i, best_j, best_size)
}

/// A vocabulary name with its similarity to a mention
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredName {
    pub name: String,
    pub score: f64,
}

/// The `limit` names most similar to `word` with `score >= cutoff`,
/// best first. Equal scores order by name, larger first.
pub fn close_matches<S: AsRef<str>>(
    word: &str,
    vocabulary: &[S],
    limit: usize,
    cutoff: f64,
) -> Vec<ScoredName> {
    if limit == 0 || word.is_empty() || vocabulary.is_empty() {
        return Vec::new();
    }

    let word_chars: Vec<char> = word.chars().collect();
    let mut scored: Vec<ScoredName> = vocabulary
        .iter()
        .filter_map(|name| {
            let name = name.as_ref();
            let name_chars: Vec<char> = name.chars().collect();
            if length_bound(name_chars.len(), word_chars.len()) < cutoff {
                return None;
            }
            let score = ratio_chars(&name_chars, &word_chars);
            (score >= cutoff).then(|| ScoredName {
                name: name.to_string(),
                score,
            })
        })
        .collect();

    scored.sort_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| y.name.cmp(&x.name))
    });
    scored.truncate(limit);
    scored
}
