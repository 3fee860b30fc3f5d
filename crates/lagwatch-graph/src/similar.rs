//! Near-miss asset key suggestions
//!
//! When a dependency names an asset that does not exist, the most likely
//! cause is a typo in either the asset name or its prefix. Candidates are
//! indexed both ways so a lookup only diffs keys that share one half of the
//! query.

use lagwatch_core::AssetKey;
use std::collections::HashMap;

/// Similarity ratio a name or prefix must reach to be suggested
pub const DEFAULT_SIMILARITY_CUTOFF: f64 = 0.8;

/// Ratcliff/Obershelp similarity of two strings, `2 * M / T`
///
/// `M` counts characters in matching blocks found by repeatedly taking the
/// longest common substring; `T` is the total length of both strings.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

/// Upper bound of [`similarity_ratio`] from lengths alone
fn ratio_upper_bound(a_len: usize, b_len: usize) -> f64 {
    let total = a_len + b_len;
    if total == 0 {
        return 1.0;
    }
    2.0 * a_len.min(b_len) as f64 / total as f64
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let (a_start, b_start, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_characters(&a[..a_start], &b[..b_start])
        + matching_characters(&a[a_start + len..], &b[b_start + len..])
}

/// Longest common substring, earliest in `a` then earliest in `b` on ties
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for i in 0..a.len() {
        for j in 0..b.len() {
            current[j + 1] = if a[i] == b[j] { previous[j] + 1 } else { 0 };
            let len = current[j + 1];
            if len > best.2 {
                best = (i + 1 - len, j + 1 - len, len);
            }
        }
        std::mem::swap(&mut previous, &mut current);
    }

    best
}

fn similar(a: &str, b: &str, cutoff: f64) -> bool {
    ratio_upper_bound(a.chars().count(), b.chars().count()) >= cutoff
        && similarity_ratio(a, b) >= cutoff
}

/// Whether `a` and `b` differ by exactly one inserted or removed segment
fn off_by_one_segment(a: &[String], b: &[String]) -> bool {
    let (longer, shorter) = if a.len() > b.len() { (a, b) } else { (b, a) };
    if longer.len() != shorter.len() + 1 {
        return false;
    }
    (0..longer.len()).any(|skip| {
        longer
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .map(|(_, segment)| segment)
            .eq(shorter.iter())
    })
}

/// Candidate keys indexed by prefix and by name
#[derive(Debug, Clone)]
pub struct SimilarAssetIndex {
    by_prefix: HashMap<Vec<String>, Vec<AssetKey>>,
    by_name: HashMap<String, Vec<AssetKey>>,
    cutoff: f64,
}

impl SimilarAssetIndex {
    pub fn new<'a, I>(candidates: I, cutoff: f64) -> Self
    where
        I: IntoIterator<Item = &'a AssetKey>,
    {
        let mut by_prefix: HashMap<Vec<String>, Vec<AssetKey>> = HashMap::new();
        let mut by_name: HashMap<String, Vec<AssetKey>> = HashMap::new();

        for key in candidates {
            by_prefix
                .entry(key.prefix().to_vec())
                .or_default()
                .push(key.clone());
            by_name
                .entry(key.name().to_string())
                .or_default()
                .push(key.clone());
        }

        Self {
            by_prefix,
            by_name,
            cutoff,
        }
    }

    /// Candidates that look like a typo of `target`, in ascending key order
    pub fn similar_to(&self, target: &AssetKey) -> Vec<AssetKey> {
        let mut matches: Vec<AssetKey> = Vec::new();

        // Same prefix, similar name
        if let Some(siblings) = self.by_prefix.get(target.prefix()) {
            matches.extend(
                siblings
                    .iter()
                    .filter(|candidate| *candidate != target)
                    .filter(|candidate| similar(candidate.name(), target.name(), self.cutoff))
                    .cloned(),
            );
        }

        // Same name, similar prefix
        if let Some(namesakes) = self.by_name.get(target.name()) {
            let target_prefix = target.prefix().join(" ");
            matches.extend(
                namesakes
                    .iter()
                    .filter(|candidate| candidate.prefix() != target.prefix())
                    .filter(|candidate| {
                        off_by_one_segment(candidate.prefix(), target.prefix())
                            || similar(&candidate.prefix().join(" "), &target_prefix, self.cutoff)
                    })
                    .cloned(),
            );
        }

        matches.sort();
        matches.dedup();
        tracing::trace!(target = %target, found = matches.len(), "Similar asset lookup");
        matches
    }
}

/// Keys among `candidates` that look like a typo of `target`
pub fn resolve_similar_asset_keys(
    target: &AssetKey,
    candidates: &[AssetKey],
    cutoff: f64,
) -> Vec<AssetKey> {
    SimilarAssetIndex::new(candidates, cutoff).similar_to(target)
}

/// Render suggestions as `a, b, c`
pub fn format_suggestions(keys: &[AssetKey]) -> String {
    keys.iter()
        .map(AssetKey::to_user_string)
        .collect::<Vec<_>>()
        .join(", ")
}
