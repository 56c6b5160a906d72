//! Closest-name suggestions for missing columns

/// Minimum similarity for a suggestion to be offered
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Suggests which actual column most likely stands for an expected one
pub trait NameMatcher: Send + Sync {
    /// Best candidate for `target`, or `None` when nothing is similar enough
    fn closest(&self, target: &str, candidates: &[String]) -> Option<String>;
}

/// Normalized Levenshtein similarity with a cutoff.
///
/// Matching is case-sensitive. Equal scores keep the earliest candidate.
#[derive(Debug, Clone, Copy)]
pub struct LevenshteinMatcher {
    threshold: f64,
}

impl LevenshteinMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for LevenshteinMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl NameMatcher for LevenshteinMatcher {
    fn closest(&self, target: &str, candidates: &[String]) -> Option<String> {
        let mut best: Option<(&String, f64)> = None;

        for candidate in candidates {
            let score = strsim::normalized_levenshtein(target, candidate);
            if score < self.threshold {
                continue;
            }
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((candidate, score));
            }
        }

        best.map(|(candidate, _)| candidate.clone())
    }
}
