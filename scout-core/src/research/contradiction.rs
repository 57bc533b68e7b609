//! Contradiction detection between findings.
//!
//! Two findings in the same category from different sources contradict when
//! they talk about the same thing (keyword overlap) and one negates the other
//! or they cite different numbers. Both findings are kept; the contradiction
//! carries an annotation explaining the conflict.

use std::collections::HashSet;

use super::model::{Contradiction, ContradictionKind, Finding};

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "neither", "without", "lack", "lacks", "doesn't", "don't", "isn't",
    "aren't", "wasn't", "weren't", "won't", "cannot", "can't", "denied", "cancelled", "canceled",
    "abandoned", "paused",
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "shall", "should", "may", "might", "must", "can",
    "could", "of", "in", "to", "for", "with", "on", "at", "from", "by", "about", "as", "into",
    "through", "during", "before", "after", "this", "that", "these", "those", "it", "its", "and",
    "but", "or", "their", "they",
];

/// Detects contradictions among findings.
pub struct ContradictionDetector {
    /// Minimum keyword overlap for two findings to be about the same thing.
    min_overlap: f64,
    /// Relative difference above which two numbers disagree.
    numeric_tolerance: f64,
}

impl ContradictionDetector {
    pub fn new() -> Self {
        Self {
            min_overlap: 0.3,
            numeric_tolerance: 0.1,
        }
    }

    /// Compare every incoming finding with the existing ones and with each
    /// other. Pairs already in `known` are skipped.
    pub fn detect(
        &self,
        incoming: &[&Finding],
        existing: &[&Finding],
        known: &[Contradiction],
        cycle: u32,
    ) -> Vec<Contradiction> {
        let mut found: Vec<Contradiction> = Vec::new();

        for (i, a) in incoming.iter().enumerate() {
            let others = existing.iter().chain(incoming[i + 1..].iter());
            for b in others {
                if a.id == b.id
                    || known.iter().any(|c| c.involves(a.id, b.id))
                    || found.iter().any(|c| c.involves(a.id, b.id))
                {
                    continue;
                }
                if let Some(contradiction) = self.check_pair(b, a, cycle) {
                    found.push(contradiction);
                }
            }
        }
        found
    }

    /// `a` is the earlier finding, `b` the later one.
    fn check_pair(&self, a: &Finding, b: &Finding, cycle: u32) -> Option<Contradiction> {
        if a.category != b.category || same_source(a, b) {
            return None;
        }

        let words_a = keywords(&a.summary);
        let words_b = keywords(&b.summary);
        let overlap = jaccard(&words_a, &words_b);
        if overlap < self.min_overlap {
            return None;
        }

        let kind = if has_negation(&a.summary) != has_negation(&b.summary) && overlap > 0.4 {
            ContradictionKind::DirectNegation
        } else if self.numbers_disagree(&a.summary, &b.summary) {
            ContradictionKind::NumericDisagreement
        } else {
            return None;
        };

        Some(Contradiction {
            category: a.category,
            finding_a: a.id,
            finding_b: b.id,
            kind,
            annotation: annotate(a, b, kind),
            detected_in_cycle: cycle,
        })
    }

    /// Each side cites a number the other side has nothing close to.
    fn numbers_disagree(&self, a: &str, b: &str) -> bool {
        let nums_a = numbers(a);
        let nums_b = numbers(b);
        if nums_a.is_empty() || nums_b.is_empty() {
            return false;
        }
        let close = |x: f64, y: f64| (x - y).abs() / x.abs().max(y.abs()).max(1.0) <= self.numeric_tolerance;
        let a_unmatched = nums_a.iter().any(|x| !nums_b.iter().any(|y| close(*x, *y)));
        let b_unmatched = nums_b.iter().any(|y| !nums_a.iter().any(|x| close(*x, *y)));
        a_unmatched && b_unmatched
    }
}

impl Default for ContradictionDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn same_source(a: &Finding, b: &Finding) -> bool {
    match (a.source_key(), b.source_key()) {
        (Some(x), Some(y)) => x == y,
        // Unsourced findings from one path come from one conversation.
        (None, None) => a.path_id == b.path_id,
        _ => false,
    }
}

fn annotate(a: &Finding, b: &Finding, kind: ContradictionKind) -> String {
    let what = match kind {
        ContradictionKind::DirectNegation => "One finding negates the other",
        ContradictionKind::NumericDisagreement => "The findings cite different figures",
        ContradictionKind::Interpretive => "The findings draw different conclusions",
    };
    let source = |f: &Finding| f.source.clone().unwrap_or_else(|| f.path_id.to_string());
    let lean = if (a.confidence - b.confidence).abs() < 0.05 {
        "Neither is clearly more reliable; both are kept.".to_string()
    } else if a.confidence > b.confidence {
        format!("'{}' has higher confidence.", a.summary)
    } else {
        format!("'{}' has higher confidence.", b.summary)
    };
    format!(
        "{what}: '{}' ({}) vs '{}' ({}). {lean}",
        a.summary,
        source(a),
        b.summary,
        source(b)
    )
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().map(|w| {
        w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
            .to_lowercase()
    })
}

fn has_negation(text: &str) -> bool {
    tokens(text).any(|t| NEGATION_WORDS.contains(&t.as_str()))
}

/// Lowercased content words; negations and stop words removed.
fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w) && !NEGATION_WORDS.contains(w))
        .map(String::from)
        .collect()
}

fn numbers(text: &str) -> Vec<f64> {
    text.split(|c: char| !c.is_ascii_digit() && c != '.')
        .map(|s| s.trim_matches('.'))
        .filter_map(|s| s.parse::<f64>().ok())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}
