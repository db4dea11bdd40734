//! Merging fetched content into the final augmentation list.
//!
//! Every strategy deduplicates by exact text (first surviving occurrence wins)
//! and is deterministic for a given input order. The score threshold filters
//! before deduplicating, so a passing copy is never shadowed by a failing one.

use std::collections::HashMap;
use std::collections::HashSet;
use vocalis_config::{AggregationKind, RetrievalConfig};

use super::source::AggregatedContent;

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationStrategy {
    /// Keep everything, in order
    Concatenate,
    /// Drop scored items below `min_score`; unscored items are kept
    ScoreThreshold { min_score: f32 },
    /// Fuse per-source rankings: score = Σ 1 / (k + rank + 1)
    ReciprocalRankFusion { k: u32 },
}

impl AggregationStrategy {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        match config.strategy {
            AggregationKind::Concatenate => Self::Concatenate,
            AggregationKind::ScoreThreshold => Self::ScoreThreshold {
                min_score: config.min_score,
            },
            AggregationKind::ReciprocalRankFusion => Self::ReciprocalRankFusion { k: config.rrf_k },
        }
    }
}

/// Merge `contents` with `strategy`, then keep at most `max_items`.
pub fn aggregate(
    contents: Vec<AggregatedContent>,
    strategy: &AggregationStrategy,
    max_items: Option<usize>,
) -> Vec<AggregatedContent> {
    let mut merged = match strategy {
        AggregationStrategy::Concatenate => dedup(contents),
        AggregationStrategy::ScoreThreshold { min_score } => dedup(
            contents
                .into_iter()
                .filter(|c| c.score.is_none_or(|s| s >= *min_score))
                .collect(),
        ),
        AggregationStrategy::ReciprocalRankFusion { k } => fuse(contents, *k),
    };

    if let Some(max) = max_items {
        merged.truncate(max);
    }
    merged
}

fn dedup(contents: Vec<AggregatedContent>) -> Vec<AggregatedContent> {
    let mut seen = HashSet::new();
    contents
        .into_iter()
        .filter(|c| seen.insert(c.text.clone()))
        .collect()
}

fn fuse(contents: Vec<AggregatedContent>, k: u32) -> Vec<AggregatedContent> {
    let mut ranks: HashMap<String, usize> = HashMap::new();
    let mut scores: HashMap<String, f64> = HashMap::new();

    for content in &contents {
        let rank = ranks.entry(content.source_name.clone()).or_insert(0);
        *scores.entry(content.text.clone()).or_insert(0.0) += 1.0 / (f64::from(k) + *rank as f64 + 1.0);
        *rank += 1;
    }

    let mut fused: Vec<(f64, AggregatedContent)> = dedup(contents)
        .into_iter()
        .map(|mut c| {
            let score = scores.get(&c.text).copied().unwrap_or(0.0);
            c.score = Some(score as f32);
            (score, c)
        })
        .collect();

    // Stable sort: ties keep first-appearance order
    fused.sort_by(|a, b| b.0.total_cmp(&a.0));
    fused.into_iter().map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(source: &str, text: &str, score: Option<f32>) -> AggregatedContent {
        AggregatedContent {
            text: text.into(),
            source_name: source.into(),
            score,
        }
    }

    fn texts(contents: &[AggregatedContent]) -> Vec<&str> {
        contents.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn concatenate_dedups_first_seen() {
        let merged = aggregate(
            vec![
                item("a", "x", None),
                item("a", "y", None),
                item("b", "x", Some(0.9)),
                item("b", "z", None),
            ],
            &AggregationStrategy::Concatenate,
            None,
        );
        assert_eq!(texts(&merged), vec!["x", "y", "z"]);
        assert_eq!(merged[0].source_name, "a");
    }

    #[test]
    fn threshold_prefers_passing_duplicate() {
        let merged = aggregate(
            vec![
                item("user_memories", "likes tea", Some(0.2)),
                item("knowledge_base", "likes tea", Some(0.9)),
            ],
            &AggregationStrategy::ScoreThreshold { min_score: 0.5 },
            None,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source_name, "knowledge_base");
        assert_eq!(merged[0].score, Some(0.9));
    }

    #[test]
    fn threshold_keeps_unscored_items() {
        let merged = aggregate(
            vec![
                item("a", "low", Some(0.2)),
                item("a", "high", Some(0.8)),
                item("b", "unscored", None),
            ],
            &AggregationStrategy::ScoreThreshold { min_score: 0.5 },
            None,
        );
        assert_eq!(texts(&merged), vec!["high", "unscored"]);
    }

    #[test]
    fn rrf_rewards_agreement_across_sources() {
        let merged = aggregate(
            vec![
                item("a", "only-a", None),
                item("a", "shared", None),
                item("b", "shared", None),
                item("b", "only-b", None),
            ],
            &AggregationStrategy::ReciprocalRankFusion { k: 60 },
            None,
        );
        assert_eq!(texts(&merged), vec!["shared", "only-a", "only-b"]);
        let top = merged[0].score.unwrap();
        assert!((top - (1.0 / 62.0 + 1.0 / 61.0) as f32).abs() < 1e-6);
    }

    #[test]
    fn max_items_truncates() {
        let merged = aggregate(
            vec![item("a", "1", None), item("a", "2", None), item("a", "3", None)],
            &AggregationStrategy::Concatenate,
            Some(2),
        );
        assert_eq!(texts(&merged), vec!["1", "2"]);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let input = vec![
            item("a", "p", Some(0.3)),
            item("b", "q", Some(0.3)),
            item("c", "p", None),
        ];
        let strategy = AggregationStrategy::ReciprocalRankFusion { k: 10 };
        assert_eq!(
            aggregate(input.clone(), &strategy, None),
            aggregate(input, &strategy, None)
        );
    }

    #[test]
    fn strategy_from_config() {
        let config = RetrievalConfig {
            strategy: AggregationKind::ScoreThreshold,
            min_score: 0.4,
            ..RetrievalConfig::default()
        };
        assert_eq!(
            AggregationStrategy::from_config(&config),
            AggregationStrategy::ScoreThreshold { min_score: 0.4 }
        );
    }
}
