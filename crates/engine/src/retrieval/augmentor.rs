//! Retrieval augmentation: route → fetch → aggregate → inject.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use vocalis_config::RetrievalConfig;

use super::aggregate::{AggregationStrategy, aggregate};
use super::fetch::fetch;
use super::router::{QueryClassifier, QueryRouter};
use super::source::{AggregatedContent, RetrievalSource};

const INJECTION_HEADER: &str = "\n\nAnswer using the following information:\n";

pub struct RetrievalAugmentor {
    router: QueryRouter,
    strategy: AggregationStrategy,
    max_items: Option<usize>,
    source_timeout: Duration,
}

impl RetrievalAugmentor {
    pub fn new(
        router: QueryRouter,
        strategy: AggregationStrategy,
        max_items: Option<usize>,
        source_timeout: Duration,
    ) -> Self {
        Self {
            router,
            strategy,
            max_items,
            source_timeout,
        }
    }

    pub fn from_config(classifier: Arc<dyn QueryClassifier>, config: &RetrievalConfig) -> Self {
        Self::new(
            QueryRouter::new(
                classifier,
                config.fallback,
                Duration::from_millis(config.classifier_timeout_ms),
            ),
            AggregationStrategy::from_config(config),
            config.max_items,
            Duration::from_millis(config.source_timeout_ms),
        )
    }

    /// Gather the content relevant to `query` from `sources`.
    pub async fn retrieve(
        &self,
        query: &str,
        sources: &[Arc<dyn RetrievalSource>],
    ) -> Vec<AggregatedContent> {
        let selected = self.router.route(query, sources).await;
        if selected.is_empty() {
            return Vec::new();
        }

        let fetched = fetch(&selected, query, self.source_timeout).await;
        let fetched_count = fetched.len();
        let merged = aggregate(fetched, &self.strategy, self.max_items);
        info!(
            routed = selected.len(),
            fetched = fetched_count,
            kept = merged.len(),
            "Retrieval complete"
        );
        merged
    }

    /// Retrieve for `query` and inject the result into `message`.
    pub async fn augment(
        &self,
        message: &str,
        query: &str,
        sources: &[Arc<dyn RetrievalSource>],
    ) -> String {
        let contents = self.retrieve(query, sources).await;
        inject(message, &contents)
    }
}

/// Append the retrieved content to a user message. With nothing retrieved
/// the message is returned unchanged.
pub fn inject(message: &str, contents: &[AggregatedContent]) -> String {
    if contents.is_empty() {
        return message.to_string();
    }
    let items: Vec<&str> = contents.iter().map(|c| c.text.as_str()).collect();
    format!("{message}{INJECTION_HEADER}{}", items.join("\n\n"))
}
