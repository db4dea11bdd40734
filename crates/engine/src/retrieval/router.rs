//! Query routing — choosing which sources are worth querying.
//!
//! A [`QueryClassifier`] picks source indices for a query. The router turns
//! that pick into a subset of the input sources and falls back to the
//! configured [`FallbackPolicy`] whenever the classifier fails, times out, or
//! gives nothing usable. Routing never fails.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vocalis_config::FallbackPolicy;
use vocalis_core::Result;
use vocalis_core::provider::{Provider, ProviderRequest};

use super::source::RetrievalSource;

/// Picks the sources relevant to a query.
#[async_trait]
pub trait QueryClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Return zero-based indices into `descriptions`. Out-of-range indices
    /// are ignored by the router.
    async fn classify(&self, query: &str, descriptions: &[&str]) -> Result<Vec<usize>>;
}

pub struct QueryRouter {
    classifier: Arc<dyn QueryClassifier>,
    fallback: FallbackPolicy,
    timeout: Duration,
}

impl QueryRouter {
    pub fn new(classifier: Arc<dyn QueryClassifier>, fallback: FallbackPolicy, timeout: Duration) -> Self {
        Self {
            classifier,
            fallback,
            timeout,
        }
    }

    /// Select the subset of `sources` to query, in input order.
    pub async fn route(
        &self,
        query: &str,
        sources: &[Arc<dyn RetrievalSource>],
    ) -> Vec<Arc<dyn RetrievalSource>> {
        if sources.is_empty() {
            return Vec::new();
        }

        let descriptions: Vec<&str> = sources.iter().map(|s| s.description()).collect();
        let picked = match tokio::time::timeout(self.timeout, self.classifier.classify(query, &descriptions)).await {
            Ok(Ok(indices)) => indices
                .into_iter()
                .filter(|&i| i < sources.len())
                .collect::<BTreeSet<_>>(),
            Ok(Err(e)) => {
                warn!(classifier = self.classifier.name(), error = %e, "Query classification failed");
                BTreeSet::new()
            }
            Err(_) => {
                warn!(
                    classifier = self.classifier.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Query classification timed out"
                );
                BTreeSet::new()
            }
        };

        if picked.is_empty() {
            debug!(fallback = ?self.fallback, "No usable classification, applying fallback");
            return match self.fallback {
                FallbackPolicy::RouteToAll => sources.to_vec(),
                FallbackPolicy::RouteToNone => Vec::new(),
            };
        }

        let selected: Vec<_> = picked.into_iter().map(|i| Arc::clone(&sources[i])).collect();
        debug!(
            sources = ?selected.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            "Routed query"
        );
        selected
    }
}

// ── Language-model classifier ─────────────────────────────────────────────

/// Asks the model to pick sources by number.
pub struct LanguageModelClassifier {
    provider: Arc<dyn Provider>,
    model: String,
}

impl LanguageModelClassifier {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    fn prompt(query: &str, descriptions: &[&str]) -> String {
        let options: Vec<String> = descriptions
            .iter()
            .enumerate()
            .map(|(i, d)| format!("{}: {}", i + 1, d))
            .collect();
        format!(
            "Based on the user query, determine the most suitable data source(s) to retrieve \
             relevant information from the following options:\n{}\n\
             It is very important that your answer consists of either a single number or \
             multiple numbers separated by commas and nothing else!\n\
             User query: {}",
            options.join("\n"),
            query
        )
    }
}

/// Parse a "1, 3" style reply into zero-based indices. Tokens that are not
/// positive integers are skipped.
pub fn parse_selection(reply: &str) -> Vec<usize> {
    reply
        .split(',')
        .filter_map(|token| token.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .map(|n| n - 1)
        .collect()
}

#[async_trait]
impl QueryClassifier for LanguageModelClassifier {
    fn name(&self) -> &str {
        "language_model"
    }

    async fn classify(&self, query: &str, descriptions: &[&str]) -> Result<Vec<usize>> {
        let mut request = ProviderRequest::prompt(
            &self.model,
            "You route user queries to data sources.",
            Self::prompt(query, descriptions),
        );
        request.temperature = 0.0;

        let response = self.provider.complete(request).await?;
        Ok(parse_selection(&response.content))
    }
}
