//! Concurrent fan-out over the selected sources.
//!
//! Every source runs under its own timeout. A failing or slow source
//! contributes nothing; the others are unaffected. Output order is source
//! order, then item order, no matter which source finishes first.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::source::{AggregatedContent, RetrievalSource, RetrievedItem};

/// Query every source concurrently and collect the results.
pub async fn fetch(
    selected: &[Arc<dyn RetrievalSource>],
    query: &str,
    timeout: Duration,
) -> Vec<AggregatedContent> {
    fetch_until(selected, query, timeout, std::future::pending()).await
}

/// Like [`fetch`], but stops collecting once `cancel` resolves and returns
/// whatever has arrived so far.
pub async fn fetch_until<C>(
    selected: &[Arc<dyn RetrievalSource>],
    query: &str,
    timeout: Duration,
    cancel: C,
) -> Vec<AggregatedContent>
where
    C: Future<Output = ()>,
{
    let mut pending: FuturesUnordered<_> = selected
        .iter()
        .enumerate()
        .map(|(index, source)| async move {
            let outcome = tokio::time::timeout(timeout, source.query(query)).await;
            (index, outcome)
        })
        .collect();

    let mut collected: Vec<Vec<RetrievedItem>> = vec![Vec::new(); selected.len()];
    tokio::pin!(cancel);

    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => {
                debug!(remaining = pending.len(), "Retrieval cancelled, returning partial results");
                break;
            }
            next = pending.next() => {
                let Some((index, outcome)) = next else { break };
                let source = selected[index].name();
                match outcome {
                    Ok(Ok(items)) => {
                        debug!(source, items = items.len(), "Source answered");
                        collected[index] = items;
                    }
                    Ok(Err(e)) => warn!(source, error = %e, "Source failed, skipping"),
                    Err(_) => warn!(
                        source,
                        timeout_ms = timeout.as_millis() as u64,
                        "Source timed out, skipping"
                    ),
                }
            }
        }
    }

    collected
        .into_iter()
        .enumerate()
        .flat_map(|(index, items)| {
            let name = selected[index].name();
            items.into_iter().map(move |item| AggregatedContent::from_item(name, item))
        })
        .collect()
}
