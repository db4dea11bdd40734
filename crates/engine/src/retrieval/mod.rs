//! Retrieval Router & Aggregator.
//!
//! - [`source`]: the [`RetrievalSource`] seam and the three built-in sources
//! - [`router`]: classifier-driven source selection with a fallback policy
//! - [`fetch`]: bounded concurrent fan-out
//! - [`aggregate`]: dedup, filtering and rank fusion
//! - [`augmentor`]: the whole pipeline, ending in the augmented user message

pub mod aggregate;
pub mod augmentor;
pub mod fetch;
pub mod router;
pub mod source;

pub use aggregate::{AggregationStrategy, aggregate};
pub use augmentor::{RetrievalAugmentor, inject};
pub use fetch::{fetch, fetch_until};
pub use router::{LanguageModelClassifier, QueryClassifier, QueryRouter, parse_selection};
pub use source::{
    AggregatedContent, ChatHistorySource, KnowledgeBaseSource, RetrievalSource, RetrievedItem,
    UserMemorySource,
};
