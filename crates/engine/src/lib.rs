//! # Vocalis Engine
//!
//! Turns one user utterance into a bounded, relevant model call:
//!
//! 1. **Check out** the session's chat window (cached or loaded from the backend)
//! 2. **Route** the query to the relevant retrieval sources
//! 3. **Fetch** from them concurrently, under a per-source timeout
//! 4. **Aggregate** and inject the content into the user message
//! 5. **Call** the model with the system prompt plus the window, running any
//!    tools it asks for (see [`tools`]) and calling it again
//! 6. **Append** the reply, evicting to stay within the token budget, and persist
//!
//! Reminder suggestions from the "remember" flow are handed to
//! `vocalis-reminders` for the yes/no confirmation dialogue.

pub mod context;
pub mod orchestrator;
pub mod prompts;
pub mod retrieval;
pub mod session_cache;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ChatWindow, HeuristicEstimator, PersistOutcome, TokenEstimator, WindowSettings};
pub use orchestrator::{ForgetOutcome, IntroOutcome, Orchestrator, RememberOutcome, RequestContext};
pub use retrieval::{
    AggregatedContent, AggregationStrategy, QueryClassifier, QueryRouter, RetrievalAugmentor, RetrievalSource,
};
pub use session_cache::SessionCache;
pub use tools::{DateTimeTool, Tool, ToolContext, ToolRegistry};
