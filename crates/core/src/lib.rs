//! # Vocalis Core
//!
//! Domain types, traits, and error definitions for the Vocalis
//! conversational-context engine. This crate performs **no I/O** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping the memory server or model endpoint via configuration
//! - Easy testing with in-memory / scripted implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use memory::{MemoryBackend, MemoryRecord, Namespace, SearchHit, SearchRequest};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use session::{AttributeValue, SessionAttributes};
