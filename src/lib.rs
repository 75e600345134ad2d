//! Client-side conversation engine for an LLM messages API.
//!
//! The crate drives a conversation against a streaming messages endpoint:
//! it decodes server-sent events into typed content blocks, negotiates the
//! extended-thinking capability per model, runs a sandboxed file-editing
//! tool loop, and keeps per-session token and cost accounting.
//!
//! Entry point is [`session::ConversationClient`] with its two operations,
//! [`session::ConversationClient::stream_chat`] and
//! [`session::ConversationClient::run_tool_loop`].

pub mod api;
pub mod auth;
pub mod config;
pub mod decoder;
pub mod error;
pub mod pricing;
pub mod sandbox;
pub mod session;
pub mod thinking;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(test)]
pub mod test_support;

pub use api::ApiClient;
pub use config::Config;
pub use decoder::{ContentEvent, EventSink, SearchSource, StreamDecoder, TurnOutcome};
pub use error::{Error, Result};
pub use pricing::{PricingTable, SessionStats, UsageSnapshot};
pub use sandbox::PathSandbox;
pub use session::{ConversationClient, ToolLoopOutcome};
pub use thinking::{ThinkingMode, ThinkingModeCache, ThinkingNegotiator};
pub use tools::{ToolExecutor, WebSearchOptions};
pub use types::{ApiMessage, Content, ContentBlock};
