//! Conversation façade: one streaming entry point and one tool-loop entry
//! point over a shared API client, negotiator, and session state.

pub mod history;
mod tool_loop;


pub use history::sanitize_for_replay;
pub use tool_loop::ToolLoopOutcome;

use crate::api::{ApiClient, SseParser};
use crate::decoder::{ContentEvent, EventSink, StreamDecoder, TurnOutcome};
use crate::error::Result;
use crate::pricing::{PricingTable, SessionStats};
use crate::thinking::{ThinkingMode, ThinkingModeCache, ThinkingNegotiator};
use crate::types::ApiMessage;
use futures::StreamExt;
use std::sync::{Arc, Mutex};

pub struct ConversationClient {
    client: ApiClient,
    negotiator: ThinkingNegotiator,
    pricing: PricingTable,
    /// Cross-turn totals, shared with the caller. Written exactly once per
    /// completed turn.
    stats: Arc<Mutex<SessionStats>>,
}

impl ConversationClient {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            negotiator: ThinkingNegotiator::new(ThinkingModeCache::new()),
            pricing: PricingTable::default(),
            stats: Arc::new(Mutex::new(SessionStats::default())),
        }
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_stats(mut self, stats: Arc<Mutex<SessionStats>>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_mode_cache(mut self, cache: ThinkingModeCache) -> Self {
        self.negotiator = ThinkingNegotiator::new(cache);
        self
    }

    pub fn stats(&self) -> SessionStats {
        *self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mode_cache(&self) -> &ThinkingModeCache {
        self.negotiator.cache()
    }

    pub(crate) fn client(&self) -> &ApiClient {
        &self.client
    }

    pub(crate) fn negotiator(&self) -> &ThinkingNegotiator {
        &self.negotiator
    }

    pub(crate) fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Stream one assistant turn. Decoded content events are delivered to
    /// `sink` in arrival order; the assistant message is appended to
    /// `history` when the turn produced replayable blocks.
    pub async fn stream_chat(
        &self,
        history: &mut Vec<ApiMessage>,
        system: &[String],
        sink: Option<&EventSink>,
    ) -> Result<TurnOutcome> {
        let replay = sanitize_for_replay(history);
        let model = self.client.config().model.clone();
        let thinking_wanted = self.client.config().thinking.enabled;

        let negotiated = self
            .negotiator
            .run(&model, thinking_wanted, |mode| {
                let body =
                    self.client
                        .build_messages_body(&replay, system, None, mode, true);
                async move { self.client.create_stream(&body).await }
            })
            .await?;

        if thinking_wanted && negotiated.mode == ThinkingMode::None {
            notify(
                sink,
                format!("Extended thinking is not supported by {model}."),
            );
        }

        let mut stream = negotiated.value;
        let mut parser = SseParser::new();
        let mut decoder = StreamDecoder::new(&model, &self.pricing, sink);

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in parser.push(&bytes) {
                        decoder.handle(event);
                    }
                }
                Err(error) => {
                    // Mid-stream transport failures are an early stream end:
                    // keep the partial content, report the turn incomplete.
                    notify(sink, format!("Connection lost mid-response: {error}"));
                    break;
                }
            }
            if parser.is_done() || decoder.is_done() {
                break;
            }
        }

        let outcome = decoder.finish();
        if !outcome.completed {
            notify(sink, "Response ended before completion.".to_string());
        } else {
            self.record_turn(&outcome.usage, outcome.cost);
        }

        if !outcome.blocks.is_empty() {
            history.push(ApiMessage::assistant_blocks(outcome.blocks.clone()));
        }
        Ok(outcome)
    }

    /// List model ids available to the configured credential.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.client.list_models().await
    }

    pub(crate) fn record_turn(&self, usage: &crate::pricing::UsageSnapshot, cost: f64) {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record_turn(usage, cost);
    }
}

fn notify(sink: Option<&EventSink>, message: String) {
    if let Some(sink) = sink {
        let _ = sink.send(ContentEvent::Notice(message));
    }
}
