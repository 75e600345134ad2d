//! Content-block state machine over the parsed SSE event sequence.
//!
//! The decoder turns [`StreamEvent`]s into ordered [`ContentEvent`]s for the
//! caller's sink and, in parallel, accumulates the typed blocks that make up
//! the assistant turn for history replay. Replay rules differ from display
//! rules: a thinking block is only replayable once signed, and redacted
//! thinking is replayed opaquely without ever being shown.

use crate::pricing::{PricingTable, UsageSnapshot};
use crate::types::{ContentBlock, StreamEvent, Usage};
use serde_json::Value;
use tokio::sync::mpsc;

/// Normalized events pushed to the caller's sink, in strict arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentEvent {
    TextDelta(String),
    ThinkingBegin,
    ThinkingDelta(String),
    ThinkingEnd,
    RedactedBegin,
    RedactedEnd,
    Citation { title: String, url: String },
    ToolUseBegin { id: String, name: String },
    WebSearchSources(Vec<SearchSource>),
    /// Informational message that is not part of the response text.
    Notice(String),
    Usage(UsageSnapshot),
    Done { cost: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSource {
    pub title: String,
    pub url: String,
}

pub type EventSink = mpsc::UnboundedSender<ContentEvent>;

/// Everything a completed (or interrupted) turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Concatenation of all text deltas.
    pub text: String,
    /// Blocks safe to replay as the assistant message of this turn.
    pub blocks: Vec<ContentBlock>,
    pub sources: Vec<SearchSource>,
    pub usage: UsageSnapshot,
    pub stop_reason: Option<String>,
    pub cost: f64,
    /// False when the stream ended before `message_stop`.
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    None,
    Text,
    Thinking,
    Redacted,
    ToolUse,
    ServerToolUse,
    WebSearch,
    Other,
}

pub struct StreamDecoder<'a> {
    model: String,
    pricing: &'a PricingTable,
    sink: Option<&'a EventSink>,

    block: BlockKind,
    thinking_open: bool,

    response_text: String,
    text_buf: String,
    thinking_buf: String,
    thinking_signature: String,
    redacted_buf: String,
    tool_id: String,
    tool_name: String,
    tool_input_buf: String,
    search_id: String,
    search_items: Vec<Value>,
    search_json_buf: String,

    blocks: Vec<ContentBlock>,
    sources: Vec<SearchSource>,
    usage: UsageSnapshot,
    stop_reason: Option<String>,
    cost: f64,
    completed: bool,
}

impl<'a> StreamDecoder<'a> {
    pub fn new(model: &str, pricing: &'a PricingTable, sink: Option<&'a EventSink>) -> Self {
        Self {
            model: model.to_string(),
            pricing,
            sink,
            block: BlockKind::None,
            thinking_open: false,
            response_text: String::new(),
            text_buf: String::new(),
            thinking_buf: String::new(),
            thinking_signature: String::new(),
            redacted_buf: String::new(),
            tool_id: String::new(),
            tool_name: String::new(),
            tool_input_buf: String::new(),
            search_id: String::new(),
            search_items: Vec::new(),
            search_json_buf: String::new(),
            blocks: Vec::new(),
            sources: Vec::new(),
            usage: UsageSnapshot::default(),
            stop_reason: None,
            cost: 0.0,
            completed: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed
    }

    fn emit(&self, event: ContentEvent) {
        if let Some(sink) = self.sink {
            // A dropped receiver means the caller stopped listening; decoding
            // continues so the turn outcome stays complete.
            let _ = sink.send(event);
        }
    }

    pub fn handle(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::MessageStart { message } => {
                if !message.model.is_empty() {
                    self.model = message.model;
                }
                self.seed_usage(&message.usage);
            }
            StreamEvent::ContentBlockStart { content_block, .. } => {
                self.start_block(content_block)
            }
            StreamEvent::ContentBlockDelta { delta, .. } => {
                if let Some(signature) = delta.signature {
                    self.thinking_signature.push_str(&signature);
                }
                if let Some(thinking) = delta.thinking {
                    self.thinking_buf.push_str(&thinking);
                    self.emit(ContentEvent::ThinkingDelta(thinking));
                }
                if let Some(data) = delta.data {
                    // Opaque redacted bytes: tracked for replay, never shown.
                    self.redacted_buf.push_str(&data);
                }
                if let Some(text) = delta.text {
                    self.text_buf.push_str(&text);
                    self.response_text.push_str(&text);
                    self.emit(ContentEvent::TextDelta(text));
                }
                if let Some(partial) = delta.partial_json {
                    match self.block {
                        BlockKind::ToolUse | BlockKind::ServerToolUse => {
                            self.tool_input_buf.push_str(&partial)
                        }
                        BlockKind::WebSearch => self.search_json_buf.push_str(&partial),
                        _ => {}
                    }
                }
                if let Some(citations) = delta.citations {
                    for citation in citations {
                        self.emit(ContentEvent::Citation {
                            title: citation.title,
                            url: citation.url,
                        });
                    }
                }
            }
            StreamEvent::ContentBlockStop { .. } => self.stop_block(),
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    self.merge_usage(&usage);
                }
                if let Some(stop_reason) = delta.stop_reason {
                    self.stop_reason = Some(stop_reason);
                }
            }
            StreamEvent::MessageStop => {
                self.close_dangling_thinking();
                self.cost = self.pricing.cost(&self.model, &self.usage);
                self.completed = true;
                self.emit(ContentEvent::Usage(self.usage));
                self.emit(ContentEvent::Done { cost: self.cost });
            }
            StreamEvent::Ping | StreamEvent::Unknown => {}
        }
    }

    /// Consume the decoder and return the turn outcome. Safe to call after
    /// an early stream end; `completed` reports which case this was.
    pub fn finish(mut self) -> TurnOutcome {
        if !self.completed {
            // Interrupted mid-block: keep what is committable.
            self.stop_block();
            self.close_dangling_thinking();
        }
        TurnOutcome {
            text: self.response_text,
            blocks: self.blocks,
            sources: self.sources,
            usage: self.usage,
            stop_reason: self.stop_reason,
            cost: self.cost,
            completed: self.completed,
        }
    }

    fn start_block(&mut self, block: ContentBlock) {
        match block {
            ContentBlock::Text { text } => {
                // The first text block closes any open thinking section, even
                // without an explicit server signal.
                self.close_dangling_thinking();
                self.block = BlockKind::Text;
                if !text.is_empty() {
                    self.text_buf.push_str(&text);
                    self.response_text.push_str(&text);
                    self.emit(ContentEvent::TextDelta(text));
                }
            }
            ContentBlock::Thinking {
                thinking,
                signature,
            } => {
                self.block = BlockKind::Thinking;
                if !self.thinking_open {
                    self.thinking_open = true;
                    self.emit(ContentEvent::ThinkingBegin);
                }
                self.thinking_signature = signature;
                if !thinking.is_empty() {
                    self.thinking_buf.push_str(&thinking);
                    self.emit(ContentEvent::ThinkingDelta(thinking));
                }
            }
            ContentBlock::RedactedThinking { data } => {
                self.block = BlockKind::Redacted;
                self.redacted_buf = data;
                self.emit(ContentEvent::RedactedBegin);
            }
            ContentBlock::ToolUse { id, name, .. } => {
                self.block = BlockKind::ToolUse;
                self.emit(ContentEvent::ToolUseBegin {
                    id: id.clone(),
                    name: name.clone(),
                });
                self.tool_id = id;
                self.tool_name = name;
                self.tool_input_buf.clear();
            }
            ContentBlock::ServerToolUse { id, name, .. } => {
                self.block = BlockKind::ServerToolUse;
                self.tool_id = id;
                self.tool_name = name;
                self.tool_input_buf.clear();
            }
            ContentBlock::WebSearchToolResult {
                tool_use_id,
                content,
            } => {
                self.block = BlockKind::WebSearch;
                self.search_id = tool_use_id;
                self.search_items = match content {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    other => vec![other],
                };
                self.search_json_buf.clear();
            }
            ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {
                self.block = BlockKind::Other;
            }
        }
    }

    fn stop_block(&mut self) {
        match self.block {
            BlockKind::Text => {
                if !self.text_buf.is_empty() {
                    self.blocks.push(ContentBlock::Text {
                        text: std::mem::take(&mut self.text_buf),
                    });
                }
            }
            BlockKind::Thinking => {
                // Unsigned thinking must never be replayed; the streamed text
                // was display-only.
                if !self.thinking_signature.is_empty() && !self.thinking_buf.is_empty() {
                    self.blocks.push(ContentBlock::Thinking {
                        thinking: std::mem::take(&mut self.thinking_buf),
                        signature: std::mem::take(&mut self.thinking_signature),
                    });
                } else {
                    self.thinking_buf.clear();
                    self.thinking_signature.clear();
                }
            }
            BlockKind::Redacted => {
                self.emit(ContentEvent::RedactedEnd);
                if !self.redacted_buf.is_empty() {
                    self.blocks.push(ContentBlock::RedactedThinking {
                        data: std::mem::take(&mut self.redacted_buf),
                    });
                }
            }
            BlockKind::ToolUse => {
                self.blocks.push(ContentBlock::ToolUse {
                    id: std::mem::take(&mut self.tool_id),
                    name: std::mem::take(&mut self.tool_name),
                    input: parse_accumulated_input(&std::mem::take(&mut self.tool_input_buf)),
                });
            }
            BlockKind::ServerToolUse => {
                self.blocks.push(ContentBlock::ServerToolUse {
                    id: std::mem::take(&mut self.tool_id),
                    name: std::mem::take(&mut self.tool_name),
                    input: parse_accumulated_input(&std::mem::take(&mut self.tool_input_buf)),
                });
            }
            BlockKind::WebSearch => self.finish_web_search(),
            BlockKind::None | BlockKind::Other => {}
        }
        self.block = BlockKind::None;
    }

    fn finish_web_search(&mut self) {
        let mut items = std::mem::take(&mut self.search_items);
        let buffered = std::mem::take(&mut self.search_json_buf);
        if !buffered.is_empty() {
            if let Ok(Value::Array(more)) = serde_json::from_str::<Value>(&buffered) {
                items.extend(more);
            }
        }

        let error_item = items.iter().find(|item| {
            item.get("type")
                .and_then(Value::as_str)
                .is_some_and(|kind| kind.ends_with("error"))
        });
        if let Some(error_item) = error_item {
            let code = error_item
                .get("error_code")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            self.emit(ContentEvent::Notice(format!("Web search failed: {code}")));
        } else {
            let batch: Vec<SearchSource> = items
                .iter()
                .filter_map(|item| {
                    let url = item.get("url")?.as_str()?.to_string();
                    let title = item
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or(&url)
                        .to_string();
                    Some(SearchSource { title, url })
                })
                .collect();
            if !batch.is_empty() {
                self.sources.extend(batch.clone());
                self.emit(ContentEvent::WebSearchSources(batch));
            }
        }

        self.blocks.push(ContentBlock::WebSearchToolResult {
            tool_use_id: std::mem::take(&mut self.search_id),
            content: Value::Array(items),
        });
    }

    fn close_dangling_thinking(&mut self) {
        if self.thinking_open {
            self.thinking_open = false;
            self.emit(ContentEvent::ThinkingEnd);
        }
        // A buffer still pending here never got its signature.
        self.thinking_buf.clear();
        self.thinking_signature.clear();
    }

    fn seed_usage(&mut self, usage: &Usage) {
        self.usage = UsageSnapshot::from(usage);
    }

    fn merge_usage(&mut self, usage: &Usage) {
        if usage.input_tokens > 0 {
            self.usage.input_tokens = usage.input_tokens;
        }
        if usage.output_tokens > 0 {
            self.usage.output_tokens = usage.output_tokens;
        }
        if usage.cache_read_input_tokens > 0 {
            self.usage.cache_read_tokens = usage.cache_read_input_tokens;
        }
        if usage.cache_creation_input_tokens > 0 {
            self.usage.cache_write_tokens = usage.cache_creation_input_tokens;
        }
        if usage.server_tool_use.web_search_requests > 0 {
            self.usage.web_search_requests = usage.server_tool_use.web_search_requests;
        }
    }
}

fn parse_accumulated_input(buffered: &str) -> Value {
    if buffered.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(buffered).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}
