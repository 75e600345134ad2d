//! Agentic tool loop: non-streaming turns alternating with local tool
//! execution until the model stops asking for tools.

use super::{sanitize_for_replay, ConversationClient};
use crate::decoder::{ContentEvent, EventSink, SearchSource};
use crate::error::{Error, Result};
use crate::pricing::UsageSnapshot;
use crate::thinking::ThinkingMode;
use crate::tools::declarations::{tool_definitions, TEXT_EDITOR_TOOL_NAME};
use crate::tools::{ToolExecutor, WebSearchOptions};
use crate::types::{ApiMessage, ContentBlock, MessageResponse};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ToolLoopOutcome {
    /// Text of the terminating assistant turn.
    pub text: String,
    pub sources: Vec<SearchSource>,
    /// Totals across every turn of the loop.
    pub usage: UsageSnapshot,
    pub cost: f64,
    pub turns: usize,
}

impl ConversationClient {
    /// Drive the tool loop to completion. Each iteration sends the full
    /// accumulated history with tool declarations, executes any requested
    /// editor calls, and feeds the results back as the next user message.
    ///
    /// The loop has no internal round cap: the model decides when to stop,
    /// and runaway loops are bounded only by external rate and cost limits.
    pub async fn run_tool_loop(
        &self,
        history: &mut Vec<ApiMessage>,
        system: &[String],
        executor: &ToolExecutor,
        web_search: Option<&WebSearchOptions>,
        sink: Option<&EventSink>,
    ) -> Result<ToolLoopOutcome> {
        let model = self.client().config().model.clone();
        let thinking_wanted = self.client().config().thinking.enabled;
        let tools = tool_definitions(executor.max_characters(), web_search);

        let mut total_usage = UsageSnapshot::default();
        let mut total_cost = 0.0;
        let mut sources: Vec<SearchSource> = Vec::new();
        let mut turns = 0usize;

        loop {
            let replay = sanitize_for_replay(history);
            let negotiated = self
                .negotiator()
                .run(&model, thinking_wanted, |mode| {
                    let body = self.client().build_messages_body(
                        &replay,
                        system,
                        Some(&tools),
                        mode,
                        false,
                    );
                    async move { self.client().send_messages(&body).await }
                })
                .await?;
            if turns == 0 && thinking_wanted && negotiated.mode == ThinkingMode::None {
                emit(
                    sink,
                    ContentEvent::Notice(format!(
                        "Extended thinking is not supported by {model}."
                    )),
                );
            }
            let response = negotiated.value;
            turns += 1;

            let turn_usage = UsageSnapshot::from(&response.usage);
            let billing_model = if response.model.is_empty() {
                &model
            } else {
                &response.model
            };
            let turn_cost = self.pricing().cost(billing_model, &turn_usage);
            total_usage.accumulate(&turn_usage);
            total_cost += turn_cost;
            self.record_turn(&turn_usage, turn_cost);

            let turn_text = render_turn(&response, sink);
            sources.extend(collect_sources(&response.content));
            history.push(ApiMessage::assistant_blocks(response.content.clone()));

            match response.stop_reason.as_deref() {
                Some("tool_use") => {
                    let results = execute_tool_calls(&response.content, executor, sink);
                    if results.is_empty() {
                        return Err(Error::UnexpectedStop {
                            stop_reason: "tool_use without tool_use blocks".to_string(),
                        });
                    }
                    history.push(ApiMessage::user_blocks(results));
                }
                Some("end_turn") => {
                    return Ok(self.finish_loop(
                        turn_text, sources, total_usage, total_cost, turns, sink,
                    ));
                }
                // Some servers omit the stop reason on a plain text answer.
                None if !turn_text.is_empty() => {
                    return Ok(self.finish_loop(
                        turn_text, sources, total_usage, total_cost, turns, sink,
                    ));
                }
                other => {
                    return Err(Error::UnexpectedStop {
                        stop_reason: other.unwrap_or("<none>").to_string(),
                    });
                }
            }
        }
    }

    fn finish_loop(
        &self,
        text: String,
        sources: Vec<SearchSource>,
        usage: UsageSnapshot,
        cost: f64,
        turns: usize,
        sink: Option<&EventSink>,
    ) -> ToolLoopOutcome {
        emit(sink, ContentEvent::Usage(usage));
        emit(sink, ContentEvent::Done { cost });
        ToolLoopOutcome {
            text,
            sources,
            usage,
            cost,
            turns,
        }
    }
}

/// Push the renderable pieces of one non-streaming response to the sink and
/// return its concatenated text.
fn render_turn(response: &MessageResponse, sink: Option<&EventSink>) -> String {
    let mut text = String::new();
    for block in &response.content {
        match block {
            ContentBlock::Text { text: piece } => {
                text.push_str(piece);
                emit(sink, ContentEvent::TextDelta(piece.clone()));
            }
            ContentBlock::ToolUse { id, name, .. } => {
                emit(
                    sink,
                    ContentEvent::ToolUseBegin {
                        id: id.clone(),
                        name: name.clone(),
                    },
                );
            }
            _ => {}
        }
    }
    text
}

fn collect_sources(blocks: &[ContentBlock]) -> Vec<SearchSource> {
    let mut sources = Vec::new();
    for block in blocks {
        if let ContentBlock::WebSearchToolResult { content, .. } = block {
            if let Value::Array(items) = content {
                for item in items {
                    let Some(url) = item.get("url").and_then(Value::as_str) else {
                        continue;
                    };
                    let title = item
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or(url)
                        .to_string();
                    sources.push(SearchSource {
                        title,
                        url: url.to_string(),
                    });
                }
            }
        }
    }
    sources
}

/// Run every `tool_use` block in response order and return one correlated
/// `tool_result` per call. Server-side tools never reach this.
fn execute_tool_calls(
    blocks: &[ContentBlock],
    executor: &ToolExecutor,
    sink: Option<&EventSink>,
) -> Vec<ContentBlock> {
    let mut results = Vec::new();
    for block in blocks {
        let ContentBlock::ToolUse { id, name, input } = block else {
            continue;
        };
        let result = if name == TEXT_EDITOR_TOOL_NAME {
            executor.run(id, input)
        } else {
            ContentBlock::ToolResult {
                tool_use_id: id.clone(),
                content: format!("Error: Unknown tool '{name}'."),
                is_error: true,
            }
        };
        if let ContentBlock::ToolResult {
            content, is_error, ..
        } = &result
        {
            if *is_error {
                emit(sink, ContentEvent::Notice(content.clone()));
            }
        }
        results.push(result);
    }
    results
}

fn emit(sink: Option<&EventSink>, event: ContentEvent) {
    if let Some(sink) = sink {
        let _ = sink.send(event);
    }
}
