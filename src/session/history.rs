//! History hygiene before replaying a conversation to the server.
//!
//! The server rejects malformed history, so anything not valid for replay
//! is dropped here rather than patched: unsigned thinking blocks, empty
//! redacted blocks, unknown block types, and messages left empty after
//! filtering.

use crate::types::{ApiMessage, Content, ContentBlock};

pub fn sanitize_for_replay(history: &[ApiMessage]) -> Vec<ApiMessage> {
    history
        .iter()
        .filter_map(|message| {
            let content = match &message.content {
                Content::Text(text) => {
                    if text.trim().is_empty() {
                        return None;
                    }
                    Content::Text(text.clone())
                }
                Content::Blocks(blocks) => {
                    let kept: Vec<ContentBlock> = blocks
                        .iter()
                        .filter(|block| block_is_replayable(block))
                        .cloned()
                        .collect();
                    if kept.is_empty() {
                        return None;
                    }
                    Content::Blocks(kept)
                }
            };
            Some(ApiMessage {
                role: message.role.clone(),
                content,
            })
        })
        .collect()
}

fn block_is_replayable(block: &ContentBlock) -> bool {
    match block {
        ContentBlock::Text { text } => !text.trim().is_empty(),
        ContentBlock::Thinking { thinking, signature } => {
            !thinking.is_empty() && !signature.is_empty()
        }
        ContentBlock::RedactedThinking { data } => !data.is_empty(),
        ContentBlock::ToolUse { .. }
        | ContentBlock::ToolResult { .. }
        | ContentBlock::ServerToolUse { .. }
        | ContentBlock::WebSearchToolResult { .. } => true,
        ContentBlock::Unknown => false,
    }
}
