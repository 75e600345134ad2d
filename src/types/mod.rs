mod api;

pub use api::{
    ApiMessage, Citation, Content, ContentBlock, Delta, MessageDeltaBody, MessageResponse,
    MessageStart, ModelInfo, ModelList, ServerToolUsage, StreamEvent, Usage,
};
