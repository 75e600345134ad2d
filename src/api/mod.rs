pub mod client;
pub mod logging;
pub mod stream;

pub use client::{ApiClient, ByteStream};
pub use stream::SseParser;
