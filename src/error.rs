use aho_corasick::AhoCorasick;
use thiserror::Error;

/// Keywords that mark an HTTP 400 as a rejection of the thinking
/// configuration rather than of the request as a whole. This is a
/// documented heuristic: the server does not advertise thinking support
/// up front, so a fixed keyword set is matched against the error body
/// instead of maintaining a per-model capability table.
const THINKING_REJECTION_KEYWORDS: [&str; 5] = [
    "thinking",
    "adaptive",
    "budget_tokens",
    "effort",
    "output_config",
];

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no usable credential: {0}")]
    AuthMissing(String),

    /// 404 with a structured "model: X" error body. Surfaced distinctly so
    /// callers can offer a model-switch action.
    #[error("the \"{model}\" model cannot be found")]
    ModelNotFound { model: String },

    /// Any non-success HTTP status that is not a recognized special case.
    /// `message` carries the error type and message from the response body
    /// when the body was parseable, otherwise the raw body text.
    #[error("API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Every thinking candidate was rejected, including `none`.
    #[error("thinking negotiation exhausted for model '{model}'")]
    ThinkingUnsupported { model: String },

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("path '{path}' rejected: {reason}")]
    PathRejected { path: String, reason: String },

    #[error("unexpected stop reason '{stop_reason}'")]
    UnexpectedStop { stop_reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed response body: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True when the server rejected the request because of its thinking
    /// configuration: HTTP 400 with one of the fixed keywords somewhere in
    /// the error message or type, case-insensitive.
    pub fn is_thinking_rejection(&self) -> bool {
        let Error::Api { status: 400, message } = self else {
            return false;
        };
        match AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(THINKING_REJECTION_KEYWORDS)
        {
            Ok(matcher) => matcher.is_match(message),
            Err(_) => false,
        }
    }
}
