//! Per-model negotiation of the thinking capability.
//!
//! The server does not advertise which thinking mode a model accepts, so the
//! first turn for a model probes candidates in a fixed order and caches the
//! winner. Candidates run strictly one after another; a discarded attempt is
//! never left in flight.

use crate::config::ThinkingSettings;
use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

pub const MIN_THINKING_BUDGET_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingMode {
    /// Server-chosen budget; an effort hint rides along in `output_config`.
    Adaptive,
    /// Explicit client-side token budget.
    Manual,
    None,
}

impl ThinkingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adaptive => "adaptive",
            Self::Manual => "manual",
            Self::None => "none",
        }
    }

    pub fn is_thinking(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Patch a request body with this mode's `thinking`/`output_config`
    /// fields. The manual budget is clamped to `[1024, max_tokens - 1]`.
    pub fn apply(&self, body: &mut Value, settings: &ThinkingSettings, max_tokens: u32) {
        let Some(object) = body.as_object_mut() else {
            return;
        };
        match self {
            Self::Adaptive => {
                object.insert("thinking".to_string(), json!({ "type": "adaptive" }));
                object.insert(
                    "output_config".to_string(),
                    json!({ "effort": settings.effort }),
                );
            }
            Self::Manual => {
                let budget = settings
                    .budget_tokens
                    .clamp(MIN_THINKING_BUDGET_TOKENS, max_tokens.saturating_sub(1));
                object.insert(
                    "thinking".to_string(),
                    json!({ "type": "enabled", "budget_tokens": budget }),
                );
            }
            Self::None => {}
        }
    }
}

/// Model id → last successful mode. Never evicted within a session, so a
/// model that already fell back to `none` is not re-probed.
#[derive(Debug, Clone, Default)]
pub struct ThinkingModeCache {
    inner: Arc<Mutex<HashMap<String, ThinkingMode>>>,
}

impl ThinkingModeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model: &str) -> Option<ThinkingMode> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(model)
            .copied()
    }

    pub fn set(&self, model: &str, mode: ThinkingMode) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(model.to_string(), mode);
    }
}

/// The result of a negotiated request: the attempt's value plus the mode the
/// server ended up accepting.
pub struct Negotiated<T> {
    pub value: T,
    pub mode: ThinkingMode,
}

pub struct ThinkingNegotiator {
    cache: ThinkingModeCache,
}

impl ThinkingNegotiator {
    pub fn new(cache: ThinkingModeCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ThinkingModeCache {
        &self.cache
    }

    /// Drive `attempt` through the candidate sequence for `model`.
    ///
    /// A candidate is abandoned for the next one only when the attempt fails
    /// with a thinking-keyword HTTP 400; any other error is terminal and
    /// surfaced as-is. The winning mode is cached so subsequent turns make a
    /// single attempt.
    pub async fn run<T, F, Fut>(
        &self,
        model: &str,
        thinking_wanted: bool,
        mut attempt: F,
    ) -> Result<Negotiated<T>>
    where
        F: FnMut(ThinkingMode) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !thinking_wanted {
            let value = attempt(ThinkingMode::None).await?;
            return Ok(Negotiated {
                value,
                mode: ThinkingMode::None,
            });
        }

        let candidates: Vec<ThinkingMode> = match self.cache.get(model) {
            Some(mode) => vec![mode],
            None => vec![ThinkingMode::Adaptive, ThinkingMode::Manual, ThinkingMode::None],
        };

        let last = candidates.len() - 1;
        for (position, mode) in candidates.into_iter().enumerate() {
            match attempt(mode).await {
                Ok(value) => {
                    self.cache.set(model, mode);
                    return Ok(Negotiated { value, mode });
                }
                Err(error) if error.is_thinking_rejection() && position < last => continue,
                Err(error) if error.is_thinking_rejection() => {
                    return Err(Error::ThinkingUnsupported {
                        model: model.to_string(),
                    });
                }
                Err(error) => return Err(error),
            }
        }

        Err(Error::ThinkingUnsupported {
            model: model.to_string(),
        })
    }
}
