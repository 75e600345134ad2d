//! Token accounting and session-level cost totals.
//!
//! Prices are per thousand tokens. A model is matched against the table by
//! lowercase substring, most specific entry first, so "claude-3-5-sonnet"
//! must be listed before "claude-3-sonnet". Unknown models cost 0.0 rather
//! than failing the turn.

use crate::types::Usage;

#[derive(Debug, Clone, Copy)]
pub struct PriceTier {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

#[derive(Debug, Clone)]
pub struct PricingTable {
    tiers: Vec<(String, PriceTier)>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            tiers: vec![
                tier("claude-opus-4", 15.0, 75.0, 1.5, 18.75),
                tier("claude-sonnet-4", 3.0, 15.0, 0.3, 3.75),
                tier("claude-3-7-sonnet", 3.0, 15.0, 0.3, 3.75),
                tier("claude-3-5-sonnet", 3.0, 15.0, 0.3, 3.75),
                tier("claude-3-5-haiku", 0.8, 4.0, 0.08, 1.0),
                tier("claude-3-opus", 15.0, 75.0, 1.5, 18.75),
                tier("claude-3-sonnet", 3.0, 15.0, 0.3, 3.75),
                tier("claude-3-haiku", 0.25, 1.25, 0.03, 0.3),
            ],
        }
    }
}

fn tier(
    prefix: &str,
    input: f64,
    output: f64,
    cache_read: f64,
    cache_write: f64,
) -> (String, PriceTier) {
    (
        prefix.to_string(),
        PriceTier {
            input: input / 1000.0,
            output: output / 1000.0,
            cache_read: cache_read / 1000.0,
            cache_write: cache_write / 1000.0,
        },
    )
}

impl PricingTable {
    /// Build a table from explicit tiers, matched in the given order. Prices
    /// are per thousand tokens.
    pub fn new(tiers: Vec<(String, PriceTier)>) -> Self {
        Self { tiers }
    }

    fn tier_for(&self, model: &str) -> Option<&PriceTier> {
        let model = model.to_lowercase();
        self.tiers
            .iter()
            .find(|(pattern, _)| model.contains(pattern.as_str()))
            .map(|(_, tier)| tier)
    }

    /// Cost in dollars for one turn. Cache-read tokens are billed at the
    /// cache-read rate, not the input rate, so they are subtracted from the
    /// input count before pricing.
    pub fn cost(&self, model: &str, usage: &UsageSnapshot) -> f64 {
        let Some(tier) = self.tier_for(model) else {
            return 0.0;
        };
        let billable_input = usage.input_tokens.saturating_sub(usage.cache_read_tokens);
        billable_input as f64 * tier.input
            + usage.output_tokens as f64 * tier.output
            + usage.cache_read_tokens as f64 * tier.cache_read
            + usage.cache_write_tokens as f64 * tier.cache_write
    }
}

/// Plain-number view of a [`Usage`] payload, accumulated across the stream
/// events of a turn (and across turns of a tool loop).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub web_search_requests: u64,
}

impl From<&Usage> for UsageSnapshot {
    fn from(usage: &Usage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_read_tokens: usage.cache_read_input_tokens,
            cache_write_tokens: usage.cache_creation_input_tokens,
            web_search_requests: usage.server_tool_use.web_search_requests,
        }
    }
}

impl UsageSnapshot {
    pub fn accumulate(&mut self, other: &UsageSnapshot) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
        self.web_search_requests += other.web_search_requests;
    }
}

/// Running totals for a session. Written once per completed turn; a turn
/// that ends early never reaches this.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub web_search_requests: u64,
}

impl SessionStats {
    pub fn record_turn(&mut self, usage: &UsageSnapshot, cost: f64) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.web_search_requests += usage.web_search_requests;
        self.cost += cost;
    }
}
