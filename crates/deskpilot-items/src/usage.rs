use serde::{Deserialize, Serialize};

/// Prompt-side token detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InputTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

/// Completion-side token detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OutputTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u64,
}

/// Token and cost usage for one turn, or accumulated across a run.
///
/// Accumulation is monotone: `add` only ever increases counters, which is
/// what makes the cumulative per-yield usage non-decreasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    /// USD cost of the response when the provider reports one, else 0.
    #[serde(default)]
    pub response_cost: f64,
    #[serde(default)]
    pub input_tokens_details: InputTokensDetails,
    #[serde(default)]
    pub output_tokens_details: OutputTokensDetails,
}

impl Usage {
    /// Fold another turn's usage into this accumulator.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.response_cost += other.response_cost;
        self.input_tokens_details.cached_tokens = self
            .input_tokens_details
            .cached_tokens
            .saturating_add(other.input_tokens_details.cached_tokens);
        self.output_tokens_details.reasoning_tokens = self
            .output_tokens_details
            .reasoning_tokens
            .saturating_add(other.output_tokens_details.reasoning_tokens);
    }
}
