// src/orchestrator/types.rs

use serde::Serialize;
use serde_json::Value;

use crate::interpreter::Intent;

/// Which cascade stage produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStage {
    DatabaseHit,
    SemanticMatch,
    WebResearch,
    MultiStep,
    Clarification,
}

/// Estimated model-token spend per stage. Store lookups are free; the
/// numbers exist to make the cascade's cost visible, not to bill anyone.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TokenUsage {
    pub interpreter: u64,
    pub matcher: u64,
    pub researcher: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.interpreter + self.matcher + self.researcher
    }
}

/// Uniform result for every processed query, success or not.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub success: bool,
    pub stage: CascadeStage,
    pub intent: Intent,
    pub providers: Vec<Value>,
    pub message: String,
    pub confidence: f64,
    pub token_usage: TokenUsage,
    pub execution_time_ms: u64,
    pub steps_executed: Vec<String>,
    pub warnings: Vec<String>,
    pub clarification_question: Option<String>,
}
