// src/interpreter/types.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What the user wants done. Closed set so orchestrator dispatch is
/// checked exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Search,
    Add,
    Compare,
    List,
    Update,
    Delete,
    Research,
    Verify,
    Relate,
    Clarify,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Search => "search",
            Intent::Add => "add",
            Intent::Compare => "compare",
            Intent::List => "list",
            Intent::Update => "update",
            Intent::Delete => "delete",
            Intent::Research => "research",
            Intent::Verify => "verify",
            Intent::Relate => "relate",
            Intent::Clarify => "clarify",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "search" => Some(Intent::Search),
            "add" => Some(Intent::Add),
            "compare" => Some(Intent::Compare),
            "list" => Some(Intent::List),
            "update" => Some(Intent::Update),
            "delete" => Some(Intent::Delete),
            "research" => Some(Intent::Research),
            "verify" => Some(Intent::Verify),
            "relate" => Some(Intent::Relate),
            "clarify" => Some(Intent::Clarify),
            _ => None,
        }
    }

    /// Intents that cannot proceed without at least one named provider.
    pub fn requires_provider(&self) -> bool {
        matches!(
            self,
            Intent::Search
                | Intent::Add
                | Intent::Update
                | Intent::Delete
                | Intent::Research
                | Intent::Verify
                | Intent::Relate
        )
    }
}

/// A provider the user mentioned, with any location attached to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderMention {
    pub name: String,
    pub location: Option<String>,
}

impl ProviderMention {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilters {
    pub state: Option<String>,
    pub city: Option<String>,
    pub provider_type: Option<String>,
    pub parent_organization: Option<String>,
}

/// Structured interpretation of one free-text query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub intent: Intent,
    pub providers: Vec<ProviderMention>,
    pub filters: QueryFilters,
    /// Which pronouns and deictic words resolved to what.
    pub resolved_references: BTreeMap<String, String>,
    pub multi_step_plan: Vec<String>,
    pub clarification_needed: Option<String>,
    pub confidence: f64,
}

impl ParsedQuery {
    pub fn clarification(question: impl Into<String>) -> Self {
        Self {
            intent: Intent::Clarify,
            providers: Vec::new(),
            filters: QueryFilters::default(),
            resolved_references: BTreeMap::new(),
            multi_step_plan: Vec::new(),
            clarification_needed: Some(question.into()),
            confidence: 0.0,
        }
    }
}
