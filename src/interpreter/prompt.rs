// src/interpreter/prompt.rs

use crate::session::{Role, Session};

/// Build the interpretation prompt with conversation and user context
/// folded in. The model is asked for bare JSON in the ParsedQuery shape.
pub fn interpretation_prompt(query: &str, session: &Session) -> String {
    let conversation = if session.conversation.is_empty() {
        "No previous conversation".to_string()
    } else {
        session
            .recent_turns(5)
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                let content: String = turn.content.chars().take(200).collect();
                format!("{role}: {content}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let location = session
        .user_context
        .location
        .as_deref()
        .unwrap_or("Unknown");

    let previous_searches = if session.user_context.previous_searches.is_empty() {
        "None".to_string()
    } else {
        session.user_context.previous_searches.join(", ")
    };

    let last_result = session
        .last_result
        .as_ref()
        .map(|v| {
            let text = v.to_string();
            text.chars().take(500).collect::<String>()
        })
        .unwrap_or_else(|| "None".to_string());

    format!(
        r#"You are a provider research assistant. Analyze the user's query and extract structured information.

CONVERSATION CONTEXT:
{conversation}

USER CONTEXT:
- Location: {location}
- Previous searches: {previous_searches}
- Last result: {last_result}

CURRENT QUERY: "{query}"

Return a JSON object:
{{
    "intent": "search|add|compare|list|update|delete|clarify|research|verify|relate",
    "providers": [
        {{"name": "...", "location": "city, state or null"}}
    ],
    "filters": {{
        "state": "XX or null",
        "city": "name or null",
        "provider_type": "type or null",
        "parent_organization": "name or null"
    }},
    "resolved_references": {{
        "their": "what 'their' refers to, if present"
    }},
    "multi_step_plan": ["Step 1: ...", "Step 2: ..."],
    "clarification_needed": "Question to ask the user, or null if the query is clear",
    "confidence": 0.95
}}

RULES:
1. Resolve pronouns and references using the conversation context
2. If the user says "near me" or "local", use their location from USER CONTEXT
3. If the query is ambiguous, set clarification_needed instead of guessing
4. Extract ALL mentioned providers, even when comparing several
5. Normalize state names to 2-letter codes (California -> CA)

Return ONLY valid JSON, no markdown or explanation outside the JSON."#
    )
}
