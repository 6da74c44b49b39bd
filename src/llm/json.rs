// src/llm/json.rs

//! Lenient JSON recovery from model output. Completions are asked for bare
//! JSON but routinely come back wrapped in markdown fences or prose; these
//! helpers pull out the first JSON value rather than failing on the noise.

use serde_json::Value;

use super::LlmError;

/// Extract the first JSON object from a completion.
pub fn extract_object(response: &str) -> Result<Value, LlmError> {
    extract_between(response, '{', '}')
}

/// Extract the first JSON array from a completion.
pub fn extract_array(response: &str) -> Result<Vec<Value>, LlmError> {
    let value = extract_between(response, '[', ']')?;
    match value {
        Value::Array(items) => Ok(items),
        other => Err(LlmError::Malformed(format!(
            "expected JSON array, got {other}"
        ))),
    }
}

fn extract_between(response: &str, open: char, close: char) -> Result<Value, LlmError> {
    let stripped = strip_fences(response);
    let start = stripped
        .find(open)
        .ok_or_else(|| LlmError::Malformed(format!("no '{open}' in model output")))?;
    let end = stripped
        .rfind(close)
        .filter(|&end| end > start)
        .ok_or_else(|| LlmError::Malformed(format!("no closing '{close}' in model output")))?;

    serde_json::from_str(&stripped[start..=end])
        .map_err(|e| LlmError::Malformed(format!("invalid JSON: {e}")))
}

fn strip_fences(response: &str) -> String {
    response
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_object() {
        let value = extract_object(r#"{"intent": "search"}"#).unwrap();
        assert_eq!(value["intent"], "search");
    }

    #[test]
    fn fenced_object_with_prose() {
        let response = "Here is the result:\n```json\n{\"confidence\": 0.9}\n```\nDone.";
        let value = extract_object(response).unwrap();
        assert_eq!(value["confidence"], json!(0.9));
    }

    #[test]
    fn array_inside_text() {
        let items = extract_array("matches: [{\"id\": \"a\"}, {\"id\": \"b\"}]").unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(extract_object("no json here").is_err());
        assert!(extract_array("{\"not\": \"an array\"}").is_err());
    }
}
