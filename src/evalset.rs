//! Eval-set loading: normalize the JSON formats eval files show up in.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// One evaluation case: a user query and whether the skill should trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    pub query: String,
    pub should_trigger: bool,
}

/// Load an eval set from a JSON file.
///
/// Accepted shapes: a bare array of `{query|prompt, should_trigger}` objects,
/// or `{"evals": [...]}`. Malformed entries are fatal. Repeated queries merge
/// into the first occurrence, keeping its polarity and position.
pub fn load_eval_set(path: &Path) -> Result<Vec<EvalCase>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read eval set {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("eval set {} is not valid JSON", path.display()))?;
    parse_eval_set(&value).with_context(|| format!("invalid eval set {}", path.display()))
}

/// Normalize a parsed JSON value into eval cases.
pub fn parse_eval_set(value: &Value) -> Result<Vec<EvalCase>> {
    let items = value
        .as_array()
        .or_else(|| value.get("evals").and_then(|v| v.as_array()))
        .ok_or_else(|| {
            anyhow!("eval set must be a JSON array or an object with an \"evals\" array")
        })?;

    let mut cases = Vec::new();
    let mut seen = HashSet::new();
    for (i, item) in items.iter().enumerate() {
        let query = item
            .get("query")
            .or_else(|| item.get("prompt"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("eval case {} is missing a \"query\" or \"prompt\" string", i))?;
        let should_trigger = item
            .get("should_trigger")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| anyhow!("eval case {} is missing a boolean \"should_trigger\"", i))?;
        if seen.insert(query.to_string()) {
            cases.push(EvalCase {
                query: query.to_string(),
                should_trigger,
            });
        }
    }
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_array_with_prompt_key() {
        let value = json!([
            {"query": "summarize this PDF", "should_trigger": true},
            {"prompt": "what time is it", "should_trigger": false}
        ]);
        let cases = parse_eval_set(&value).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].query, "summarize this PDF");
        assert!(cases[0].should_trigger);
        assert_eq!(cases[1].query, "what time is it");
        assert!(!cases[1].should_trigger);
    }

    #[test]
    fn test_evals_wrapper_object() {
        let value = json!({"evals": [{"query": "a", "should_trigger": true}]});
        let cases = parse_eval_set(&value).unwrap();
        assert_eq!(cases.len(), 1);
    }

    #[test]
    fn test_dedupe_keeps_first_polarity_and_order() {
        let value = json!([
            {"query": "a", "should_trigger": true},
            {"query": "b", "should_trigger": false},
            {"query": "a", "should_trigger": false}
        ]);
        let cases = parse_eval_set(&value).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].query, "a");
        assert!(cases[0].should_trigger);
        assert_eq!(cases[1].query, "b");
    }

    #[test]
    fn test_malformed_entries_are_fatal() {
        let missing_query = json!([{"should_trigger": true}]);
        assert!(parse_eval_set(&missing_query).is_err());

        let bad_flag = json!([{"query": "a", "should_trigger": "yes"}]);
        assert!(parse_eval_set(&bad_flag).is_err());

        let not_a_list = json!({"cases": []});
        assert!(parse_eval_set(&not_a_list).is_err());
    }
}
