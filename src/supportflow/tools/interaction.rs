//! User-interaction tools.
//!
//! Unlike the domain tools these are not in the static provider: they are
//! constructed per specialist invocation from an explicit
//! [`InteractionHandle`] carrying the parent workflow id, ticket id, and
//! asking agent, and are only granted to agent kinds that may ask the
//! customer questions.

use crate::supportflow::model::ExpectedAnswer;
use crate::supportflow::question::InteractionHandle;
use crate::supportflow::tool::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use serde_json::json;
use std::sync::Arc;

fn parse_expected(raw: Option<&str>) -> ExpectedAnswer {
    match raw {
        Some("number") => ExpectedAnswer::Number,
        Some("yes_no") => ExpectedAnswer::YesNo,
        Some("order_id") => ExpectedAnswer::OrderId,
        _ => ExpectedAnswer::Text,
    }
}

fn validate_response(response: &str, expected: ExpectedAnswer) -> (bool, &'static str) {
    let response = response.trim();
    match expected {
        ExpectedAnswer::YesNo => {
            let valid = matches!(response.to_lowercase().as_str(), "yes" | "no" | "y" | "n");
            (valid, if valid { "valid yes/no response" } else { "please answer yes or no" })
        }
        ExpectedAnswer::Number => {
            let valid = response.parse::<f64>().is_ok();
            (valid, if valid { "valid number" } else { "please provide a numeric value" })
        }
        ExpectedAnswer::OrderId => {
            let valid = response.starts_with("ORD-")
                || (!response.is_empty() && response.chars().all(|c| c.is_ascii_digit()));
            (valid, if valid { "valid order id" } else { "please provide a valid order id" })
        }
        ExpectedAnswer::Text => {
            let valid = !response.is_empty();
            (valid, if valid { "valid response" } else { "please provide a response" })
        }
    }
}

/// Build the `ask_user_question` / `validate_user_response` pair bound to
/// one specialist invocation.
pub fn interaction_tools(handle: InteractionHandle) -> Vec<Arc<Tool>> {
    vec![
        Arc::new(Tool::new(
            ToolMetadata::new(
                "ask_user_question",
                "Ask the customer a clarifying question and wait for their reply",
            )
            .with_parameter(ToolParameter::new("question", ToolParameterType::String).required())
            .with_parameter(
                ToolParameter::new("expected_response_type", ToolParameterType::String)
                    .with_description("text, number, yes_no, or order_id"),
            )
            .with_parameter(
                ToolParameter::new("timeout_seconds", ToolParameterType::Integer)
                    .with_description("how long to wait before giving up"),
            ),
            Arc::new(move |params| {
                let handle = handle.clone();
                Box::pin(async move {
                    let question = match params["question"].as_str().filter(|q| !q.is_empty()) {
                        Some(q) => q.to_string(),
                        None => {
                            return Ok(ToolResult::failure("missing required parameter: question"))
                        }
                    };
                    let expected = parse_expected(params["expected_response_type"].as_str());
                    let timeout = params["timeout_seconds"].as_u64();
                    match handle.ask(question, expected, timeout).await {
                        Ok(answer) => Ok(ToolResult::success(json!({
                            "answer": answer,
                            "message": format!("User answered: {}", answer),
                        }))),
                        Err(e) => Ok(ToolResult::failure(format!("failed to ask question: {}", e))),
                    }
                })
            }),
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new(
                "validate_user_response",
                "Check that a customer reply matches the expected answer shape",
            )
            .with_parameter(ToolParameter::new("response", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("expected_type", ToolParameterType::String).required()),
            |params| {
                let response = params["response"].as_str().unwrap_or("");
                let expected = parse_expected(params["expected_type"].as_str());
                let (valid, message) = validate_response(response, expected);
                Ok(ToolResult::success(json!({ "valid": valid, "message": message })))
            },
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_and_order_ids_validate() {
        assert!(validate_response("42", ExpectedAnswer::Number).0);
        assert!(!validate_response("forty-two", ExpectedAnswer::Number).0);
        assert!(validate_response("ORD-12345", ExpectedAnswer::OrderId).0);
        assert!(validate_response("987654", ExpectedAnswer::OrderId).0);
        assert!(!validate_response("order twelve", ExpectedAnswer::OrderId).0);
    }

    #[test]
    fn yes_no_accepts_short_forms() {
        assert!(validate_response("Yes", ExpectedAnswer::YesNo).0);
        assert!(validate_response("n", ExpectedAnswer::YesNo).0);
        assert!(!validate_response("maybe", ExpectedAnswer::YesNo).0);
    }

    #[test]
    fn text_only_requires_substance() {
        assert!(validate_response("chest 40", ExpectedAnswer::Text).0);
        assert!(!validate_response("   ", ExpectedAnswer::Text).0);
    }
}
