//! Refund assessment tools.

use crate::supportflow::store::SupportStore;
use crate::supportflow::tool::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use crate::supportflow::tools::require_str;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Days since the order date, when it parses.
fn order_age_days(order_date: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(order_date, "%Y-%m-%d").ok()?;
    Some((Utc::now().date_naive() - date).num_days())
}

pub fn refund_tools(store: &Arc<SupportStore>) -> Vec<Arc<Tool>> {
    let eligibility_store = store.clone();
    let amount_store = store.clone();
    let initiate_store = store.clone();
    let policy_store = store.clone();

    vec![
        Arc::new(Tool::from_fn(
            ToolMetadata::new(
                "check_refund_eligibility",
                "Check whether an order falls inside the return window",
            )
            .with_parameter(ToolParameter::new("order_id", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("reason", ToolParameterType::String)),
            move |params| {
                let order_id = match require_str(&params, "order_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let order = match eligibility_store.get_order(order_id) {
                    Ok(order) => order,
                    Err(e) => return Ok(ToolResult::failure(e.to_string())),
                };
                let window_days = eligibility_store.get_return_policy()["window_days"]
                    .as_i64()
                    .unwrap_or(30);
                let age_days = order_age_days(&order.order_date).unwrap_or(i64::MAX);
                let eligible = age_days <= window_days;
                Ok(ToolResult::success(json!({
                    "order_id": order.order_id,
                    "eligible": eligible,
                    "order_age_days": age_days,
                    "window_days": window_days,
                    "assessment": if eligible {
                        "within the return window".to_string()
                    } else {
                        format!("outside the {}-day return window", window_days)
                    },
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("calculate_refund_amount", "Compute the refundable amount for an order")
                .with_parameter(ToolParameter::new("order_id", ToolParameterType::String).required())
                .with_parameter(
                    ToolParameter::new("refund_type", ToolParameterType::String)
                        .with_description("full or partial; defaults to full"),
                ),
            move |params| {
                let order_id = match require_str(&params, "order_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let order = match amount_store.get_order(order_id) {
                    Ok(order) => order,
                    Err(e) => return Ok(ToolResult::failure(e.to_string())),
                };
                let refund_type = params["refund_type"].as_str().unwrap_or("full");
                let amount = if refund_type == "partial" {
                    order.total / 2.0
                } else {
                    order.total
                };
                Ok(ToolResult::success(json!({
                    "order_id": order.order_id,
                    "refund_type": refund_type,
                    "amount": (amount * 100.0).round() / 100.0,
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("initiate_refund", "Start a refund for an order")
                .with_parameter(ToolParameter::new("order_id", ToolParameterType::String).required())
                .with_parameter(ToolParameter::new("refund_amount", ToolParameterType::Number).required())
                .with_parameter(ToolParameter::new("reason", ToolParameterType::String)),
            move |params| {
                let order_id = match require_str(&params, "order_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                if initiate_store.get_order(order_id).is_err() {
                    return Ok(ToolResult::failure(format!("not found: order {}", order_id)));
                }
                let amount = params["refund_amount"].as_f64().unwrap_or(0.0);
                Ok(ToolResult::success(json!({
                    "refund_id": format!("REF-{}", Uuid::new_v4().simple()),
                    "order_id": order_id,
                    "amount": amount,
                    "status": "initiated",
                    "expected_in_days": 5,
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("get_return_policy_details", "Fetch the current return policy"),
            move |_params| Ok(ToolResult::success(policy_store.get_return_policy())),
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supportflow::tool::ToolSet;

    #[tokio::test]
    async fn six_month_old_order_is_outside_window() {
        let store = Arc::new(SupportStore::in_memory());
        let set = ToolSet::new(refund_tools(&store));
        let result = set
            .invoke("check_refund_eligibility", json!({"order_id": "ORD-12345"}))
            .await;
        assert!(result.success);
        assert_eq!(result.output["eligible"], false);
        assert!(result.output["assessment"].as_str().unwrap().contains("outside"));
    }

    #[tokio::test]
    async fn recent_order_is_eligible() {
        let store = Arc::new(SupportStore::in_memory());
        let set = ToolSet::new(refund_tools(&store));
        let result = set
            .invoke("check_refund_eligibility", json!({"order_id": "ORD-12346"}))
            .await;
        assert!(result.success);
        assert_eq!(result.output["eligible"], true);
    }
}
