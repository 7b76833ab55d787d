//! General-support tools.

use crate::supportflow::store::SupportStore;
use crate::supportflow::tool::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use crate::supportflow::tools::require_str;
use serde_json::json;
use std::sync::Arc;

pub fn general_tools(store: &Arc<SupportStore>) -> Vec<Arc<Tool>> {
    let faq_store = store.clone();
    let account_store = store.clone();

    vec![
        Arc::new(Tool::from_fn(
            ToolMetadata::new("search_faq", "Search the FAQ for a customer question")
                .with_parameter(ToolParameter::new("query", ToolParameterType::String).required()),
            move |params| {
                let query = match require_str(&params, "query") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let entries = faq_store.search_faq(query);
                Ok(ToolResult::success(json!({ "entries": entries, "count": entries.len() })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("get_account_info", "Fetch a customer's account profile")
                .with_parameter(ToolParameter::new("customer_id", ToolParameterType::String).required()),
            move |params| {
                let customer_id = match require_str(&params, "customer_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                match account_store.get_customer(customer_id) {
                    Ok(customer) => Ok(ToolResult::success(json!({
                        "customer": customer,
                        "order_count": account_store.get_customer_orders(customer_id).len(),
                    }))),
                    Err(e) => Ok(ToolResult::failure(e.to_string())),
                }
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("get_business_hours", "Report support availability hours"),
            |_params| {
                Ok(ToolResult::success(json!({
                    "hours": "Monday through Friday, 9am to 6pm EST",
                    "timezone": "EST",
                })))
            },
        )),
    ]
}
