//! Order lookup tools.

use crate::supportflow::store::SupportStore;
use crate::supportflow::tool::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use crate::supportflow::tools::require_str;
use serde_json::json;
use std::sync::Arc;

pub fn order_tools(store: &Arc<SupportStore>) -> Vec<Arc<Tool>> {
    let search_store = store.clone();
    let status_store = store.clone();
    let history_store = store.clone();

    vec![
        Arc::new(Tool::from_fn(
            ToolMetadata::new(
                "search_orders",
                "Search a customer's orders, optionally narrowed to one order id",
            )
            .with_parameter(ToolParameter::new("customer_id", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("order_id", ToolParameterType::String)),
            move |params| {
                let customer_id = match require_str(&params, "customer_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let orders = search_store.get_customer_orders(customer_id);
                let orders: Vec<_> = match params["order_id"].as_str() {
                    Some(order_id) => orders.into_iter().filter(|o| o.order_id == order_id).collect(),
                    None => orders,
                };
                Ok(ToolResult::success(json!({ "orders": orders, "count": orders.len() })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("check_order_status", "Look up the current status of one order")
                .with_parameter(ToolParameter::new("order_id", ToolParameterType::String).required()),
            move |params| {
                let order_id = match require_str(&params, "order_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                match status_store.get_order(order_id) {
                    Ok(order) => Ok(ToolResult::success(json!({
                        "order_id": order.order_id,
                        "status": order.status,
                        "order_date": order.order_date,
                        "tracking": order.tracking,
                        "delivery_date": order.delivery_date,
                        "total": order.total,
                    }))),
                    Err(e) => Ok(ToolResult::failure(e.to_string())),
                }
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("get_order_history", "List a customer's orders, newest first")
                .with_parameter(ToolParameter::new("customer_id", ToolParameterType::String).required())
                .with_parameter(ToolParameter::new("limit", ToolParameterType::Integer)),
            move |params| {
                let customer_id = match require_str(&params, "customer_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let limit = params["limit"].as_u64().unwrap_or(10) as usize;
                let orders: Vec<_> = history_store
                    .get_customer_orders(customer_id)
                    .into_iter()
                    .take(limit)
                    .collect();
                Ok(ToolResult::success(json!({ "orders": orders })))
            },
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supportflow::tool::ToolSet;

    #[tokio::test]
    async fn order_status_reports_tracking() {
        let store = Arc::new(SupportStore::in_memory());
        let set = ToolSet::new(order_tools(&store));
        let result = set
            .invoke("check_order_status", json!({"order_id": "ORD-12346"}))
            .await;
        assert!(result.success);
        assert_eq!(result.output["status"], "processing");
        assert_eq!(result.output["tracking"], "TRK-456789");
    }

    #[tokio::test]
    async fn search_orders_requires_customer() {
        let store = Arc::new(SupportStore::in_memory());
        let set = ToolSet::new(order_tools(&store));
        let result = set.invoke("search_orders", json!({})).await;
        assert!(!result.success);
    }
}
