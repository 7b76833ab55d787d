//! Delivery scheduling and tracking tools.

use crate::supportflow::store::SupportStore;
use crate::supportflow::tool::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use crate::supportflow::tools::require_str;
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

pub fn delivery_tools(store: &Arc<SupportStore>) -> Vec<Arc<Tool>> {
    let schedule_store = store.clone();
    let track_store = store.clone();

    vec![
        Arc::new(Tool::from_fn(
            ToolMetadata::new("get_delivery_options", "List available delivery options and costs"),
            |_params| {
                Ok(ToolResult::success(json!({
                    "options": [
                        {"name": "standard", "days": 5, "cost": 0.0},
                        {"name": "express", "days": 2, "cost": 9.99},
                        {"name": "overnight", "days": 1, "cost": 24.99},
                    ],
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("calculate_delivery_date", "Estimate the arrival date for an option")
                .with_parameter(ToolParameter::new("delivery_option", ToolParameterType::String).required()),
            move |params| {
                let option = match require_str(&params, "delivery_option") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let days: i64 = match option {
                    "overnight" => 1,
                    "express" => 2,
                    "standard" => 5,
                    other => {
                        return Ok(ToolResult::failure(format!("unknown delivery option: {}", other)))
                    }
                };
                Ok(ToolResult::success(json!({
                    "delivery_option": option,
                    "estimated_date": (Utc::now() + Duration::days(days)).format("%Y-%m-%d").to_string(),
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("schedule_purchase_delivery", "Schedule delivery for a paid purchase")
                .with_parameter(ToolParameter::new("purchase_id", ToolParameterType::String).required())
                .with_parameter(ToolParameter::new("delivery_option", ToolParameterType::String).required())
                .with_parameter(ToolParameter::new("address", ToolParameterType::Object).required()),
            move |params| {
                let purchase_id = match require_str(&params, "purchase_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let option = match require_str(&params, "delivery_option") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                if schedule_store.get_purchase(purchase_id).is_err() {
                    return Ok(ToolResult::failure(format!("not found: purchase {}", purchase_id)));
                }
                let record =
                    schedule_store.schedule_delivery(purchase_id, option, params["address"].clone());
                Ok(ToolResult::success(record))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("track_delivery", "Look up the delivery record for a purchase")
                .with_parameter(ToolParameter::new("purchase_id", ToolParameterType::String).required()),
            move |params| {
                let purchase_id = match require_str(&params, "purchase_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                match track_store.get_delivery(purchase_id) {
                    Ok(record) => Ok(ToolResult::success(record)),
                    Err(e) => Ok(ToolResult::failure(e.to_string())),
                }
            },
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supportflow::store::PurchaseItem;
    use crate::supportflow::tool::ToolSet;

    #[tokio::test]
    async fn schedule_then_track() {
        let store = Arc::new(SupportStore::in_memory());
        let purchase = store.create_purchase(
            "customer-456",
            vec![PurchaseItem {
                product_id: "SHIRT-M-001".to_string(),
                name: "Men's Formal Shirt".to_string(),
                size: Some("L".to_string()),
                color: None,
                price: 59.99,
            }],
        );
        let set = ToolSet::new(delivery_tools(&store));
        let scheduled = set
            .invoke(
                "schedule_purchase_delivery",
                json!({
                    "purchase_id": purchase.purchase_id,
                    "delivery_option": "express",
                    "address": {"line1": "123 Main St", "city": "Anytown"},
                }),
            )
            .await;
        assert!(scheduled.success);
        let tracking = scheduled.output["tracking_number"].as_str().unwrap().to_string();

        let tracked = set
            .invoke("track_delivery", json!({"purchase_id": purchase.purchase_id}))
            .await;
        assert_eq!(tracked.output["tracking_number"], tracking.as_str());
    }
}
