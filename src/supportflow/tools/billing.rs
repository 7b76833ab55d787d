//! Billing and payment tools.

use crate::supportflow::store::{PurchaseItem, SupportStore};
use crate::supportflow::tool::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use crate::supportflow::tools::require_str;
use serde_json::{json, Map};
use std::sync::Arc;
use uuid::Uuid;

fn tier_discount(tier: &str) -> f64 {
    match tier {
        "Platinum" => 0.10,
        "Gold" => 0.05,
        _ => 0.0,
    }
}

pub fn billing_tools(store: &Arc<SupportStore>) -> Vec<Arc<Tool>> {
    let total_store = store.clone();
    let bill_store = store.clone();
    let pay_store = store.clone();
    let invoice_store = store.clone();
    let status_store = store.clone();

    vec![
        Arc::new(Tool::from_fn(
            ToolMetadata::new("calculate_purchase_total", "Total a purchase including tier discount")
                .with_parameter(ToolParameter::new("purchase_id", ToolParameterType::String).required()),
            move |params| {
                let purchase_id = match require_str(&params, "purchase_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let purchase = match total_store.get_purchase(purchase_id) {
                    Ok(p) => p,
                    Err(e) => return Ok(ToolResult::failure(e.to_string())),
                };
                let discount = total_store
                    .get_customer(&purchase.customer_id)
                    .map(|c| tier_discount(&c.tier))
                    .unwrap_or(0.0);
                let total = purchase.total * (1.0 - discount);
                Ok(ToolResult::success(json!({
                    "purchase_id": purchase.purchase_id,
                    "subtotal": purchase.total,
                    "discount_rate": discount,
                    "total": (total * 100.0).round() / 100.0,
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new(
                "create_bill_from_conversation",
                "Create a purchase record from a confirmed product selection",
            )
            .with_parameter(ToolParameter::new("customer_id", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("product_id", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("size", ToolParameterType::String))
            .with_parameter(ToolParameter::new("color", ToolParameterType::String)),
            move |params| {
                let customer_id = match require_str(&params, "customer_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let product_id = match require_str(&params, "product_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let product = match bill_store.get_product(product_id) {
                    Ok(p) => p,
                    Err(e) => return Ok(ToolResult::failure(e.to_string())),
                };
                let purchase = bill_store.create_purchase(
                    customer_id,
                    vec![PurchaseItem {
                        product_id: product.id.clone(),
                        name: product.name.clone(),
                        size: params["size"].as_str().map(str::to_string),
                        color: params["color"].as_str().map(str::to_string),
                        price: product.price,
                    }],
                );
                Ok(ToolResult::success(json!({
                    "purchase_id": purchase.purchase_id,
                    "total": purchase.total,
                    "status": purchase.status,
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("process_payment", "Charge a purchase and mark it paid")
                .with_parameter(ToolParameter::new("purchase_id", ToolParameterType::String).required())
                .with_parameter(ToolParameter::new("payment_method", ToolParameterType::String).required()),
            move |params| {
                let purchase_id = match require_str(&params, "purchase_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let payment_method = match require_str(&params, "payment_method") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let mut updates = Map::new();
                updates.insert("status".to_string(), json!("paid"));
                updates.insert("payment_method".to_string(), json!(payment_method));
                let purchase = match pay_store.update_purchase(purchase_id, updates) {
                    Ok(p) => p,
                    Err(e) => return Ok(ToolResult::failure(e.to_string())),
                };
                pay_store.save_billing(
                    purchase_id,
                    json!({
                        "payment_method": payment_method,
                        "amount": purchase.total,
                        "transaction_id": format!("TXN-{}", Uuid::new_v4().simple()),
                    }),
                );
                Ok(ToolResult::success(json!({
                    "purchase_id": purchase_id,
                    "payment_status": "paid",
                    "amount": purchase.total,
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("generate_invoice", "Produce an invoice for a billed purchase")
                .with_parameter(ToolParameter::new("purchase_id", ToolParameterType::String).required()),
            move |params| {
                let purchase_id = match require_str(&params, "purchase_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let purchase = match invoice_store.get_purchase(purchase_id) {
                    Ok(p) => p,
                    Err(e) => return Ok(ToolResult::failure(e.to_string())),
                };
                Ok(ToolResult::success(json!({
                    "invoice_id": format!("INV-{}", Uuid::new_v4().simple()),
                    "purchase_id": purchase.purchase_id,
                    "items": purchase.items,
                    "total": purchase.total,
                    "status": purchase.status,
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("check_payment_status", "Report whether a purchase has been paid")
                .with_parameter(ToolParameter::new("purchase_id", ToolParameterType::String).required()),
            move |params| {
                let purchase_id = match require_str(&params, "purchase_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                match status_store.get_purchase(purchase_id) {
                    Ok(p) => Ok(ToolResult::success(json!({
                        "purchase_id": p.purchase_id,
                        "status": p.status,
                    }))),
                    Err(e) => Ok(ToolResult::failure(e.to_string())),
                }
            },
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supportflow::tool::ToolSet;

    #[tokio::test]
    async fn bill_then_pay_marks_purchase_paid() {
        let store = Arc::new(SupportStore::in_memory());
        let set = ToolSet::new(billing_tools(&store));

        let billed = set
            .invoke(
                "create_bill_from_conversation",
                json!({
                    "customer_id": "customer-456",
                    "product_id": "SHIRT-M-001",
                    "size": "L",
                    "color": "white",
                }),
            )
            .await;
        assert!(billed.success);
        let purchase_id = billed.output["purchase_id"].as_str().unwrap().to_string();

        let paid = set
            .invoke(
                "process_payment",
                json!({"purchase_id": purchase_id, "payment_method": "card"}),
            )
            .await;
        assert!(paid.success);
        assert_eq!(paid.output["payment_status"], "paid");
        assert!(store.get_billing(&purchase_id).is_ok());
    }

    #[tokio::test]
    async fn gold_tier_gets_five_percent_off() {
        let store = Arc::new(SupportStore::in_memory());
        let purchase = store.create_purchase(
            "customer-456",
            vec![PurchaseItem {
                product_id: "SHIRT-M-001".to_string(),
                name: "Men's Formal Shirt".to_string(),
                size: None,
                color: None,
                price: 100.0,
            }],
        );
        let set = ToolSet::new(billing_tools(&store));
        let result = set
            .invoke("calculate_purchase_total", json!({"purchase_id": purchase.purchase_id}))
            .await;
        assert_eq!(result.output["total"], 95.0);
    }
}
