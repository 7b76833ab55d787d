//! Technical-support tools.

use crate::supportflow::store::SupportStore;
use crate::supportflow::tool::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use crate::supportflow::tools::require_str;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;

pub fn technical_tools(store: &Arc<SupportStore>) -> Vec<Arc<Tool>> {
    let kb_store = store.clone();
    let specs_store = store.clone();
    let warranty_store = store.clone();

    vec![
        Arc::new(Tool::from_fn(
            ToolMetadata::new(
                "search_knowledge_base",
                "Search the troubleshooting knowledge base for an issue",
            )
            .with_parameter(ToolParameter::new("issue_description", ToolParameterType::String).required()),
            move |params| {
                let query = match require_str(&params, "issue_description") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let articles = kb_store.search_knowledge_base(query);
                Ok(ToolResult::success(json!({ "articles": articles, "count": articles.len() })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("get_product_specs", "Fetch the spec sheet of a product")
                .with_parameter(ToolParameter::new("product_id", ToolParameterType::String).required()),
            move |params| {
                let product_id = match require_str(&params, "product_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                match specs_store.get_product(product_id) {
                    Ok(product) => Ok(ToolResult::success(json!({
                        "product_id": product.id,
                        "name": product.name,
                        "details": product.details,
                    }))),
                    Err(e) => Ok(ToolResult::failure(e.to_string())),
                }
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("check_warranty", "Check whether a product is still under warranty")
                .with_parameter(ToolParameter::new("product_id", ToolParameterType::String).required())
                .with_parameter(
                    ToolParameter::new("purchase_date", ToolParameterType::String)
                        .with_description("ISO date, e.g. 2025-02-10")
                        .required(),
                ),
            move |params| {
                let product_id = match require_str(&params, "product_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let purchase_date = match require_str(&params, "purchase_date") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                if warranty_store.get_product(product_id).is_err() {
                    return Ok(ToolResult::failure(format!("not found: product {}", product_id)));
                }
                let parsed = match NaiveDate::parse_from_str(purchase_date, "%Y-%m-%d") {
                    Ok(date) => date,
                    Err(_) => return Ok(ToolResult::failure("purchase_date must be YYYY-MM-DD")),
                };
                // Flat one-year coverage; per-product terms live in the spec sheet.
                let age_days = (Utc::now().date_naive() - parsed).num_days();
                Ok(ToolResult::success(json!({
                    "product_id": product_id,
                    "under_warranty": age_days <= 365,
                    "age_days": age_days,
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("run_diagnostics", "Run a scripted diagnostic for a known issue type")
                .with_parameter(ToolParameter::new("product_id", ToolParameterType::String).required())
                .with_parameter(ToolParameter::new("issue_type", ToolParameterType::String).required()),
            move |params| {
                let issue_type = match require_str(&params, "issue_type") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let steps = match issue_type {
                    "connection" => vec![
                        "Power-cycle the device",
                        "Forget and re-pair the Bluetooth connection",
                        "Verify firmware is current",
                    ],
                    "battery" => vec![
                        "Test with a known-good cable",
                        "Clean the charging contacts",
                        "Observe charge level after 30 minutes",
                    ],
                    _ => vec!["Collect a detailed description and escalate to hardware support"],
                };
                Ok(ToolResult::success(json!({
                    "issue_type": issue_type,
                    "steps": steps,
                })))
            },
        )),
    ]
}
