//! Measurement collection tools for the male/female clothing specialists.
//!
//! Both specialists share one implementation parameterized by gender: list
//! the gendered inventory, validate a measurement set against plausible
//! ranges, record it against the customer, and recommend a size.

use crate::supportflow::store::SupportStore;
use crate::supportflow::tool::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use crate::supportflow::tools::require_str;
use serde_json::{json, Value};
use std::sync::Arc;

/// Required fields and plausible inch ranges per gender.
fn measurement_ranges(gender: &str) -> Vec<(&'static str, f64, f64)> {
    match gender {
        "female" => vec![
            ("bust", 28.0, 60.0),
            ("waist", 20.0, 55.0),
            ("hip", 28.0, 65.0),
            ("shoulder", 12.0, 22.0),
        ],
        _ => vec![
            ("chest", 30.0, 60.0),
            ("waist", 24.0, 55.0),
            ("shoulder", 14.0, 24.0),
            ("sleeve", 28.0, 40.0),
            ("neck", 12.0, 20.0),
        ],
    }
}

fn validate(measurements: &Value, gender: &str) -> (bool, Vec<String>) {
    let mut problems = Vec::new();
    for (field, low, high) in measurement_ranges(gender) {
        match measurements[field].as_f64() {
            Some(value) if value >= low && value <= high => {}
            Some(value) => problems.push(format!(
                "{} of {} inches is outside the expected {}-{} range",
                field, value, low, high
            )),
            None => problems.push(format!("missing measurement: {}", field)),
        }
    }
    (problems.is_empty(), problems)
}

fn recommend_size(measurements: &Value, gender: &str) -> &'static str {
    let primary = if gender == "female" {
        measurements["bust"].as_f64()
    } else {
        measurements["chest"].as_f64()
    }
    .unwrap_or(0.0);
    match primary {
        p if p < 34.0 => "XS",
        p if p < 37.0 => "S",
        p if p < 40.0 => "M",
        p if p < 43.0 => "L",
        p if p < 46.0 => "XL",
        _ => "XXL",
    }
}

pub fn measurement_tools(store: &Arc<SupportStore>, gender: &str) -> Vec<Arc<Tool>> {
    let gender = gender.to_string();
    let list_store = store.clone();
    let list_gender = gender.clone();
    let validate_gender = gender.clone();
    let record_store = store.clone();
    let record_gender = gender.clone();
    let recommend_gender = gender;

    vec![
        Arc::new(Tool::from_fn(
            ToolMetadata::new("list_inventory", "List the in-stock clothing for this specialist"),
            move |_params| {
                let products = list_store.search_products(Some(&list_gender), None);
                Ok(ToolResult::success(json!({ "products": products })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new(
                "validate_measurements",
                "Check a measurement set against plausible ranges",
            )
            .with_parameter(
                ToolParameter::new("measurements", ToolParameterType::Object)
                    .with_description("measurement name to inches")
                    .required(),
            ),
            move |params| {
                let measurements = &params["measurements"];
                if !measurements.is_object() {
                    return Ok(ToolResult::failure("missing required parameter: measurements"));
                }
                let (valid, problems) = validate(measurements, &validate_gender);
                Ok(ToolResult::success(json!({
                    "valid": valid,
                    "problems": problems,
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("record_measurements", "Save a customer's validated measurements")
                .with_parameter(ToolParameter::new("customer_id", ToolParameterType::String).required())
                .with_parameter(ToolParameter::new("measurements", ToolParameterType::Object).required()),
            move |params| {
                let customer_id = match require_str(&params, "customer_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                let measurements = params["measurements"].clone();
                if !measurements.is_object() {
                    return Ok(ToolResult::failure("missing required parameter: measurements"));
                }
                record_store.save_measurements(customer_id, &record_gender, measurements.clone());
                Ok(ToolResult::success(json!({
                    "recorded": true,
                    "customer_id": customer_id,
                    "measurements": measurements,
                })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("recommend_size", "Recommend a garment size from measurements")
                .with_parameter(ToolParameter::new("measurements", ToolParameterType::Object).required()),
            move |params| {
                let measurements = &params["measurements"];
                if !measurements.is_object() {
                    return Ok(ToolResult::failure("missing required parameter: measurements"));
                }
                Ok(ToolResult::success(json!({
                    "recommended_size": recommend_size(measurements, &recommend_gender),
                })))
            },
        )),
    ]
}
