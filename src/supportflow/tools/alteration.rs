//! Garment alteration tools.

use crate::supportflow::store::SupportStore;
use crate::supportflow::tool::{Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use crate::supportflow::tools::require_str;
use serde_json::json;
use std::sync::Arc;

/// Alteration kinds and their flat prices.
const ALTERATIONS: &[(&str, f64)] = &[
    ("hem_sleeves", 12.0),
    ("take_in_sides", 18.0),
    ("shorten_length", 15.0),
    ("adjust_collar", 10.0),
];

fn price_of(kind: &str) -> Option<f64> {
    ALTERATIONS.iter().find(|(name, _)| *name == kind).map(|(_, p)| *p)
}

pub fn alteration_tools(store: &Arc<SupportStore>) -> Vec<Arc<Tool>> {
    let request_store = store.clone();

    vec![
        Arc::new(Tool::from_fn(
            ToolMetadata::new("get_available_alterations", "List offered alterations and prices"),
            |_params| {
                let options: Vec<_> = ALTERATIONS
                    .iter()
                    .map(|(name, price)| json!({"name": name, "price": price}))
                    .collect();
                Ok(ToolResult::success(json!({ "alterations": options })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("calculate_alteration_cost", "Total the cost of requested alterations")
                .with_parameter(
                    ToolParameter::new("alteration_types", ToolParameterType::Array)
                        .with_description("names from get_available_alterations")
                        .required(),
                ),
            move |params| {
                let kinds = match params["alteration_types"].as_array() {
                    Some(kinds) => kinds,
                    None => {
                        return Ok(ToolResult::failure("missing required parameter: alteration_types"))
                    }
                };
                let mut total = 0.0;
                let mut unknown = Vec::new();
                for kind in kinds {
                    match kind.as_str().and_then(price_of) {
                        Some(price) => total += price,
                        None => unknown.push(kind.clone()),
                    }
                }
                if !unknown.is_empty() {
                    return Ok(ToolResult::failure(format!("unknown alterations: {:?}", unknown)));
                }
                Ok(ToolResult::success(json!({ "total_cost": total })))
            },
        )),
        Arc::new(Tool::from_fn(
            ToolMetadata::new("request_alteration", "File an alteration request for a purchase")
                .with_parameter(ToolParameter::new("purchase_id", ToolParameterType::String).required())
                .with_parameter(ToolParameter::new("alteration_types", ToolParameterType::Array).required()),
            move |params| {
                let purchase_id = match require_str(&params, "purchase_id") {
                    Ok(v) => v,
                    Err(fail) => return Ok(fail),
                };
                if request_store.get_purchase(purchase_id).is_err() {
                    return Ok(ToolResult::failure(format!("not found: purchase {}", purchase_id)));
                }
                let kinds = match params["alteration_types"].as_array() {
                    Some(kinds) => kinds.clone(),
                    None => {
                        return Ok(ToolResult::failure("missing required parameter: alteration_types"))
                    }
                };
                let cost: f64 = kinds
                    .iter()
                    .filter_map(|k| k.as_str().and_then(price_of))
                    .sum();
                let record =
                    request_store.create_alteration_request(purchase_id, json!(kinds), cost);
                Ok(ToolResult::success(record))
            },
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supportflow::tool::ToolSet;

    #[tokio::test]
    async fn cost_totals_known_alterations() {
        let store = Arc::new(SupportStore::in_memory());
        let set = ToolSet::new(alteration_tools(&store));
        let result = set
            .invoke(
                "calculate_alteration_cost",
                json!({"alteration_types": ["hem_sleeves", "adjust_collar"]}),
            )
            .await;
        assert_eq!(result.output["total_cost"], 22.0);
    }
}
