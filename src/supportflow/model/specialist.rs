//! Specialist input and output records.
//!
//! Each specialist agent receives an agent-kind-specific input record (a
//! purchase request reads differently from an issue description) and returns
//! a [`SpecialistOutput`] whose structured portion is the typed
//! [`SpecialistFields`] sum type. The structured fields are what downstream
//! agents and the UI consume as `additional_info`; unset fields are omitted
//! from the serialized form rather than null-padded.

use crate::supportflow::model::plan::AgentType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Context shared by every specialist input record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecialistContext {
    /// Composed conversation context: prior chat, the current message, the
    /// downstream-agents note, and outputs of dependency steps.
    pub conversation_context: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_profile: Map<String, Value>,
    pub ticket_id: String,
    /// Workflow id of the owning ticket conductor, used to route
    /// agent-asked questions back to the customer.
    pub ticket_workflow_id: String,
}

/// Agent-kind-specific input record handed to `reason`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecialistInput {
    /// Male/female specialists, billing, delivery, alteration.
    Purchase {
        purchase_request: String,
        #[serde(flatten)]
        context: SpecialistContext,
    },
    /// Technical specialist.
    Issue {
        issue_description: String,
        #[serde(flatten)]
        context: SpecialistContext,
    },
    /// Refund specialist.
    Refund {
        refund_request: String,
        #[serde(flatten)]
        context: SpecialistContext,
    },
    /// Order specialist and general support.
    Query {
        customer_message: String,
        #[serde(flatten)]
        context: SpecialistContext,
    },
    /// Escalation manager; the whole composed context is the subject.
    Escalation {
        ticket_context: String,
        #[serde(flatten)]
        context: SpecialistContext,
    },
}

impl SpecialistInput {
    /// Wrap a customer message into the record shape the given agent expects.
    pub fn for_agent(agent_type: AgentType, message: impl Into<String>, context: SpecialistContext) -> Self {
        let message = message.into();
        match agent_type {
            AgentType::MaleSpecialist
            | AgentType::FemaleSpecialist
            | AgentType::Billing
            | AgentType::Delivery
            | AgentType::Alteration => SpecialistInput::Purchase {
                purchase_request: message,
                context,
            },
            AgentType::TechnicalSpecialist => SpecialistInput::Issue {
                issue_description: message,
                context,
            },
            AgentType::RefundSpecialist => SpecialistInput::Refund {
                refund_request: message,
                context,
            },
            AgentType::EscalationManager => {
                let ticket_context = context.conversation_context.clone();
                SpecialistInput::Escalation {
                    ticket_context,
                    context,
                }
            }
            _ => SpecialistInput::Query {
                customer_message: message,
                context,
            },
        }
    }

    /// The customer-facing message (or composed context for escalation).
    pub fn message(&self) -> &str {
        match self {
            SpecialistInput::Purchase { purchase_request, .. } => purchase_request,
            SpecialistInput::Issue { issue_description, .. } => issue_description,
            SpecialistInput::Refund { refund_request, .. } => refund_request,
            SpecialistInput::Query { customer_message, .. } => customer_message,
            SpecialistInput::Escalation { ticket_context, .. } => ticket_context,
        }
    }

    /// The shared context record.
    pub fn context(&self) -> &SpecialistContext {
        match self {
            SpecialistInput::Purchase { context, .. }
            | SpecialistInput::Issue { context, .. }
            | SpecialistInput::Refund { context, .. }
            | SpecialistInput::Query { context, .. }
            | SpecialistInput::Escalation { context, .. } => context,
        }
    }
}

/// Typed structured output, one variant per specialist family.
///
/// Serializes as a tagged object (`"kind"` discriminant plus the populated
/// fields); `None` fields are omitted entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecialistFields {
    /// Order specialist and general support.
    Suggestions {
        #[serde(skip_serializing_if = "Option::is_none")]
        suggested_actions: Option<String>,
    },
    Troubleshooting {
        #[serde(skip_serializing_if = "Option::is_none")]
        troubleshooting_steps: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        estimated_resolution_time: Option<String>,
    },
    RefundAssessment {
        #[serde(skip_serializing_if = "Option::is_none")]
        eligibility_assessment: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        required_documentation: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        processing_timeline: Option<String>,
    },
    Measurements {
        #[serde(skip_serializing_if = "Option::is_none")]
        measurements_collected: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        measurements_data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        validation_status: Option<String>,
    },
    Billing {
        #[serde(skip_serializing_if = "Option::is_none")]
        billing_complete: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_amount: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        payment_status: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        invoice_details: Option<Value>,
    },
    Delivery {
        #[serde(skip_serializing_if = "Option::is_none")]
        delivery_scheduled: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        delivery_date: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tracking_number: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        delivery_address: Option<Value>,
    },
    Alteration {
        #[serde(skip_serializing_if = "Option::is_none")]
        alteration_needed: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        alteration_details: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        additional_cost: Option<f64>,
    },
}

impl SpecialistFields {
    /// True when every field is unset, in which case the payload is omitted
    /// from chat messages rather than serialized as an empty record.
    pub fn is_empty(&self) -> bool {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.iter().all(|(k, _)| k == "kind"),
            _ => true,
        }
    }

    /// Render populated fields as display bullets
    /// (`"  • Tracking Number: TRK-1"`), used both in the context passed to
    /// dependent agents and in transcript summaries.
    pub fn bullet_lines(&self) -> Vec<String> {
        let value = match serde_json::to_value(self) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };
        let map = match value {
            Value::Object(map) => map,
            _ => return Vec::new(),
        };
        map.iter()
            .filter(|(key, _)| key.as_str() != "kind")
            .map(|(key, value)| {
                let label = title_case(key);
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("  • {}: {}", label, rendered)
            })
            .collect()
    }
}

fn title_case(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Everything a specialist reasoning call returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistOutput {
    /// Customer-facing response text.
    pub response: String,
    /// Self-assessed confidence in `[0, 1]`.
    pub confidence: f64,
    pub requires_escalation: bool,
    /// Typed structured fields, when the specialist produced any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<SpecialistFields>,
    /// Raw tool outputs keyed by tool name.
    #[serde(default)]
    pub tool_results: Map<String, Value>,
    /// Serialized record of the reasoning interaction, kept for debugging.
    #[serde(default)]
    pub llm_log: String,
}

impl SpecialistOutput {
    /// A plain text answer with the given confidence and no structured fields.
    pub fn text(response: impl Into<String>, confidence: f64) -> Self {
        Self {
            response: response.into(),
            confidence,
            requires_escalation: false,
            fields: None,
            tool_results: Map::new(),
            llm_log: String::new(),
        }
    }

    /// Attach structured fields (builder pattern).
    pub fn with_fields(mut self, fields: SpecialistFields) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Flag the output as needing human attention (builder pattern).
    pub fn escalating(mut self) -> Self {
        self.requires_escalation = true;
        self
    }

    /// The structured fields, dropped if entirely unset.
    pub fn populated_fields(&self) -> Option<SpecialistFields> {
        self.fields.as_ref().filter(|f| !f.is_empty()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_are_omitted() {
        let fields = SpecialistFields::Delivery {
            delivery_scheduled: Some(true),
            delivery_date: None,
            tracking_number: Some("TRK-42".to_string()),
            delivery_address: None,
        };
        let value = serde_json::to_value(&fields).unwrap();
        let map = value.as_object().unwrap();
        assert!(map.contains_key("tracking_number"));
        assert!(!map.contains_key("delivery_date"));
        assert!(!map.contains_key("delivery_address"));
    }

    #[test]
    fn empty_fields_detected() {
        let fields = SpecialistFields::Suggestions { suggested_actions: None };
        assert!(fields.is_empty());
        let fields = SpecialistFields::Suggestions {
            suggested_actions: Some("check tracking".to_string()),
        };
        assert!(!fields.is_empty());
    }

    #[test]
    fn bullets_use_title_case_labels() {
        let fields = SpecialistFields::Billing {
            billing_complete: Some(true),
            total_amount: Some(59.99),
            payment_status: Some("paid".to_string()),
            invoice_details: None,
        };
        let bullets = fields.bullet_lines();
        assert!(bullets.iter().any(|b| b.contains("Total Amount: 59.99")));
        assert!(bullets.iter().any(|b| b.contains("Payment Status: paid")));
    }

    #[test]
    fn input_record_shape_follows_agent_kind() {
        let ctx = SpecialistContext::default();
        let input = SpecialistInput::for_agent(AgentType::RefundSpecialist, "refund me", ctx.clone());
        assert!(matches!(input, SpecialistInput::Refund { .. }));
        let input = SpecialistInput::for_agent(AgentType::Billing, "bill me", ctx.clone());
        assert!(matches!(input, SpecialistInput::Purchase { .. }));
        let input = SpecialistInput::for_agent(AgentType::GeneralSupport, "hours?", ctx);
        assert_eq!(input.message(), "hours?");
    }

    #[test]
    fn specialist_output_round_trips() {
        let output = SpecialistOutput::text("done", 0.9).with_fields(SpecialistFields::Suggestions {
            suggested_actions: Some("wait for delivery".to_string()),
        });
        let json = serde_json::to_string(&output).unwrap();
        let back: SpecialistOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.response, "done");
        assert_eq!(back.fields, output.fields);
    }
}
