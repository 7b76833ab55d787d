//! Ticket state and chat transcript.
//!
//! A [`Ticket`] is the primary durable entity: one per support case, owned
//! exclusively by its conductor workflow and exposed read-only through state
//! snapshots. The transcript is an append-only, ordered list of
//! [`ChatMessage`]s; messages are never deleted or reordered.

use crate::supportflow::model::interaction::QuestionRecord;
use crate::supportflow::model::plan::AgentType;
use crate::supportflow::model::specialist::SpecialistFields;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Ticket lifecycle states.
///
/// `Resolved` and `Closed` are terminal: once entered, the status never
/// leaves the terminal set and the owning conductor shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    WaitingForCustomer,
    InProgress,
    EscalatedToHuman,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }

    /// Whether a status-change signal from `self` to `to` is accepted.
    ///
    /// Any non-terminal status may move to `Resolved`, `Closed`, or
    /// `EscalatedToHuman`; `Open`, `InProgress`, and `WaitingForCustomer`
    /// move freely among themselves; an escalated ticket may be handed back
    /// to automated processing. Terminal-to-terminal transitions are
    /// accepted so duplicate closure signals stay idempotent.
    pub fn can_transition_to(&self, to: TicketStatus) -> bool {
        if *self == to {
            return true;
        }
        if self.is_terminal() {
            return to.is_terminal();
        }
        match to {
            TicketStatus::Resolved | TicketStatus::Closed | TicketStatus::EscalatedToHuman => true,
            TicketStatus::Open | TicketStatus::InProgress | TicketStatus::WaitingForCustomer => {
                matches!(
                    self,
                    TicketStatus::Open
                        | TicketStatus::InProgress
                        | TicketStatus::WaitingForCustomer
                        | TicketStatus::EscalatedToHuman
                )
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::WaitingForCustomer => "waiting_for_customer",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::EscalatedToHuman => "escalated_to_human",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TicketStatus::Open),
            "waiting_for_customer" => Ok(TicketStatus::WaitingForCustomer),
            "in_progress" => Ok(TicketStatus::InProgress),
            "escalated_to_human" => Ok(TicketStatus::EscalatedToHuman),
            "resolved" => Ok(TicketStatus::Resolved),
            "closed" => Ok(TicketStatus::Closed),
            other => Err(format!("unknown ticket status: {}", other)),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Customer,
    AiAgent,
    HumanAgent,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Customer => "customer",
            MessageType::AiAgent => "ai_agent",
            MessageType::HumanAgent => "human_agent",
            MessageType::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for UrgencyLevel {
    fn default() -> Self {
        UrgencyLevel::Low
    }
}

/// Coarse classification of what the customer wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    OrderInquiry,
    TechnicalSupport,
    RefundRequest,
    BillingQuestion,
    Complaint,
    GeneralQuestion,
    Purchase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    ComplexIssue,
    CustomerDissatisfied,
    MultipleFailedAttempts,
    VipCustomer,
    PolicyExceptionNeeded,
    TechnicalLimitation,
}

/// One entry in a ticket's transcript.
///
/// # Example
///
/// ```rust
/// use supportflow::model::{AgentType, ChatMessage, SpecialistFields};
///
/// let msg = ChatMessage::from_agent("ticket-1", AgentType::OrderSpecialist, "Order found.")
///     .with_metadata("confidence", serde_json::json!(0.92))
///     .with_additional_info(SpecialistFields::Suggestions {
///         suggested_actions: Some("share the tracking link".to_string()),
///     });
///
/// assert_eq!(msg.agent_type, Some(AgentType::OrderSpecialist));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub ticket_id: String,
    pub content: String,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,
    pub timestamp: DateTime<Utc>,
    /// Plan snapshots, confidences, execution times, tool results.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Typed per-agent structured payload surfaced to downstream agents
    /// and the UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<SpecialistFields>,
}

impl ChatMessage {
    fn base(ticket_id: impl Into<String>, content: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ticket_id: ticket_id.into(),
            content: content.into(),
            message_type,
            agent_type: None,
            timestamp: Utc::now(),
            metadata: Map::new(),
            additional_info: None,
        }
    }

    /// A message typed by the customer.
    pub fn customer(ticket_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::base(ticket_id, content, MessageType::Customer)
    }

    /// A system-authored message (plan summaries, questions, closure notes).
    pub fn system(ticket_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::base(ticket_id, content, MessageType::System)
    }

    /// An AI-agent-authored message attributed to a specific agent kind.
    pub fn from_agent(
        ticket_id: impl Into<String>,
        agent_type: AgentType,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(ticket_id, content, MessageType::AiAgent);
        msg.agent_type = Some(agent_type);
        msg
    }

    /// Attribute a system message to the agent that caused it (builder pattern).
    pub fn with_agent(mut self, agent_type: AgentType) -> Self {
        self.agent_type = Some(agent_type);
        self
    }

    /// Attach a metadata entry (builder pattern).
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach the structured payload, dropping it when entirely unset
    /// (builder pattern).
    pub fn with_additional_info(mut self, fields: SpecialistFields) -> Self {
        if !fields.is_empty() {
            self.additional_info = Some(fields);
        }
        self
    }

    /// Transcript line in the `[message_type] content` form used when chat
    /// history is fed back to planners and specialists, with one indented
    /// bullet per populated structured field.
    pub fn transcript_line(&self) -> String {
        let mut line = format!("[{}] {}", self.message_type.as_str(), self.content);
        if let Some(info) = &self.additional_info {
            for bullet in info.bullet_lines() {
                line.push('\n');
                line.push_str(&bullet);
            }
        }
        line
    }
}

/// Start input for a new ticket workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketStart {
    pub ticket_id: String,
    pub customer_id: String,
    pub initial_message: String,
    #[serde(default)]
    pub customer_profile: Map<String, Value>,
}

/// The durable per-case entity, mutated only by its conductor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_profile: Map<String, Value>,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_intent: Option<IntentType>,
    #[serde(default)]
    pub urgency_level: UrgencyLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent_type: Option<AgentType>,
    /// Free-form workspace: last orchestrator plan, confidence, timestamps.
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    /// Every question ever asked on this ticket, keyed by question workflow
    /// id; records keep their terminal status indefinitely.
    #[serde(default)]
    pub pending_questions: HashMap<String, QuestionRecord>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub failed_attempts: u32,
    #[serde(default)]
    pub escalation_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<EscalationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfaction_score: Option<u8>,
}

impl Ticket {
    /// Fresh ticket in the `Open` state with an empty transcript.
    pub fn new(start: &TicketStart) -> Self {
        let now = Utc::now();
        Self {
            ticket_id: start.ticket_id.clone(),
            customer_id: start.customer_id.clone(),
            customer_profile: start.customer_profile.clone(),
            status: TicketStatus::Open,
            current_intent: None,
            urgency_level: UrgencyLevel::Low,
            assigned_agent_type: None,
            context: Map::new(),
            chat_history: Vec::new(),
            pending_questions: HashMap::new(),
            created_at: now,
            last_updated: now,
            failed_attempts: 0,
            escalation_count: 0,
            escalation_reason: None,
            resolution_summary: None,
            satisfaction_score: None,
        }
    }

    /// Latest of `last_updated` and every transcript timestamp; the clock
    /// the inactivity sweep measures against.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.chat_history
            .iter()
            .map(|m| m.timestamp)
            .fold(self.last_updated, |latest, ts| latest.max(ts))
    }

    /// Questions still awaiting an answer.
    pub fn open_question_count(&self) -> usize {
        self.pending_questions.values().filter(|q| q.is_pending()).count()
    }

    /// Transcript lines for planner and specialist context, optionally
    /// excluding one message (the one currently being processed).
    pub fn transcript_lines(&self, exclude_id: Option<&str>) -> Vec<String> {
        self.chat_history
            .iter()
            .filter(|m| exclude_id.map(|id| m.id != id).unwrap_or(true))
            .map(ChatMessage::transcript_line)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> TicketStart {
        TicketStart {
            ticket_id: "ticket-1".to_string(),
            customer_id: "customer-456".to_string(),
            initial_message: "hi".to_string(),
            customer_profile: Map::new(),
        }
    }

    #[test]
    fn terminal_states_only_transition_to_terminal() {
        for terminal in [TicketStatus::Resolved, TicketStatus::Closed] {
            assert!(terminal.can_transition_to(TicketStatus::Closed));
            assert!(terminal.can_transition_to(TicketStatus::Resolved));
            assert!(!terminal.can_transition_to(TicketStatus::Open));
            assert!(!terminal.can_transition_to(TicketStatus::InProgress));
            assert!(!terminal.can_transition_to(TicketStatus::EscalatedToHuman));
        }
    }

    #[test]
    fn non_terminal_states_can_close_resolve_escalate() {
        for from in [
            TicketStatus::Open,
            TicketStatus::InProgress,
            TicketStatus::WaitingForCustomer,
            TicketStatus::EscalatedToHuman,
        ] {
            assert!(from.can_transition_to(TicketStatus::Closed));
            assert!(from.can_transition_to(TicketStatus::Resolved));
            assert!(from.can_transition_to(TicketStatus::EscalatedToHuman));
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            TicketStatus::Open,
            TicketStatus::WaitingForCustomer,
            TicketStatus::InProgress,
            TicketStatus::EscalatedToHuman,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ] {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn ticket_serde_round_trip_is_identity() {
        let mut ticket = Ticket::new(&start());
        ticket
            .chat_history
            .push(ChatMessage::customer("ticket-1", "Where is my order?"));
        ticket.chat_history.push(
            ChatMessage::from_agent("ticket-1", AgentType::OrderSpecialist, "On its way.")
                .with_metadata("confidence", serde_json::json!(0.8)),
        );
        ticket.context.insert("note".to_string(), serde_json::json!("x"));

        let json = serde_json::to_string(&ticket).unwrap();
        let back: Ticket = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_value(&back).unwrap(), serde_json::to_value(&ticket).unwrap());
    }

    #[test]
    fn chat_message_serde_round_trip_is_identity() {
        let msg = ChatMessage::system("ticket-1", "plan created")
            .with_agent(AgentType::Orchestrator)
            .with_metadata("steps", serde_json::json!([1, 2]));
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_value(&back).unwrap(), serde_json::to_value(&msg).unwrap());
    }

    #[test]
    fn last_activity_tracks_newest_message() {
        let mut ticket = Ticket::new(&start());
        let mut msg = ChatMessage::customer("ticket-1", "hello");
        msg.timestamp = ticket.last_updated + chrono::Duration::seconds(30);
        ticket.chat_history.push(msg);
        assert_eq!(ticket.last_activity(), ticket.chat_history[0].timestamp);
    }

    #[test]
    fn transcript_line_includes_structured_bullets() {
        let msg = ChatMessage::from_agent("t", AgentType::Delivery, "Scheduled.")
            .with_additional_info(SpecialistFields::Delivery {
                delivery_scheduled: Some(true),
                delivery_date: Some("2026-08-05".to_string()),
                tracking_number: None,
                delivery_address: None,
            });
        let line = msg.transcript_line();
        assert!(line.starts_with("[ai_agent] Scheduled."));
        assert!(line.contains("Delivery Date: 2026-08-05"));
    }
}
