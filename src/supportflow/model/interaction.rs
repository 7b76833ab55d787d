//! Agent-to-customer question records.
//!
//! When a specialist needs clarification mid-task it raises a question
//! through the rendezvous workflow; the owning ticket records it as a
//! [`QuestionRecord`] that lives in the ticket state forever, ending in
//! either the `answered` or `timeout` terminal status.

use crate::supportflow::model::plan::AgentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What shape of answer the asking agent expects. Advisory; answers are
/// delivered as raw text either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedAnswer {
    Text,
    Number,
    YesNo,
    OrderId,
}

impl Default for ExpectedAnswer {
    fn default() -> Self {
        ExpectedAnswer::Text
    }
}

/// Lifecycle of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Answered,
    Timeout,
}

/// A question asked by an agent, as stored in the ticket state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Equal to the question workflow's id; answers are routed by this.
    pub question_id: String,
    pub ticket_id: String,
    /// Which agent asked.
    pub agent_type: AgentType,
    pub question: String,
    #[serde(default)]
    pub expected_response_type: ExpectedAnswer,
    pub timeout_seconds: u64,
    pub status: QuestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub asked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl QuestionRecord {
    pub fn is_pending(&self) -> bool {
        self.status == QuestionStatus::Pending
    }
}

/// The literal marker a specialist receives when the customer never answered.
pub fn timeout_marker(timeout_seconds: u64) -> String {
    format!(
        "[TIMEOUT: User did not respond within {} seconds]",
        timeout_seconds
    )
}

/// Snapshot returned by a question workflow's status query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionStatusSnapshot {
    pub answered: bool,
    pub answer: Option<String>,
}
