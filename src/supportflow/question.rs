//! Agent-to-customer question rendezvous.
//!
//! A question workflow is a one-shot durable coroutine: it announces the
//! question to the owning ticket conductor (which appends it to the chat
//! history before any answer can be routed), then parks on a single-shot
//! answer channel racing a timer. The customer's next message, routed by
//! the conductor, resolves the channel; silence resolves the timer and the
//! asking specialist receives the literal timeout marker instead of an
//! answer. Ticket closure resolves the channel as a forced timeout.

use crate::supportflow::model::{
    timeout_marker, AgentType, ExpectedAnswer, QuestionRecord, QuestionStatus,
    QuestionStatusSnapshot,
};
use crate::supportflow::runtime::{AnswerDelivery, QuestionHandle, RuntimeError, SupportRuntime};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

/// Inputs for one question workflow run.
#[derive(Debug, Clone)]
pub struct QuestionRequest {
    pub question: String,
    /// Workflow id of the ticket conductor to announce through.
    pub parent_workflow_id: String,
    pub ticket_id: String,
    /// Which agent is asking.
    pub agent_type: AgentType,
    pub expected_response_type: ExpectedAnswer,
    pub timeout_seconds: u64,
}

/// Run a question workflow to completion and return the customer's answer,
/// or the timeout marker when none arrived in time.
///
/// The workflow id is `<ticket_id>-question-<uuid>` and doubles as the
/// question id in the ticket's records.
pub async fn ask(runtime: &Arc<SupportRuntime>, request: QuestionRequest) -> Result<String, RuntimeError> {
    let workflow_id = format!("{}-question-{}", request.ticket_id, Uuid::new_v4());

    let parent = runtime
        .ticket(&request.parent_workflow_id)
        .ok_or_else(|| RuntimeError::WorkflowNotFound(request.parent_workflow_id.clone()))?;

    let (answer_tx, answer_rx) = oneshot::channel();
    let (status_tx, status_rx) = watch::channel(QuestionStatusSnapshot::default());
    let handle = QuestionHandle::new(
        workflow_id.clone(),
        Arc::new(Mutex::new(Some(answer_tx))),
        status_rx,
    );
    runtime.register_question(handle)?;

    let record = QuestionRecord {
        question_id: workflow_id.clone(),
        ticket_id: request.ticket_id.clone(),
        agent_type: request.agent_type,
        question: request.question.clone(),
        expected_response_type: request.expected_response_type,
        timeout_seconds: request.timeout_seconds,
        status: QuestionStatus::Pending,
        response: None,
        asked_at: Utc::now(),
        responded_at: None,
    };

    // Announce before waiting: the conductor appends the question to the
    // transcript and arms answer routing in one signal, so the customer
    // always sees the question before an answer can land.
    if let Err(e) = parent.display_agent_question(record) {
        runtime.deregister(&workflow_id);
        return Err(e);
    }

    log::info!(
        "question {} sent to parent workflow {}",
        workflow_id,
        request.parent_workflow_id
    );

    let outcome = tokio::time::timeout(Duration::from_secs(request.timeout_seconds), answer_rx).await;
    runtime.deregister(&workflow_id);

    match outcome {
        Ok(Ok(AnswerDelivery::Answer(answer))) => {
            log::info!("question {} answered", workflow_id);
            let _ = status_tx.send(QuestionStatusSnapshot {
                answered: true,
                answer: Some(answer.clone()),
            });
            Ok(answer)
        }
        Ok(Ok(AnswerDelivery::Cancelled)) | Ok(Err(_)) => {
            log::warn!("question {} cancelled by parent", workflow_id);
            let _ = parent.question_timeout(workflow_id);
            Ok(timeout_marker(request.timeout_seconds))
        }
        Err(_) => {
            log::warn!(
                "question {} timed out after {} seconds",
                workflow_id,
                request.timeout_seconds
            );
            let _ = parent.question_timeout(workflow_id);
            Ok(timeout_marker(request.timeout_seconds))
        }
    }
}

/// Explicit capability a specialist's user-interaction tools are built
/// around: everything `ask_user_question` needs to reach the customer,
/// passed into the tool closure at construction instead of read from
/// ambient process state.
#[derive(Clone)]
pub struct InteractionHandle {
    runtime: Arc<SupportRuntime>,
    parent_workflow_id: String,
    ticket_id: String,
    agent_type: AgentType,
}

impl InteractionHandle {
    pub fn new(
        runtime: Arc<SupportRuntime>,
        parent_workflow_id: impl Into<String>,
        ticket_id: impl Into<String>,
        agent_type: AgentType,
    ) -> Self {
        Self {
            runtime,
            parent_workflow_id: parent_workflow_id.into(),
            ticket_id: ticket_id.into(),
            agent_type,
        }
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    /// Ask the customer a question and block until their reply or timeout.
    pub async fn ask(
        &self,
        question: impl Into<String>,
        expected_response_type: ExpectedAnswer,
        timeout_seconds: Option<u64>,
    ) -> Result<String, RuntimeError> {
        let timeout_seconds =
            timeout_seconds.unwrap_or(self.runtime.config().question_timeout_seconds);
        ask(
            &self.runtime,
            QuestionRequest {
                question: question.into(),
                parent_workflow_id: self.parent_workflow_id.clone(),
                ticket_id: self.ticket_id.clone(),
                agent_type: self.agent_type,
                expected_response_type,
                timeout_seconds,
            },
        )
        .await
    }
}

impl std::fmt::Debug for InteractionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionHandle")
            .field("ticket_id", &self.ticket_id)
            .field("agent_type", &self.agent_type)
            .finish()
    }
}
