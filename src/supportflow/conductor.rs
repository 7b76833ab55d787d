//! The ticket conductor workflow.
//!
//! One conductor task exclusively owns one [`Ticket`]. It drains its signal
//! mailbox strictly in arrival order (which is what makes the transcript a
//! total order), dispatches each genuine customer query into a fresh
//! orchestration, and routes customer replies to a waiting question
//! workflow when one holds the awaiting-answer slot. At most one
//! orchestration runs per ticket at a time; further customer messages queue
//! behind it.
//!
//! Question serialization: the first question an agent asks takes the
//! awaiting-answer slot; questions raised while one is outstanding are
//! recorded and queued, then promoted one at a time as the slot clears, so
//! the customer is never facing two open questions at once and every answer
//! has an unambiguous recipient.
//!
//! Termination: when the status reaches `closed` or `resolved` the
//! conductor force-times-out every pending question (unblocking any parked
//! specialist), waits for the in-flight orchestration to finish, ignores
//! its late messages, publishes a final snapshot, and deregisters itself.

use crate::supportflow::model::{
    AgentType, ChatMessage, EscalationReason, MessageType, QuestionRecord, QuestionStatus, Ticket,
    TicketStart, TicketStatus,
};
use crate::supportflow::orchestrator::{run_orchestration, OrchestratorInput, OrchestratorOutput, OrchestratorResult};
use crate::supportflow::runtime::{RuntimeError, SupportRuntime, TicketHandle, TicketSignal};
use chrono::Utc;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Start a ticket conductor and return its handle.
///
/// The workflow id is the ticket id. The initial customer message is
/// appended to the transcript and queued for orchestration before the
/// handle is returned, so an immediate `state()` already shows it.
pub fn start_ticket(
    runtime: &Arc<SupportRuntime>,
    start: TicketStart,
) -> Result<TicketHandle, RuntimeError> {
    let mut ticket = Ticket::new(&start);
    let first = ChatMessage::customer(&start.ticket_id, &start.initial_message);
    ticket.chat_history.push(first.clone());

    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(ticket.clone());
    let handle = TicketHandle::new(start.ticket_id.clone(), signal_tx, snapshot_rx);
    runtime.register_ticket(handle.clone())?;

    log::info!("starting agent-driven workflow for ticket {}", start.ticket_id);

    let conductor = TicketConductor {
        runtime: runtime.clone(),
        state: ticket,
        signals: signal_rx,
        snapshot: snapshot_tx,
        queue: VecDeque::from(vec![first]),
        awaiting_answer: None,
        question_backlog: VecDeque::new(),
        inflight: None,
        signals_closed: false,
    };
    tokio::spawn(conductor.run());
    Ok(handle)
}

struct TicketConductor {
    runtime: Arc<SupportRuntime>,
    state: Ticket,
    signals: mpsc::UnboundedReceiver<TicketSignal>,
    snapshot: watch::Sender<Ticket>,
    /// Customer messages awaiting orchestration, drained one at a time.
    queue: VecDeque<ChatMessage>,
    /// Question workflow id currently entitled to the next customer message.
    awaiting_answer: Option<String>,
    /// Questions waiting their turn at the awaiting-answer slot.
    question_backlog: VecDeque<String>,
    inflight: Option<JoinHandle<OrchestratorResult<OrchestratorOutput>>>,
    signals_closed: bool,
}

impl TicketConductor {
    async fn run(mut self) {
        loop {
            self.maybe_dispatch();

            if self.state.status.is_terminal() && self.inflight.is_none() {
                break;
            }

            if let Some(mut inflight) = self.inflight.take() {
                if self.signals_closed {
                    let result = (&mut inflight).await;
                    self.finish_orchestration(result);
                    continue;
                }
                // Signals win ties: everything the orchestrator streamed is
                // in the transcript before its completion is observed.
                tokio::select! {
                    biased;
                    maybe = self.signals.recv() => {
                        self.inflight = Some(inflight);
                        match maybe {
                            Some(signal) => self.handle_signal(signal),
                            None => self.signals_closed = true,
                        }
                    }
                    result = &mut inflight => {
                        self.finish_orchestration(result);
                    }
                }
            } else {
                if self.signals_closed {
                    break;
                }
                match self.signals.recv().await {
                    Some(signal) => self.handle_signal(signal),
                    None => self.signals_closed = true,
                }
            }
        }

        self.shutdown();
    }

    /// Pop the next queued customer message into a fresh orchestration.
    fn maybe_dispatch(&mut self) {
        if self.inflight.is_some() || self.state.status.is_terminal() {
            return;
        }
        let message = match self.queue.pop_front() {
            Some(message) => message,
            None => return,
        };

        log::info!(
            "processing message with orchestrator: '{}'",
            truncate(&message.content, 100)
        );

        self.state.status = TicketStatus::InProgress;
        self.state.assigned_agent_type = Some(AgentType::Orchestrator);
        self.state.last_updated = Utc::now();

        let input = OrchestratorInput {
            customer_message: message.content.clone(),
            chat_history: self.state.transcript_lines(Some(&message.id)),
            customer_profile: self.state.customer_profile.clone(),
            customer_id: self.state.customer_id.clone(),
            ticket_id: self.state.ticket_id.clone(),
            ticket_workflow_id: self.state.ticket_id.clone(),
            available_agents: AgentType::available_agents(),
        };
        self.inflight = Some(tokio::spawn(run_orchestration(self.runtime.clone(), input)));
        self.publish();
    }

    fn handle_signal(&mut self, signal: TicketSignal) {
        match signal {
            TicketSignal::AddMessage(message) => self.on_add_message(message),
            TicketSignal::UpdateTicketStatus(status) => self.on_update_status(&status),
            TicketSignal::DisplayAgentQuestion(record) => self.on_display_question(record),
            TicketSignal::QuestionTimeout { question_id } => self.on_question_timeout(&question_id),
        }
    }

    fn on_add_message(&mut self, message: ChatMessage) {
        if self.state.status.is_terminal() {
            log::info!(
                "ticket {} is terminal; dropping {} message",
                self.state.ticket_id,
                message.message_type.as_str()
            );
            return;
        }

        self.state.chat_history.push(message.clone());
        self.state.last_updated = Utc::now();

        match message.message_type {
            // Orchestrator and operator output: already processed, recorded
            // for visibility only.
            MessageType::System | MessageType::AiAgent | MessageType::HumanAgent => {}
            MessageType::Customer => {
                if let Some(question_id) = self.awaiting_answer.take() {
                    self.route_answer(&question_id, &message.content);
                } else {
                    self.queue.push_back(message);
                }
            }
        }
        self.publish();
    }

    /// Deliver a customer message to the question workflow holding the
    /// awaiting-answer slot. The message is never treated as a new query;
    /// if delivery fails the agent is expected to ask again.
    fn route_answer(&mut self, question_id: &str, content: &str) {
        log::info!("routing customer message as answer to workflow {}", question_id);
        match self.runtime.question(question_id) {
            Some(question) => {
                if !question.receive_answer(content) {
                    log::warn!("question {} already resolved; answer dropped", question_id);
                }
            }
            None => log::warn!("question workflow {} not found; answer dropped", question_id),
        }

        if let Some(record) = self.state.pending_questions.get_mut(question_id) {
            record.status = QuestionStatus::Answered;
            record.response = Some(content.to_string());
            record.responded_at = Some(Utc::now());
        }

        self.promote_next_question();
        if self.awaiting_answer.is_none()
            && self.state.open_question_count() == 0
            && self.state.status == TicketStatus::WaitingForCustomer
        {
            self.state.status = TicketStatus::InProgress;
        }
    }

    fn on_update_status(&mut self, raw: &str) {
        let status: TicketStatus = match raw.parse() {
            Ok(status) => status,
            Err(e) => {
                log::warn!("ticket {}: {}; signal dropped", self.state.ticket_id, e);
                return;
            }
        };
        if !self.state.status.can_transition_to(status) {
            log::warn!(
                "ticket {}: transition {} -> {} rejected",
                self.state.ticket_id,
                self.state.status,
                status
            );
            return;
        }

        self.state.status = status;
        self.state.last_updated = Utc::now();

        if status == TicketStatus::Resolved && self.state.resolution_summary.is_none() {
            self.state.resolution_summary = self
                .state
                .chat_history
                .iter()
                .rev()
                .find(|m| {
                    m.message_type == MessageType::AiAgent
                        && m.agent_type == Some(AgentType::Orchestrator)
                })
                .map(|m| m.content.clone());
        }

        if status.is_terminal() {
            self.cancel_pending_questions();
        }
        self.publish();
    }

    fn on_display_question(&mut self, record: QuestionRecord) {
        if self.state.status.is_terminal() {
            // A specialist asked after closure; unblock it immediately.
            if let Some(question) = self.runtime.question(&record.question_id) {
                question.cancel();
            }
            return;
        }

        let question_id = record.question_id.clone();
        let question_message = ChatMessage::system(&self.state.ticket_id, &record.question)
            .with_agent(record.agent_type)
            .with_metadata("question", json!(record));
        self.state.chat_history.push(question_message);
        self.state.pending_questions.insert(question_id.clone(), record);
        self.state.status = TicketStatus::WaitingForCustomer;
        self.state.last_updated = Utc::now();

        if self.awaiting_answer.is_none() {
            self.awaiting_answer = Some(question_id.clone());
        } else {
            self.question_backlog.push_back(question_id.clone());
        }

        log::info!(
            "question {} displayed in chat; awaiting answer to workflow {:?}",
            question_id,
            self.awaiting_answer
        );
        self.publish();
    }

    fn on_question_timeout(&mut self, question_id: &str) {
        if let Some(record) = self.state.pending_questions.get_mut(question_id) {
            if record.status == QuestionStatus::Pending {
                record.status = QuestionStatus::Timeout;
            }
        }
        if self.awaiting_answer.as_deref() == Some(question_id) {
            self.awaiting_answer = None;
            self.promote_next_question();
        } else {
            self.question_backlog.retain(|id| id != question_id);
        }

        if !self.state.status.is_terminal()
            && self.awaiting_answer.is_none()
            && self.state.open_question_count() == 0
            && self.state.status == TicketStatus::WaitingForCustomer
        {
            self.state.status = TicketStatus::InProgress;
        }
        self.state.last_updated = Utc::now();
        self.publish();
    }

    /// Hand the awaiting-answer slot to the next still-pending queued
    /// question, if any.
    fn promote_next_question(&mut self) {
        while let Some(next) = self.question_backlog.pop_front() {
            let pending = self
                .state
                .pending_questions
                .get(&next)
                .map(QuestionRecord::is_pending)
                .unwrap_or(false);
            if pending {
                log::info!("promoting queued question {}", next);
                self.awaiting_answer = Some(next);
                self.state.status = TicketStatus::WaitingForCustomer;
                return;
            }
        }
    }

    fn finish_orchestration(
        &mut self,
        result: Result<OrchestratorResult<OrchestratorOutput>, tokio::task::JoinError>,
    ) {
        self.inflight = None;
        self.state.last_updated = Utc::now();

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                self.record_orchestration_failure(&e.to_string());
                return;
            }
            Err(e) => {
                self.record_orchestration_failure(&format!("orchestrator task panicked: {}", e));
                return;
            }
        };

        self.state.context.insert(
            "orchestrator_plan".to_string(),
            serde_json::to_value(&output.execution_plan).unwrap_or_default(),
        );
        self.state
            .context
            .insert("orchestrator_confidence".to_string(), json!(output.confidence));
        self.state.context.insert(
            "last_orchestrator_execution".to_string(),
            json!(Utc::now().to_rfc3339()),
        );

        if output.requires_escalation && !self.state.status.is_terminal() {
            log::info!("orchestrator synthesis determined escalation needed");
            self.state.status = TicketStatus::EscalatedToHuman;
            self.state.escalation_count += 1;
            self.state.escalation_reason = Some(EscalationReason::ComplexIssue);
            self.state.context.insert(
                "escalation_reason".to_string(),
                json!("orchestrator determined human assistance needed"),
            );
            self.state
                .context
                .insert("escalation_time".to_string(), json!(Utc::now().to_rfc3339()));
        } else if !self.state.status.is_terminal()
            && self.queue.is_empty()
            && self.state.open_question_count() == 0
        {
            // Idle again; eligible for the inactivity sweep.
            self.state.status = TicketStatus::Open;
        }

        if output.requires_followup && output.followup_plan.is_some() {
            // Advisory only; surfaced for the operator, never executed.
            log::info!("orchestrator flagged a possible follow-up");
            let note = ChatMessage::system(
                &self.state.ticket_id,
                format!("Follow-up may be needed: {}", output.synthesis_reasoning),
            )
            .with_agent(AgentType::Orchestrator);
            self.state.chat_history.push(note);
        }

        log::info!(
            "orchestrator processing complete: confidence={:.2}",
            output.confidence
        );
        self.publish();
    }

    fn record_orchestration_failure(&mut self, error: &str) {
        log::error!("ticket {}: orchestration failed: {}", self.state.ticket_id, error);
        self.state.failed_attempts += 1;
        if !self.state.status.is_terminal() {
            self.state.escalation_count += 1;
            self.state.escalation_reason = Some(EscalationReason::TechnicalLimitation);
            self.state.status = TicketStatus::EscalatedToHuman;
            let note = ChatMessage::system(
                &self.state.ticket_id,
                format!("Orchestration failed: {}", error),
            );
            self.state.chat_history.push(note);
        }
        self.publish();
    }

    /// Force every pending question down its timeout path so parked
    /// specialists complete; records are marked directly rather than
    /// waiting for the timeout signal round-trip.
    fn cancel_pending_questions(&mut self) {
        let pending: Vec<String> = self
            .state
            .pending_questions
            .values()
            .filter(|q| q.is_pending())
            .map(|q| q.question_id.clone())
            .collect();
        for question_id in pending {
            if let Some(question) = self.runtime.question(&question_id) {
                question.cancel();
            }
            if let Some(record) = self.state.pending_questions.get_mut(&question_id) {
                record.status = QuestionStatus::Timeout;
            }
        }
        self.awaiting_answer = None;
        self.question_backlog.clear();
    }

    fn publish(&self) {
        let _ = self.snapshot.send(self.state.clone());
    }

    fn shutdown(mut self) {
        self.cancel_pending_questions();
        self.publish();
        self.runtime.deregister(&self.state.ticket_id);
        log::info!("ticket {} completed by agents", self.state.ticket_id);
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
