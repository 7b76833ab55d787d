//! Cooperative durable-task runtime.
//!
//! Each workflow is a tokio task with an explicit contact surface:
//!
//! - a **signal mailbox** (unbounded mpsc) drained strictly in arrival
//!   order by the single owning task, which is what gives a ticket its
//!   total message order;
//! - a **state query** (watch channel) republished by the owner after every
//!   mutation, so `state()` is always a consistent read-only snapshot;
//! - for question workflows, a **single-shot answer slot** (oneshot) that
//!   the conductor resolves exactly once.
//!
//! The [`SupportRuntime`] holds the registry mapping workflow ids to these
//! surfaces (which is how the maintenance sweep enumerates running tickets
//! and how answers find their question workflow), the process-wide
//! concurrency limits, and the injected collaborators (model, tools).
//! Suspension points are exactly signal waits, child joins, activity calls,
//! and timers; nothing blocks a thread.

use crate::supportflow::config::SupportConfig;
use crate::supportflow::llm::SupportLlm;
use crate::supportflow::model::{ChatMessage, QuestionRecord, QuestionStatusSnapshot, Ticket};
use crate::supportflow::tool::ToolProvider;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch, Semaphore};

/// Errors surfaced by the runtime registry and signal plumbing.
#[derive(Debug)]
pub enum RuntimeError {
    /// A workflow with this id is already registered.
    DuplicateWorkflow(String),
    /// No running workflow has this id.
    WorkflowNotFound(String),
    /// The target workflow has already completed; the signal was dropped.
    WorkflowStopped(String),
    /// A raw signal envelope failed to parse.
    BadPayload(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::DuplicateWorkflow(id) => write!(f, "workflow already running: {}", id),
            RuntimeError::WorkflowNotFound(id) => write!(f, "workflow not found: {}", id),
            RuntimeError::WorkflowStopped(id) => write!(f, "workflow already stopped: {}", id),
            RuntimeError::BadPayload(msg) => write!(f, "bad signal payload: {}", msg),
        }
    }
}

impl Error for RuntimeError {}

/// The signal surface of a ticket conductor.
///
/// The serde tags are the external contract; producers that speak JSON send
/// envelopes like `{"signal": "addMessage", "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "signal", content = "payload")]
pub enum TicketSignal {
    #[serde(rename = "addMessage")]
    AddMessage(ChatMessage),
    #[serde(rename = "updateTicketStatus")]
    UpdateTicketStatus(String),
    #[serde(rename = "display_agent_question")]
    DisplayAgentQuestion(QuestionRecord),
    #[serde(rename = "question_timeout")]
    QuestionTimeout { question_id: String },
}

/// Client-side handle to a running ticket conductor.
#[derive(Clone)]
pub struct TicketHandle {
    workflow_id: String,
    signals: mpsc::UnboundedSender<TicketSignal>,
    state: watch::Receiver<Ticket>,
}

impl TicketHandle {
    pub(crate) fn new(
        workflow_id: String,
        signals: mpsc::UnboundedSender<TicketSignal>,
        state: watch::Receiver<Ticket>,
    ) -> Self {
        Self {
            workflow_id,
            signals,
            state,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Deliver a typed signal to the conductor's mailbox.
    pub fn signal(&self, signal: TicketSignal) -> Result<(), RuntimeError> {
        self.signals
            .send(signal)
            .map_err(|_| RuntimeError::WorkflowStopped(self.workflow_id.clone()))
    }

    /// Deliver a raw JSON envelope (`{"signal": ..., "payload": ...}`).
    pub fn signal_json(&self, envelope: Value) -> Result<(), RuntimeError> {
        let signal: TicketSignal =
            serde_json::from_value(envelope).map_err(|e| RuntimeError::BadPayload(e.to_string()))?;
        self.signal(signal)
    }

    pub fn add_message(&self, message: ChatMessage) -> Result<(), RuntimeError> {
        self.signal(TicketSignal::AddMessage(message))
    }

    pub fn update_ticket_status(&self, status: impl Into<String>) -> Result<(), RuntimeError> {
        self.signal(TicketSignal::UpdateTicketStatus(status.into()))
    }

    pub fn display_agent_question(&self, record: QuestionRecord) -> Result<(), RuntimeError> {
        self.signal(TicketSignal::DisplayAgentQuestion(record))
    }

    pub fn question_timeout(&self, question_id: impl Into<String>) -> Result<(), RuntimeError> {
        self.signal(TicketSignal::QuestionTimeout {
            question_id: question_id.into(),
        })
    }

    /// The latest published state snapshot (the `getState` query).
    pub fn state(&self) -> Ticket {
        self.state.borrow().clone()
    }

    /// Await the next snapshot publication; used by drivers that poll for a
    /// condition without busy-waiting.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// Whether the conductor task is still consuming signals.
    pub fn is_running(&self) -> bool {
        !self.signals.is_closed()
    }
}

impl fmt::Debug for TicketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketHandle")
            .field("workflow_id", &self.workflow_id)
            .finish()
    }
}

/// How a question workflow's wait ends.
#[derive(Debug)]
pub(crate) enum AnswerDelivery {
    Answer(String),
    /// Forced timeout, used when the owning ticket reaches a terminal state.
    Cancelled,
}

/// Client-side handle to a running question workflow.
#[derive(Clone)]
pub struct QuestionHandle {
    workflow_id: String,
    slot: Arc<Mutex<Option<oneshot::Sender<AnswerDelivery>>>>,
    status: watch::Receiver<QuestionStatusSnapshot>,
}

impl QuestionHandle {
    pub(crate) fn new(
        workflow_id: String,
        slot: Arc<Mutex<Option<oneshot::Sender<AnswerDelivery>>>>,
        status: watch::Receiver<QuestionStatusSnapshot>,
    ) -> Self {
        Self {
            workflow_id,
            slot,
            status,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    fn resolve(&self, delivery: AnswerDelivery) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take();
        match sender {
            Some(sender) => sender.send(delivery).is_ok(),
            None => false,
        }
    }

    /// Deliver the customer's answer. Returns `false` when the workflow has
    /// already resolved (answered, timed out, or cancelled).
    pub fn receive_answer(&self, answer: impl Into<String>) -> bool {
        self.resolve(AnswerDelivery::Answer(answer.into()))
    }

    /// Force the workflow down its timeout path immediately.
    pub fn cancel(&self) -> bool {
        self.resolve(AnswerDelivery::Cancelled)
    }

    /// The `get_status` query: `{answered, answer}`.
    pub fn get_status(&self) -> QuestionStatusSnapshot {
        self.status.borrow().clone()
    }
}

impl fmt::Debug for QuestionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestionHandle")
            .field("workflow_id", &self.workflow_id)
            .finish()
    }
}

enum WorkflowEntry {
    Ticket(TicketHandle),
    Question(QuestionHandle),
}

/// The process-wide runtime: registry, concurrency limits, and injected
/// collaborators.
pub struct SupportRuntime {
    config: SupportConfig,
    llm: Arc<dyn SupportLlm>,
    tools: Arc<dyn ToolProvider>,
    workflows: RwLock<HashMap<String, WorkflowEntry>>,
    activity_permits: Arc<Semaphore>,
    workflow_permits: Arc<Semaphore>,
}

impl SupportRuntime {
    /// Assemble a runtime from its collaborators. Everything is injected;
    /// the runtime owns no global state.
    pub fn new(config: SupportConfig, llm: Arc<dyn SupportLlm>, tools: Arc<dyn ToolProvider>) -> Arc<Self> {
        let activity_permits = Arc::new(Semaphore::new(config.max_concurrent_activities));
        let workflow_permits = Arc::new(Semaphore::new(config.max_concurrent_workflow_tasks));
        Arc::new(Self {
            config,
            llm,
            tools,
            workflows: RwLock::new(HashMap::new()),
            activity_permits,
            workflow_permits,
        })
    }

    pub fn config(&self) -> &SupportConfig {
        &self.config
    }

    pub fn llm(&self) -> &Arc<dyn SupportLlm> {
        &self.llm
    }

    pub fn tools(&self) -> &Arc<dyn ToolProvider> {
        &self.tools
    }

    /// Reserve an activity slot; held for the duration of one planning,
    /// synthesis, or specialist reasoning call.
    pub async fn acquire_activity_permit(&self) -> tokio::sync::OwnedSemaphorePermit {
        self.activity_permits
            .clone()
            .acquire_owned()
            .await
            .expect("activity semaphore never closed")
    }

    /// Reserve a child-workflow slot.
    pub async fn acquire_workflow_permit(&self) -> tokio::sync::OwnedSemaphorePermit {
        self.workflow_permits
            .clone()
            .acquire_owned()
            .await
            .expect("workflow semaphore never closed")
    }

    fn registry(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, WorkflowEntry>> {
        self.workflows.write().unwrap_or_else(|poison| poison.into_inner())
    }

    fn registry_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, WorkflowEntry>> {
        self.workflows.read().unwrap_or_else(|poison| poison.into_inner())
    }

    pub(crate) fn register_ticket(&self, handle: TicketHandle) -> Result<(), RuntimeError> {
        let mut registry = self.registry();
        let id = handle.workflow_id().to_string();
        if registry.contains_key(&id) {
            return Err(RuntimeError::DuplicateWorkflow(id));
        }
        registry.insert(id, WorkflowEntry::Ticket(handle));
        Ok(())
    }

    pub(crate) fn register_question(&self, handle: QuestionHandle) -> Result<(), RuntimeError> {
        let mut registry = self.registry();
        let id = handle.workflow_id().to_string();
        if registry.contains_key(&id) {
            return Err(RuntimeError::DuplicateWorkflow(id));
        }
        registry.insert(id, WorkflowEntry::Question(handle));
        Ok(())
    }

    pub(crate) fn deregister(&self, workflow_id: &str) {
        self.registry().remove(workflow_id);
    }

    /// Look up a running ticket conductor by workflow id.
    pub fn ticket(&self, workflow_id: &str) -> Option<TicketHandle> {
        match self.registry_read().get(workflow_id) {
            Some(WorkflowEntry::Ticket(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Look up a running question workflow by workflow id.
    pub fn question(&self, workflow_id: &str) -> Option<QuestionHandle> {
        match self.registry_read().get(workflow_id) {
            Some(WorkflowEntry::Question(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Every registered ticket conductor still consuming signals, sorted by
    /// id for deterministic sweeps.
    pub fn running_tickets(&self) -> Vec<TicketHandle> {
        let mut tickets: Vec<TicketHandle> = self
            .registry_read()
            .values()
            .filter_map(|entry| match entry {
                WorkflowEntry::Ticket(handle) if handle.is_running() => Some(handle.clone()),
                _ => None,
            })
            .collect();
        tickets.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));
        tickets
    }
}

impl fmt::Debug for SupportRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupportRuntime")
            .field("workflows", &self.registry_read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supportflow::llm::ScriptedLlm;
    use crate::supportflow::store::SupportStore;
    use crate::supportflow::tool::StaticToolProvider;
    use serde_json::json;

    fn runtime() -> Arc<SupportRuntime> {
        let store = Arc::new(SupportStore::in_memory());
        SupportRuntime::new(
            SupportConfig::default(),
            Arc::new(ScriptedLlm::new()),
            Arc::new(StaticToolProvider::new(store)),
        )
    }

    #[test]
    fn signal_envelope_tags_are_the_contract() {
        let signal = TicketSignal::UpdateTicketStatus("closed".to_string());
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["signal"], "updateTicketStatus");
        assert_eq!(value["payload"], "closed");

        let signal = TicketSignal::QuestionTimeout {
            question_id: "q-1".to_string(),
        };
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["signal"], "question_timeout");
        assert_eq!(value["payload"]["question_id"], "q-1");

        let msg = ChatMessage::customer("t-1", "hello");
        let value = serde_json::to_value(&TicketSignal::AddMessage(msg)).unwrap();
        assert_eq!(value["signal"], "addMessage");

        let parsed: TicketSignal = serde_json::from_value(json!({
            "signal": "display_agent_question",
            "payload": {
                "question_id": "q-2",
                "ticket_id": "t-1",
                "agent_type": "male_specialist",
                "question": "size?",
                "timeout_seconds": 30,
                "status": "pending",
                "asked_at": chrono::Utc::now(),
            },
        }))
        .unwrap();
        assert!(matches!(parsed, TicketSignal::DisplayAgentQuestion(_)));
    }

    #[test]
    fn registry_rejects_duplicate_ids() {
        let runtime = runtime();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_state_tx, state_rx) = watch::channel(Ticket::new(&crate::supportflow::model::TicketStart {
            ticket_id: "t-1".to_string(),
            customer_id: "c".to_string(),
            initial_message: "m".to_string(),
            customer_profile: Default::default(),
        }));
        let handle = TicketHandle::new("t-1".to_string(), tx, state_rx);
        runtime.register_ticket(handle.clone()).unwrap();
        assert!(matches!(
            runtime.register_ticket(handle),
            Err(RuntimeError::DuplicateWorkflow(_))
        ));
        assert_eq!(runtime.running_tickets().len(), 1);
        runtime.deregister("t-1");
        assert!(runtime.ticket("t-1").is_none());
    }

    #[test]
    fn question_slot_resolves_once() {
        let (tx, mut rx) = oneshot::channel();
        let (_status_tx, status_rx) = watch::channel(QuestionStatusSnapshot::default());
        let handle = QuestionHandle::new(
            "q-1".to_string(),
            Arc::new(Mutex::new(Some(tx))),
            status_rx,
        );
        assert!(handle.receive_answer("blue"));
        assert!(!handle.receive_answer("red"));
        match rx.try_recv().unwrap() {
            AnswerDelivery::Answer(answer) => assert_eq!(answer, "blue"),
            AnswerDelivery::Cancelled => panic!("expected answer"),
        }
    }
}
