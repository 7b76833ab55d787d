//! Auto-close maintenance sweep.

use std::sync::Arc;
use std::time::Duration;

use supportflow::llm::{ScriptedLlm, SynthesisResult};
use supportflow::model::{MessageType, Ticket, TicketStart, TicketStatus};
use supportflow::runtime::TicketHandle;
use supportflow::{
    start_ticket, AutoCloseSweeper, StaticToolProvider, SupportConfig, SupportRuntime, SupportStore,
};

const CLOSURE_MESSAGE: &str = "This ticket is now closed due to inactivity";

fn build_runtime(llm: Arc<ScriptedLlm>) -> Arc<SupportRuntime> {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(SupportStore::in_memory());
    SupportRuntime::new(SupportConfig::default(), llm, Arc::new(StaticToolProvider::new(store)))
}

fn ticket_start(ticket_id: &str) -> TicketStart {
    TicketStart {
        ticket_id: ticket_id.to_string(),
        customer_id: "customer-456".to_string(),
        initial_message: "hello".to_string(),
        customer_profile: Default::default(),
    }
}

async fn wait_for(handle: &TicketHandle, predicate: impl Fn(&Ticket) -> bool) -> Ticket {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state = handle.state();
        if predicate(&state) {
            return state;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached; status={:?}", state.status);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn idle_open_ticket_is_swept_closed() {
    let llm = Arc::new(ScriptedLlm::new());
    let runtime = build_runtime(llm);
    let handle = start_ticket(&runtime, ticket_start("ticket-idle")).unwrap();

    // Let the initial orchestration finish so the ticket is idle and open.
    wait_for(&handle, |t| t.status == TicketStatus::Open && t.chat_history.len() >= 4).await;

    let sweeper = AutoCloseSweeper::new(runtime.clone())
        .with_inactivity_minutes(0)
        .with_closure_message(CLOSURE_MESSAGE);
    let report = sweeper.run_once().await;

    assert_eq!(report.evaluated, 1);
    assert_eq!(report.closed, 1);
    assert_eq!(report.closed_ticket_ids, vec!["ticket-idle".to_string()]);
    assert_eq!(report.inactivity_minutes, 0);

    let state = wait_for(&handle, |t| t.status == TicketStatus::Closed).await;
    let last = state.chat_history.last().unwrap();
    assert_eq!(last.message_type, MessageType::System);
    assert_eq!(last.content, CLOSURE_MESSAGE);
    assert_eq!(last.metadata["source"], "ticket_auto_close");

    // The conductor terminates and leaves the registry.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while handle.is_running() {
        assert!(tokio::time::Instant::now() < deadline, "conductor should stop");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(runtime.running_tickets().is_empty());
}

#[tokio::test]
async fn recently_active_ticket_survives_the_sweep() {
    let llm = Arc::new(ScriptedLlm::new());
    let runtime = build_runtime(llm);
    let handle = start_ticket(&runtime, ticket_start("ticket-active")).unwrap();
    wait_for(&handle, |t| t.status == TicketStatus::Open).await;

    // Sixty-minute window; the ticket was touched moments ago.
    let sweeper = AutoCloseSweeper::new(runtime.clone());
    let report = sweeper.run_once().await;

    assert_eq!(report.evaluated, 1);
    assert_eq!(report.closed, 0);
    assert_eq!(handle.state().status, TicketStatus::Open);
}

#[tokio::test]
async fn non_open_tickets_are_not_swept() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push_synthesis(SynthesisResult::reply("needs a person", 0.3).escalating());
    let runtime = build_runtime(llm);
    let handle = start_ticket(&runtime, ticket_start("ticket-escalated")).unwrap();
    wait_for(&handle, |t| t.status == TicketStatus::EscalatedToHuman).await;

    let sweeper = AutoCloseSweeper::new(runtime.clone()).with_inactivity_minutes(0);
    let report = sweeper.run_once().await;

    assert_eq!(report.evaluated, 1);
    assert_eq!(report.closed, 0);
    assert_eq!(handle.state().status, TicketStatus::EscalatedToHuman);
}
