//! Orchestration failure semantics: failing specialists, transient model
//! errors, and the synthesis fallback.

use std::sync::Arc;
use std::time::Duration;

use supportflow::llm::{ScriptedLlm, ScriptedTurn, SynthesisResult};
use supportflow::model::{
    AgentType, ExecutionPlan, ExecutionStep, ExecutionStrategy, MessageType, SpecialistOutput,
    Ticket, TicketStart, TicketStatus,
};
use supportflow::runtime::TicketHandle;
use supportflow::{start_ticket, StaticToolProvider, SupportConfig, SupportRuntime, SupportStore};

fn build_runtime(llm: Arc<ScriptedLlm>) -> Arc<SupportRuntime> {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(SupportStore::in_memory());
    SupportRuntime::new(SupportConfig::default(), llm, Arc::new(StaticToolProvider::new(store)))
}

fn ticket_start(ticket_id: &str, message: &str) -> TicketStart {
    TicketStart {
        ticket_id: ticket_id.to_string(),
        customer_id: "customer-456".to_string(),
        initial_message: message.to_string(),
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
async fn transient_reasoning_error_is_retried_once() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push_turn(
        AgentType::GeneralSupport,
        ScriptedTurn::replying(SpecialistOutput::text("Recovered on retry.", 0.8)),
    );
    llm.fail_next_reasons(1);

    let runtime = build_runtime(llm);
    let handle = start_ticket(&runtime, ticket_start("ticket-retry", "hello")).unwrap();

    let state = wait_for(&handle, |t| t.status == TicketStatus::Open).await;
    let specialist = state
        .chat_history
        .iter()
        .find(|m| m.agent_type == Some(AgentType::GeneralSupport))
        .expect("specialist message");
    assert_eq!(specialist.content, "Recovered on retry.");
    assert_eq!(state.escalation_count, 0);
}

#[tokio::test]
async fn exhausted_retries_become_a_zero_confidence_escalating_result() {
    let llm = Arc::new(ScriptedLlm::new());
    // Both the first attempt and the retry fail.
    llm.fail_next_reasons(2);
    llm.push_synthesis(
        SynthesisResult::reply("I could not complete this automatically.", 0.2).escalating(),
    );

    let runtime = build_runtime(llm.clone());
    let handle = start_ticket(&runtime, ticket_start("ticket-fail", "hello")).unwrap();

    let state = wait_for(&handle, |t| t.status == TicketStatus::EscalatedToHuman).await;

    let specialist = state
        .chat_history
        .iter()
        .find(|m| m.agent_type == Some(AgentType::GeneralSupport) && m.message_type == MessageType::AiAgent)
        .expect("failed specialist message still streamed");
    assert!(specialist.content.starts_with("Agent execution failed"));
    assert_eq!(specialist.metadata["confidence"], 0.0);
    assert_eq!(specialist.metadata["requires_escalation"], true);

    // Synthesis still ran after the failure.
    assert!(state
        .chat_history
        .iter()
        .any(|m| m.agent_type == Some(AgentType::Orchestrator) && m.message_type == MessageType::AiAgent));
}

#[tokio::test]
async fn synthesis_failure_falls_back_to_concatenation_and_escalates() {
    let llm = Arc::new(ScriptedLlm::new());
    llm.push_plan(ExecutionPlan::new(
        vec![
            ExecutionStep::new(1, AgentType::OrderSpecialist, "first angle"),
            ExecutionStep::new(2, AgentType::GeneralSupport, "second angle"),
        ],
        ExecutionStrategy::Parallel,
    ));
    llm.push_turn(
        AgentType::OrderSpecialist,
        ScriptedTurn::replying(SpecialistOutput::text("Order details located.", 0.9)),
    );
    llm.push_turn(
        AgentType::GeneralSupport,
        ScriptedTurn::replying(SpecialistOutput::text("Policy explained.", 0.9)),
    );
    llm.fail_next_syntheses(2);

    let runtime = build_runtime(llm);
    let handle = start_ticket(&runtime, ticket_start("ticket-synthfail", "order and policy?")).unwrap();

    let state = wait_for(&handle, |t| t.status == TicketStatus::EscalatedToHuman).await;

    let final_message = state
        .chat_history
        .iter()
        .rev()
        .find(|m| m.agent_type == Some(AgentType::Orchestrator) && m.message_type == MessageType::AiAgent)
        .expect("fallback synthesis message");
    assert!(final_message.content.contains("Order details located."));
    assert!(final_message.content.contains("Policy explained."));
    assert_eq!(final_message.metadata["confidence"], 0.0);
}

#[tokio::test]
async fn unknown_planned_agents_are_rewritten_not_fatal() {
    let llm = Arc::new(ScriptedLlm::new());
    // The planner hallucinates a human agent; the engine downgrades it.
    llm.push_plan(ExecutionPlan::new(
        vec![ExecutionStep::new(1, AgentType::HumanAgent, "hand this to a person")],
        ExecutionStrategy::Sequential,
    ));
    llm.push_turn(
        AgentType::GeneralSupport,
        ScriptedTurn::replying(SpecialistOutput::text("Handled generically.", 0.7)),
    );

    let runtime = build_runtime(llm);
    let handle = start_ticket(&runtime, ticket_start("ticket-unknown", "help")).unwrap();

    let state = wait_for(&handle, |t| t.status == TicketStatus::Open).await;
    assert!(state
        .chat_history
        .iter()
        .any(|m| m.agent_type == Some(AgentType::GeneralSupport)));
    assert!(!state
        .chat_history
        .iter()
        .any(|m| m.agent_type == Some(AgentType::HumanAgent)));
}
