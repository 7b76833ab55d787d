//! Per-message orchestration: plan, execute, synthesize.
//!
//! For one customer message the orchestrator produces one synthesized reply
//! in three phases:
//!
//! 1. **Planning** - the model collaborator proposes an execution plan,
//!    which is normalized at the boundary (unknown agents rewritten,
//!    context references auto-filled, empty plans defaulted).
//! 2. **Execution** - steps run in dependency stages; stages are
//!    sequential, steps inside a stage run concurrently. An execution
//!    context accumulates each step's output under `step_<n>` keys and is
//!    injected into dependent steps. Every step result is streamed to the
//!    ticket conductor the moment it lands, so the customer sees progress
//!    incrementally.
//! 3. **Synthesis** - the collaborator folds all results into one reply;
//!    a failure here degrades to concatenating the specialist responses and
//!    forcing escalation, never to losing the turn.
//!
//! Specialist context building re-queries the conductor's live state, so
//! conversation turns that arrived after planning began (agent questions
//! answered mid-plan in particular) are always visible to later steps.

use crate::supportflow::llm::{PlanRequest, SynthesisRequest, SynthesisResult};
use crate::supportflow::model::{
    AgentExecutionResult, AgentType, ChatMessage, ExecutionPlan, ExecutionStep, SpecialistContext,
    SpecialistFields, SpecialistInput, SpecialistOutput,
};
use crate::supportflow::runtime::{SupportRuntime, TicketHandle};
use crate::supportflow::specialist::execute_specialist;
use futures_util::future::join_all;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use uuid::Uuid;

pub type OrchestratorResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Everything the orchestrator needs for one customer message.
#[derive(Debug, Clone)]
pub struct OrchestratorInput {
    pub customer_message: String,
    /// Transcript lines at dispatch time, `[message_type] content` form.
    pub chat_history: Vec<String>,
    pub customer_profile: Map<String, Value>,
    pub customer_id: String,
    pub ticket_id: String,
    /// Workflow id of the owning conductor, the signal target.
    pub ticket_workflow_id: String,
    pub available_agents: Vec<AgentType>,
}

/// The orchestrator's verdict, returned to the conductor.
#[derive(Debug, Clone)]
pub struct OrchestratorOutput {
    pub final_response: String,
    pub confidence: f64,
    pub execution_plan: ExecutionPlan,
    pub agent_results: Vec<AgentExecutionResult>,
    pub requires_escalation: bool,
    pub requires_followup: bool,
    pub followup_plan: Option<ExecutionPlan>,
    pub synthesis_reasoning: String,
    pub information_sources: Vec<String>,
}

/// One completed step's contribution to the execution context.
#[derive(Debug, Clone)]
struct ContextSlot {
    agent: AgentType,
    response: String,
    tool_results: Map<String, Value>,
    additional_info: Option<SpecialistFields>,
}

/// Run one orchestration to completion.
///
/// Fails only when the owning conductor is gone; every model- or
/// specialist-level failure is absorbed into the output.
pub async fn run_orchestration(
    runtime: Arc<SupportRuntime>,
    input: OrchestratorInput,
) -> OrchestratorResult<OrchestratorOutput> {
    let workflow_id = format!("{}-orchestrator-{}", input.ticket_id, Uuid::new_v4());
    log::info!("orchestrator {} started for ticket {}", workflow_id, input.ticket_id);

    let parent = runtime
        .ticket(&input.ticket_workflow_id)
        .ok_or_else(|| format!("parent workflow {} not found", input.ticket_workflow_id))?;

    // Phase 1: planning.
    let plan = create_execution_plan(&runtime, &input).await;
    log::info!(
        "orchestrator created plan: {} with {} steps using {:?} strategy",
        plan.complexity_level,
        plan.steps.len(),
        plan.strategy
    );
    signal_plan(&parent, &input, &plan)?;

    // Phase 2: staged execution.
    let agent_results = execute_plan(&runtime, &parent, &input, &plan).await;
    log::info!("orchestrator completed {} agent executions", agent_results.len());

    // Phase 3: synthesis.
    let synthesis = synthesize(&runtime, &input, &plan, &agent_results).await;
    log::info!("orchestrator synthesis complete: confidence={:.2}", synthesis.confidence);
    signal_final_response(&parent, &input, &synthesis, &agent_results)?;

    Ok(OrchestratorOutput {
        final_response: synthesis.final_response,
        confidence: synthesis.confidence,
        execution_plan: plan,
        agent_results,
        requires_escalation: synthesis.requires_escalation,
        requires_followup: synthesis.requires_followup,
        followup_plan: synthesis.followup_plan,
        synthesis_reasoning: synthesis.synthesis_reasoning,
        information_sources: synthesis.information_sources,
    })
}

/// Plan with a bounded activity call, retrying a transient failure once and
/// falling back to the default plan rather than failing the turn.
async fn create_execution_plan(runtime: &Arc<SupportRuntime>, input: &OrchestratorInput) -> ExecutionPlan {
    let request = PlanRequest {
        customer_message: input.customer_message.clone(),
        chat_history: input.chat_history.clone(),
        customer_profile: input.customer_profile.clone(),
        available_agents: input.available_agents.clone(),
    };

    let raw = {
        let _slot = runtime.acquire_activity_permit().await;
        let timeout = runtime.config().llm_activity_timeout;
        match tokio::time::timeout(timeout, runtime.llm().plan(&request)).await {
            Ok(Ok(plan)) => Some(plan),
            Ok(Err(first_error)) => {
                log::warn!("planning failed, retrying once: {}", first_error);
                match tokio::time::timeout(timeout, runtime.llm().plan(&request)).await {
                    Ok(Ok(plan)) => Some(plan),
                    Ok(Err(e)) => {
                        log::error!("planning failed twice: {}", e);
                        None
                    }
                    Err(_) => None,
                }
            }
            Err(_) => {
                log::error!("planning timed out after {:?}", timeout);
                None
            }
        }
    };

    raw.unwrap_or_else(ExecutionPlan::default_plan)
        .normalized(&input.available_agents)
}

fn signal_plan(
    parent: &TicketHandle,
    input: &OrchestratorInput,
    plan: &ExecutionPlan,
) -> OrchestratorResult<()> {
    let summary = format!(
        "Orchestrator plan:\n- Complexity: {}\n- Strategy: {:?}\n- Agents: {}\n- Reasoning: {}",
        plan.complexity_level,
        plan.strategy,
        plan.agent_names().join(", "),
        plan.reasoning
    );
    let message = ChatMessage::system(&input.ticket_id, summary)
        .with_agent(AgentType::Orchestrator)
        .with_metadata(
            "execution_plan",
            json!({
                "steps": plan.steps.iter().map(|s| json!({
                    "step": s.step_number,
                    "agent": s.agent_type,
                    "reason": s.reason,
                    "depends_on": s.depends_on,
                })).collect::<Vec<_>>(),
                "strategy": plan.strategy,
                "complexity": plan.complexity_level,
                "estimated_duration": plan.estimated_duration_seconds,
            }),
        );
    parent.add_message(message)?;
    Ok(())
}

async fn execute_plan(
    runtime: &Arc<SupportRuntime>,
    parent: &TicketHandle,
    input: &OrchestratorInput,
    plan: &ExecutionPlan,
) -> Vec<AgentExecutionResult> {
    let stages = plan.stages();
    let mut agent_results: Vec<AgentExecutionResult> = Vec::new();
    let mut execution_context: HashMap<String, ContextSlot> = HashMap::new();

    log::info!("orchestrator executing {} stages", stages.len());

    for (stage_index, stage) in stages.iter().enumerate() {
        log::info!(
            "orchestrator executing stage {}/{} with {} agents: {:?}",
            stage_index + 1,
            stages.len(),
            stage.len(),
            stage.iter().map(|s| s.agent_type.as_str()).collect::<Vec<_>>()
        );

        let tasks: Vec<_> = stage
            .iter()
            .map(|step| {
                let runtime = runtime.clone();
                let parent = parent.clone();
                let input = input.clone();
                let plan = plan.clone();
                let step = step.clone();
                let referenced = collect_references(&step, &execution_context);
                tokio::spawn(async move {
                    let specialist_input =
                        build_specialist_input(&runtime, &input, &plan, &step, &referenced);
                    let result = execute_specialist(&runtime, &step, specialist_input).await;
                    stream_step_result(&parent, &input, &result);
                    result
                })
            })
            .collect();

        for joined in join_all(tasks).await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    // A panicked step is treated like any other failed step.
                    log::error!("stage task join error: {}", e);
                    continue;
                }
            };
            log::info!(
                "step {} ({}) completed: confidence={:.2}, time={}ms",
                result.step_number,
                result.agent_type,
                result.confidence,
                result.execution_time_ms
            );
            execution_context.insert(
                format!("step_{}", result.step_number),
                ContextSlot {
                    agent: result.agent_type,
                    response: result.response.clone(),
                    tool_results: result.tool_results.clone(),
                    additional_info: additional_info_of(&result),
                },
            );
            agent_results.push(result);
        }
    }

    agent_results.sort_by_key(|r| r.step_number);
    agent_results
}

/// Resolve a step's context references against completed stages.
fn collect_references(
    step: &ExecutionStep,
    execution_context: &HashMap<String, ContextSlot>,
) -> Vec<ContextSlot> {
    step.context_references
        .iter()
        .filter_map(|reference| {
            let slot = execution_context.get(reference);
            if slot.is_none() {
                log::warn!("context reference {} not found in execution context", reference);
            }
            slot.cloned()
        })
        .collect()
}

/// Compose the conversation context and wrap it in the agent-specific input
/// record.
///
/// The chat history comes from the conductor's live snapshot when it is
/// still reachable; this freshness is intentional, so answers to agent
/// questions raised earlier in the same orchestration reach later steps.
fn build_specialist_input(
    runtime: &Arc<SupportRuntime>,
    input: &OrchestratorInput,
    plan: &ExecutionPlan,
    step: &ExecutionStep,
    referenced: &[ContextSlot],
) -> SpecialistInput {
    let history = match runtime.ticket(&input.ticket_workflow_id) {
        Some(parent) => parent.state().transcript_lines(None),
        None => input.chat_history.clone(),
    };

    let mut parts: Vec<String> = Vec::new();
    if !history.is_empty() {
        parts.push("Previous conversation:".to_string());
        parts.extend(history);
        parts.push("\n---\n".to_string());
    }
    parts.push(format!("Current customer message: {}", input.customer_message));

    let downstream: Vec<&str> = plan
        .steps
        .iter()
        .filter(|other| other.depends_on.contains(&step.step_number))
        .map(|other| other.agent_type.as_str())
        .collect();
    if !downstream.is_empty() {
        parts.push(format!(
            "\nWORKFLOW CONTEXT: After you complete your task, these agents will handle next \
             steps: {}. Focus only on your specific responsibility; do not escalate or claim \
             inability if your task is achievable.",
            downstream.join(", ")
        ));
    }

    if !referenced.is_empty() {
        parts.push("\n--- Information from previous agents ---".to_string());
        for slot in referenced {
            parts.push(format!("\n[{} findings]:\n{}", slot.agent, slot.response));
            if let Some(info) = &slot.additional_info {
                for bullet in info.bullet_lines() {
                    parts.push(bullet);
                }
            }
            if !slot.tool_results.is_empty() {
                parts.push(format!("  • Tool Data: {}", json!(slot.tool_results)));
            }
        }
        parts.push("--- End of previous agent information ---\n".to_string());
    }

    let context = SpecialistContext {
        conversation_context: parts.join("\n"),
        customer_id: input.customer_id.clone(),
        customer_profile: input.customer_profile.clone(),
        ticket_id: input.ticket_id.clone(),
        ticket_workflow_id: input.ticket_workflow_id.clone(),
    };
    SpecialistInput::for_agent(step.agent_type, input.customer_message.clone(), context)
}

/// Recover the typed structured fields from a result's captured output.
fn additional_info_of(result: &AgentExecutionResult) -> Option<SpecialistFields> {
    result
        .metadata
        .get("full_specialist_output")
        .cloned()
        .and_then(|value| serde_json::from_value::<SpecialistOutput>(value).ok())
        .and_then(|output| output.populated_fields())
}

/// Stream one step's result to the conductor as an agent chat message.
fn stream_step_result(parent: &TicketHandle, input: &OrchestratorInput, result: &AgentExecutionResult) {
    let mut message = ChatMessage::from_agent(&input.ticket_id, result.agent_type, &result.response)
        .with_metadata("step_number", json!(result.step_number))
        .with_metadata("confidence", json!(result.confidence))
        .with_metadata("execution_time_ms", json!(result.execution_time_ms))
        .with_metadata("requires_escalation", json!(result.requires_escalation))
        .with_metadata("tool_results", json!(result.tool_results));
    if let Some(full) = result.metadata.get("full_specialist_output") {
        message = message.with_metadata("full_specialist_output", full.clone());
    }
    if let Some(info) = additional_info_of(result) {
        message = message.with_additional_info(info);
    }
    if let Err(e) = parent.add_message(message) {
        log::warn!("could not stream step {} result: {}", result.step_number, e);
    }
}

/// Synthesize with one retry; degrade to concatenation plus forced
/// escalation when the collaborator will not produce a verdict.
async fn synthesize(
    runtime: &Arc<SupportRuntime>,
    input: &OrchestratorInput,
    plan: &ExecutionPlan,
    agent_results: &[AgentExecutionResult],
) -> SynthesisResult {
    let request = SynthesisRequest {
        customer_message: input.customer_message.clone(),
        plan: plan.clone(),
        results: agent_results.to_vec(),
        conversation_context: input.chat_history.join("\n"),
    };

    let attempt = {
        let _slot = runtime.acquire_activity_permit().await;
        let timeout = runtime.config().llm_activity_timeout;
        match tokio::time::timeout(timeout, runtime.llm().synthesize(&request)).await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(first_error)) => {
                log::warn!("synthesis failed, retrying once: {}", first_error);
                match tokio::time::timeout(timeout, runtime.llm().synthesize(&request)).await {
                    Ok(Ok(result)) => Some(result),
                    Ok(Err(e)) => {
                        log::error!("synthesis failed twice: {}", e);
                        None
                    }
                    Err(_) => None,
                }
            }
            Err(_) => {
                log::error!("synthesis timed out after {:?}", timeout);
                None
            }
        }
    };

    attempt.unwrap_or_else(|| fallback_synthesis(agent_results))
}

fn fallback_synthesis(agent_results: &[AgentExecutionResult]) -> SynthesisResult {
    let combined = agent_results
        .iter()
        .map(|r| r.response.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    SynthesisResult {
        final_response: combined,
        confidence: 0.0,
        information_sources: agent_results.iter().map(|r| r.agent_type.to_string()).collect(),
        requires_escalation: true,
        requires_followup: false,
        followup_plan: None,
        synthesis_reasoning: "synthesis unavailable; specialist responses passed through verbatim"
            .to_string(),
    }
}

fn signal_final_response(
    parent: &TicketHandle,
    input: &OrchestratorInput,
    synthesis: &SynthesisResult,
    agent_results: &[AgentExecutionResult],
) -> OrchestratorResult<()> {
    let message = ChatMessage::from_agent(
        &input.ticket_id,
        AgentType::Orchestrator,
        &synthesis.final_response,
    )
    .with_metadata("orchestrator_synthesis", json!(true))
    .with_metadata("confidence", json!(synthesis.confidence))
    .with_metadata("synthesis_reasoning", json!(synthesis.synthesis_reasoning))
    .with_metadata(
        "agents_used",
        json!(agent_results.iter().map(|r| r.agent_type).collect::<Vec<_>>()),
    )
    .with_metadata(
        "total_execution_time_ms",
        json!(agent_results.iter().map(|r| r.execution_time_ms).sum::<u64>()),
    );
    parent.add_message(message)?;
    Ok(())
}
