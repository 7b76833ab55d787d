//! Specialist agent execution.
//!
//! One plan step becomes one specialist child run: a single reasoning
//! activity bounded by the start-to-close timeout and the process activity
//! limit. Whatever happens inside, the caller always gets an
//! [`AgentExecutionResult`] back; failures and timeouts surface as a
//! zero-confidence escalating result with an `error` note so the rest of
//! the stage keeps going.

use crate::supportflow::model::{AgentExecutionResult, ExecutionStep, SpecialistInput, SpecialistOutput};
use crate::supportflow::question::InteractionHandle;
use crate::supportflow::runtime::SupportRuntime;
use crate::supportflow::tool::ToolSet;
use crate::supportflow::tools::interaction::interaction_tools;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

/// Child workflow id for one step: `<ticket_id>-<agent_type>-step<n>`.
pub fn specialist_workflow_id(ticket_id: &str, step: &ExecutionStep) -> String {
    format!("{}-{}-step{}", ticket_id, step.agent_type, step.step_number)
}

/// Run the specialist for one step to completion.
///
/// The reasoning call runs at-most-once against the model, except that a
/// fast transient model error is retried a single time; a start-to-close
/// timeout is never retried.
pub async fn execute_specialist(
    runtime: &Arc<SupportRuntime>,
    step: &ExecutionStep,
    input: SpecialistInput,
) -> AgentExecutionResult {
    let agent_type = step.agent_type;
    let ticket_id = input.context().ticket_id.clone();
    let workflow_id = specialist_workflow_id(&ticket_id, step);
    let started = Instant::now();

    let _workflow_slot = runtime.acquire_workflow_permit().await;
    log::info!("executing {} (step {}): {}", workflow_id, step.step_number, step.reason);

    let tools = assemble_tools(runtime, step, &input).await;

    let outcome = {
        let _activity_slot = runtime.acquire_activity_permit().await;
        let timeout = runtime.config().specialist_timeout;
        match tokio::time::timeout(timeout, runtime.llm().reason(agent_type, &input, &tools)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(first_error)) => {
                log::warn!("{} reasoning failed, retrying once: {}", workflow_id, first_error);
                match tokio::time::timeout(timeout, runtime.llm().reason(agent_type, &input, &tools))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(format!("specialist timed out after {:?}", timeout).into()),
                }
            }
            Err(_) => Err(format!("specialist timed out after {:?}", timeout).into()),
        }
    };

    let execution_time_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(output) => success_result(step, output, execution_time_ms),
        Err(e) => {
            log::error!("step {} ({}) failed: {}", step.step_number, agent_type, e);
            failure_result(step, &e.to_string(), execution_time_ms)
        }
    }
}

/// The agent's cached base tools, plus the per-invocation interaction pair
/// for agents allowed to ask the customer questions.
async fn assemble_tools(
    runtime: &Arc<SupportRuntime>,
    step: &ExecutionStep,
    input: &SpecialistInput,
) -> ToolSet {
    let agent_type = step.agent_type;
    let base = match runtime.tools().tools_for(agent_type).await {
        Ok(set) => set,
        Err(e) => {
            log::warn!("tool discovery failed for {}: {}", agent_type, e);
            ToolSet::default()
        }
    };
    let context = input.context();
    if agent_type.may_ask_user() && !context.ticket_workflow_id.is_empty() {
        let handle = InteractionHandle::new(
            runtime.clone(),
            context.ticket_workflow_id.clone(),
            context.ticket_id.clone(),
            agent_type,
        );
        base.merged(interaction_tools(handle))
    } else {
        base
    }
}

fn success_result(step: &ExecutionStep, output: SpecialistOutput, execution_time_ms: u64) -> AgentExecutionResult {
    let full_output = serde_json::to_value(&output).unwrap_or(Value::Null);
    let mut metadata = Map::new();
    metadata.insert("reason".to_string(), json!(step.reason));
    metadata.insert("dependencies".to_string(), json!(step.depends_on));
    metadata.insert("llm_history".to_string(), json!(output.llm_log));
    metadata.insert("full_specialist_output".to_string(), full_output);

    AgentExecutionResult {
        step_number: step.step_number,
        agent_type: step.agent_type,
        response: output.response,
        confidence: output.confidence.clamp(0.0, 1.0),
        requires_escalation: output.requires_escalation,
        execution_time_ms,
        tool_results: output.tool_results,
        metadata,
    }
}

fn failure_result(step: &ExecutionStep, error: &str, execution_time_ms: u64) -> AgentExecutionResult {
    let mut metadata = Map::new();
    metadata.insert("reason".to_string(), json!(step.reason));
    metadata.insert("dependencies".to_string(), json!(step.depends_on));
    metadata.insert("error".to_string(), json!(error));

    AgentExecutionResult {
        step_number: step.step_number,
        agent_type: step.agent_type,
        response: format!("Agent execution failed: {}", error),
        confidence: 0.0,
        requires_escalation: true,
        execution_time_ms,
        tool_results: Map::new(),
        metadata,
    }
}
