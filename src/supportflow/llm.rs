//! Language-model collaborator seam.
//!
//! The engine never talks to a model vendor directly; it calls the three
//! operations of [`SupportLlm`] and treats them as opaque:
//!
//! - `plan`: turn a customer message plus conversation context into an
//!   execution plan over the available agents
//! - `synthesize`: fold the per-step results into one customer reply
//! - `reason`: run one specialist turn with its tool set
//!
//! Implementations are injected at runtime construction, never looked up
//! from process globals. [`ScriptedLlm`] is the deterministic double used by
//! the integration tests and by consumers who need a hermetic backend; it
//! replays queued plans, syntheses, and specialist turns, and can execute
//! scripted tool invocations so the tool plumbing is exercised end to end.

use crate::supportflow::model::{
    AgentExecutionResult, AgentType, ExecutionPlan, SpecialistInput, SpecialistOutput,
};
use crate::supportflow::tool::ToolSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub type LlmResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Transient model failure; the activity layer retries these once.
#[derive(Debug, Clone)]
pub struct LlmError(pub String);

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "llm error: {}", self.0)
    }
}

impl Error for LlmError {}

/// Everything the planner sees for one customer message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub customer_message: String,
    /// Transcript lines in `[message_type] content` form.
    pub chat_history: Vec<String>,
    #[serde(default)]
    pub customer_profile: Map<String, Value>,
    pub available_agents: Vec<AgentType>,
}

/// Everything the synthesizer sees after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub customer_message: String,
    pub plan: ExecutionPlan,
    pub results: Vec<AgentExecutionResult>,
    pub conversation_context: String,
}

/// The synthesizer's verdict for one orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    /// The single unified customer reply.
    pub final_response: String,
    pub confidence: f64,
    /// Which agents contributed what; diagnostic only.
    #[serde(default)]
    pub information_sources: Vec<String>,
    pub requires_escalation: bool,
    #[serde(default)]
    pub requires_followup: bool,
    /// Advisory; logged and surfaced but never executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_plan: Option<ExecutionPlan>,
    #[serde(default)]
    pub synthesis_reasoning: String,
}

impl SynthesisResult {
    /// A plain non-escalating reply.
    pub fn reply(final_response: impl Into<String>, confidence: f64) -> Self {
        Self {
            final_response: final_response.into(),
            confidence,
            information_sources: Vec::new(),
            requires_escalation: false,
            requires_followup: false,
            followup_plan: None,
            synthesis_reasoning: String::new(),
        }
    }

    /// Flag the reply as needing human follow-through (builder pattern).
    pub fn escalating(mut self) -> Self {
        self.requires_escalation = true;
        self
    }
}

/// The opaque model collaborator.
#[async_trait]
pub trait SupportLlm: Send + Sync {
    /// Plan the specialist DAG for one customer message.
    async fn plan(&self, request: &PlanRequest) -> LlmResult<ExecutionPlan>;

    /// Fold specialist results into one reply.
    async fn synthesize(&self, request: &SynthesisRequest) -> LlmResult<SynthesisResult>;

    /// Run one specialist reasoning turn with its tools.
    async fn reason(
        &self,
        agent_type: AgentType,
        input: &SpecialistInput,
        tools: &ToolSet,
    ) -> LlmResult<SpecialistOutput>;
}

/// One pre-scripted specialist turn for [`ScriptedLlm`].
///
/// `tool_calls` are executed against the live tool set before the output is
/// returned; each result is recorded in the output's `tool_results` under
/// the tool name, so a scripted turn still proves the tool wiring.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    pub tool_calls: Vec<(String, Value)>,
    pub output: Option<SpecialistOutput>,
}

impl ScriptedTurn {
    pub fn replying(output: SpecialistOutput) -> Self {
        Self {
            tool_calls: Vec::new(),
            output: Some(output),
        }
    }

    /// Queue a tool invocation to run before the reply (builder pattern).
    pub fn calling(mut self, tool: impl Into<String>, args: Value) -> Self {
        self.tool_calls.push((tool.into(), args));
        self
    }
}

/// Deterministic, programmable model double.
///
/// Queued artifacts are consumed front to back; when a queue runs dry the
/// double degrades to predictable defaults (single-step plan, echo
/// specialist reply, concatenating synthesis) so partially scripted tests
/// still complete.
///
/// # Example
///
/// ```rust
/// use supportflow::llm::{ScriptedLlm, ScriptedTurn};
/// use supportflow::model::{AgentType, SpecialistOutput};
///
/// let llm = ScriptedLlm::new();
/// llm.push_turn(
///     AgentType::GeneralSupport,
///     ScriptedTurn::replying(SpecialistOutput::text("We are open 9am-6pm EST.", 0.95)),
/// );
/// ```
#[derive(Default)]
pub struct ScriptedLlm {
    plans: Mutex<VecDeque<ExecutionPlan>>,
    syntheses: Mutex<VecDeque<SynthesisResult>>,
    turns: Mutex<HashMap<AgentType, VecDeque<ScriptedTurn>>>,
    fail_syntheses: AtomicUsize,
    fail_reasons: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_plan(&self, plan: ExecutionPlan) {
        self.locked(&self.plans).push_back(plan);
    }

    pub fn push_synthesis(&self, synthesis: SynthesisResult) {
        self.locked(&self.syntheses).push_back(synthesis);
    }

    pub fn push_turn(&self, agent_type: AgentType, turn: ScriptedTurn) {
        self.locked(&self.turns).entry(agent_type).or_default().push_back(turn);
    }

    /// Make the next `n` synthesize calls fail with a transient error.
    pub fn fail_next_syntheses(&self, n: usize) {
        self.fail_syntheses.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` reason calls fail with a transient error.
    pub fn fail_next_reasons(&self, n: usize) {
        self.fail_reasons.store(n, Ordering::SeqCst);
    }

    fn locked<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SupportLlm for ScriptedLlm {
    async fn plan(&self, request: &PlanRequest) -> LlmResult<ExecutionPlan> {
        match self.locked(&self.plans).pop_front() {
            Some(plan) => Ok(plan),
            None => {
                log::debug!(
                    "no scripted plan for '{}'; using default",
                    request.customer_message
                );
                Ok(ExecutionPlan::default_plan())
            }
        }
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> LlmResult<SynthesisResult> {
        if Self::take_failure(&self.fail_syntheses) {
            return Err(Box::new(LlmError("scripted synthesis failure".to_string())));
        }
        match self.locked(&self.syntheses).pop_front() {
            Some(result) => Ok(result),
            None => {
                let combined = request
                    .results
                    .iter()
                    .map(|r| r.response.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(SynthesisResult::reply(combined, 0.8))
            }
        }
    }

    async fn reason(
        &self,
        agent_type: AgentType,
        input: &SpecialistInput,
        tools: &ToolSet,
    ) -> LlmResult<SpecialistOutput> {
        if Self::take_failure(&self.fail_reasons) {
            return Err(Box::new(LlmError("scripted reasoning failure".to_string())));
        }
        let turn = self
            .locked(&self.turns)
            .get_mut(&agent_type)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();

        let mut output = turn.output.unwrap_or_else(|| {
            SpecialistOutput::text(format!("{} handled: {}", agent_type, input.message()), 0.7)
        });
        for (tool, args) in turn.tool_calls {
            let result = tools.invoke(&tool, args).await;
            output.tool_results.insert(tool, result.to_value());
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supportflow::model::{ExecutionStep, ExecutionStrategy, SpecialistContext};
    use crate::supportflow::tool::{Tool, ToolMetadata, ToolResult};
    use std::sync::Arc;

    #[tokio::test]
    async fn scripted_plan_replays_in_order() {
        let llm = ScriptedLlm::new();
        llm.push_plan(ExecutionPlan::new(
            vec![ExecutionStep::new(1, AgentType::Billing, "bill")],
            ExecutionStrategy::Sequential,
        ));
        let request = PlanRequest {
            customer_message: "buy".to_string(),
            chat_history: Vec::new(),
            customer_profile: Map::new(),
            available_agents: AgentType::available_agents(),
        };
        let plan = llm.plan(&request).await.unwrap();
        assert_eq!(plan.steps[0].agent_type, AgentType::Billing);
        // Queue drained; the default single-step plan takes over.
        let plan = llm.plan(&request).await.unwrap();
        assert_eq!(plan.steps[0].agent_type, AgentType::GeneralSupport);
    }

    #[tokio::test]
    async fn scripted_turn_executes_tool_calls() {
        let llm = ScriptedLlm::new();
        llm.push_turn(
            AgentType::GeneralSupport,
            ScriptedTurn::replying(SpecialistOutput::text("done", 0.9))
                .calling("probe", serde_json::json!({"x": 1})),
        );
        let tools = ToolSet::new(vec![Arc::new(Tool::from_fn(
            ToolMetadata::new("probe", "echo"),
            |params| Ok(ToolResult::success(params)),
        ))]);
        let input = SpecialistInput::for_agent(
            AgentType::GeneralSupport,
            "hello",
            SpecialistContext::default(),
        );
        let output = llm.reason(AgentType::GeneralSupport, &input, &tools).await.unwrap();
        assert_eq!(output.tool_results["probe"]["data"]["x"], 1);
    }

    #[tokio::test]
    async fn synthesis_failure_injection_is_consumed() {
        let llm = ScriptedLlm::new();
        llm.fail_next_syntheses(1);
        let request = SynthesisRequest {
            customer_message: "q".to_string(),
            plan: ExecutionPlan::default_plan(),
            results: Vec::new(),
            conversation_context: String::new(),
        };
        assert!(llm.synthesize(&request).await.is_err());
        assert!(llm.synthesize(&request).await.is_ok());
    }
}
