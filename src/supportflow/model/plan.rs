//! Execution planning data model.
//!
//! An [`ExecutionPlan`] is the unit of work the orchestrator derives from one
//! customer message: an ordered list of [`ExecutionStep`]s forming a directed
//! acyclic graph over specialist agents, plus the strategy the planner chose.
//! Plans are immutable once created; [`ExecutionPlan::normalized`] repairs the
//! common planner mistakes (unknown agents, missing context references) at the
//! boundary so downstream code can rely on a well-formed structure, and
//! [`ExecutionPlan::stages`] groups steps into dependency levels for staged
//! execution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Every agent kind known to the system.
///
/// The wire representation is the snake_case name (`"order_specialist"`,
/// `"male_specialist"`, ...). Only the variants for which
/// [`AgentType::is_plannable`] returns `true` may appear in an execution plan;
/// the planner validation rewrites anything else to
/// [`AgentType::GeneralSupport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    IntentClassifier,
    Orchestrator,
    OrderSpecialist,
    TechnicalSpecialist,
    RefundSpecialist,
    GeneralSupport,
    EscalationManager,
    HumanAgent,
    MaleSpecialist,
    FemaleSpecialist,
    Billing,
    Delivery,
    Alteration,
}

impl AgentType {
    /// The snake_case wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::IntentClassifier => "intent_classifier",
            AgentType::Orchestrator => "orchestrator",
            AgentType::OrderSpecialist => "order_specialist",
            AgentType::TechnicalSpecialist => "technical_specialist",
            AgentType::RefundSpecialist => "refund_specialist",
            AgentType::GeneralSupport => "general_support",
            AgentType::EscalationManager => "escalation_manager",
            AgentType::HumanAgent => "human_agent",
            AgentType::MaleSpecialist => "male_specialist",
            AgentType::FemaleSpecialist => "female_specialist",
            AgentType::Billing => "billing",
            AgentType::Delivery => "delivery",
            AgentType::Alteration => "alteration",
        }
    }

    /// The set of agents a planner may dispatch to.
    pub fn available_agents() -> Vec<AgentType> {
        vec![
            AgentType::OrderSpecialist,
            AgentType::TechnicalSpecialist,
            AgentType::RefundSpecialist,
            AgentType::GeneralSupport,
            AgentType::EscalationManager,
            AgentType::MaleSpecialist,
            AgentType::FemaleSpecialist,
            AgentType::Billing,
            AgentType::Delivery,
            AgentType::Alteration,
        ]
    }

    /// Whether this agent kind may appear as a plan step.
    pub fn is_plannable(&self) -> bool {
        !matches!(
            self,
            AgentType::IntentClassifier | AgentType::Orchestrator | AgentType::HumanAgent
        )
    }

    /// Whether specialists of this kind receive the user-interaction tools
    /// (`ask_user_question` and friends) when their tool set is assembled.
    pub fn may_ask_user(&self) -> bool {
        self.is_plannable() && *self != AgentType::EscalationManager
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the planner intends the steps to be coordinated.
///
/// The strategy is descriptive; actual scheduling always follows the
/// dependency stages computed by [`ExecutionPlan::stages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
    Conditional,
    Hybrid,
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        ExecutionStrategy::Sequential
    }
}

/// One node in a plan DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// 1-based position, unique within the plan.
    pub step_number: u32,
    /// Which specialist runs this step.
    pub agent_type: AgentType,
    /// Natural-language justification from the planner.
    #[serde(default)]
    pub reason: String,
    /// Step numbers that must complete before this step may run.
    #[serde(default)]
    pub depends_on: Vec<u32>,
    /// Keys of prior-step outputs to inject into this step's context,
    /// in the form `step_<n>`.
    #[serde(default)]
    pub context_references: Vec<String>,
    /// Ordering hint inside a stage; lower runs first.
    #[serde(default)]
    pub priority: i32,
}

impl ExecutionStep {
    /// Build a step with no dependencies. Use the `with_*` builders to add them.
    pub fn new(step_number: u32, agent_type: AgentType, reason: impl Into<String>) -> Self {
        Self {
            step_number,
            agent_type,
            reason: reason.into(),
            depends_on: Vec::new(),
            context_references: Vec::new(),
            priority: 0,
        }
    }

    /// Declare the earlier steps this one depends on.
    pub fn with_depends_on(mut self, depends_on: Vec<u32>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Override the in-stage priority (lower runs first).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// The context key other steps use to reference this step's output.
    pub fn context_key(&self) -> String {
        format!("step_{}", self.step_number)
    }
}

/// A validated, immutable plan for one customer message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub steps: Vec<ExecutionStep>,
    #[serde(default)]
    pub strategy: ExecutionStrategy,
    #[serde(default)]
    pub complexity_level: String,
    #[serde(default)]
    pub estimated_duration_seconds: u32,
    #[serde(default)]
    pub reasoning: String,
}

impl ExecutionPlan {
    /// Build a plan from raw steps.
    pub fn new(steps: Vec<ExecutionStep>, strategy: ExecutionStrategy) -> Self {
        Self {
            steps,
            strategy,
            complexity_level: String::new(),
            estimated_duration_seconds: 0,
            reasoning: String::new(),
        }
    }

    /// The plan used when the planner returns nothing usable: a single
    /// general-support step.
    pub fn default_plan() -> Self {
        Self {
            steps: vec![ExecutionStep::new(
                1,
                AgentType::GeneralSupport,
                "Default handling for the customer message",
            )],
            strategy: ExecutionStrategy::Sequential,
            complexity_level: "simple".to_string(),
            estimated_duration_seconds: 30,
            reasoning: "Planner produced no steps; falling back to general support".to_string(),
        }
    }

    /// Repair planner output into a well-formed plan.
    ///
    /// Applied fixes, in order:
    /// - an empty step list becomes [`ExecutionPlan::default_plan`];
    /// - agent types outside `available` are rewritten to general support;
    /// - self- and forward-dependencies are dropped;
    /// - every `depends_on` entry gains its `step_<n>` context reference if
    ///   the planner omitted it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use supportflow::model::{AgentType, ExecutionPlan, ExecutionStep, ExecutionStrategy};
    ///
    /// let plan = ExecutionPlan::new(
    ///     vec![
    ///         ExecutionStep::new(1, AgentType::OrderSpecialist, "look up the order"),
    ///         ExecutionStep::new(2, AgentType::RefundSpecialist, "assess the refund")
    ///             .with_depends_on(vec![1]),
    ///     ],
    ///     ExecutionStrategy::Sequential,
    /// )
    /// .normalized(&AgentType::available_agents());
    ///
    /// assert_eq!(plan.steps[1].context_references, vec!["step_1".to_string()]);
    /// ```
    pub fn normalized(mut self, available: &[AgentType]) -> Self {
        if self.steps.is_empty() {
            return Self::default_plan();
        }

        for step in &mut self.steps {
            if !available.contains(&step.agent_type) || !step.agent_type.is_plannable() {
                log::warn!(
                    "plan step {} names unavailable agent {}; rewriting to general_support",
                    step.step_number,
                    step.agent_type
                );
                step.agent_type = AgentType::GeneralSupport;
            }

            let step_number = step.step_number;
            step.depends_on.retain(|dep| *dep < step_number && *dep > 0);

            for dep in &step.depends_on {
                let key = format!("step_{}", dep);
                if !step.context_references.contains(&key) {
                    step.context_references.push(key);
                }
            }
        }

        self
    }

    /// Agent names in step order, for log lines and plan summaries.
    pub fn agent_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.agent_type.as_str()).collect()
    }

    /// Group steps into dependency stages.
    ///
    /// Stage 1 holds every step with no dependencies; stage k+1 holds the
    /// steps whose dependencies all landed in stages 1..k. Steps inside a
    /// stage are sorted ascending by priority and may run concurrently.
    ///
    /// If a pass completes without freeing any step while some remain, the
    /// dependency graph is cyclic (or references missing steps); the
    /// leftovers are returned as one final best-effort stage and a warning is
    /// logged, so every step is always scheduled exactly once.
    ///
    /// # Example
    ///
    /// ```rust
    /// use supportflow::model::{AgentType, ExecutionPlan, ExecutionStep, ExecutionStrategy};
    ///
    /// // 1: [], 2: [1], 3: [1], 4: [2, 3]  =>  [[1], [2, 3], [4]]
    /// let plan = ExecutionPlan::new(
    ///     vec![
    ///         ExecutionStep::new(1, AgentType::OrderSpecialist, ""),
    ///         ExecutionStep::new(2, AgentType::TechnicalSpecialist, "").with_depends_on(vec![1]),
    ///         ExecutionStep::new(3, AgentType::GeneralSupport, "").with_depends_on(vec![1]),
    ///         ExecutionStep::new(4, AgentType::RefundSpecialist, "").with_depends_on(vec![2, 3]),
    ///     ],
    ///     ExecutionStrategy::Hybrid,
    /// );
    ///
    /// let stages = plan.stages();
    /// assert_eq!(stages.len(), 3);
    /// assert_eq!(stages[1].len(), 2);
    /// ```
    pub fn stages(&self) -> Vec<Vec<ExecutionStep>> {
        let mut stages: Vec<Vec<ExecutionStep>> = Vec::new();
        let mut remaining: Vec<ExecutionStep> = self.steps.clone();
        let mut completed: HashSet<u32> = HashSet::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<ExecutionStep>, Vec<ExecutionStep>) = remaining
                .into_iter()
                .partition(|step| step.depends_on.iter().all(|dep| completed.contains(dep)));

            if ready.is_empty() {
                log::warn!(
                    "dependency cycle detected; running remaining steps {:?} as a final stage",
                    blocked.iter().map(|s| s.step_number).collect::<Vec<_>>()
                );
                let mut last = blocked;
                last.sort_by_key(|s| s.priority);
                stages.push(last);
                break;
            }

            for step in &ready {
                completed.insert(step.step_number);
            }
            let mut stage = ready;
            stage.sort_by_key(|s| s.priority);
            stages.push(stage);
            remaining = blocked;
        }

        stages
    }
}

/// Per-step output captured after a specialist finishes (or fails).
///
/// Produced exactly once per step. Transient within one orchestration run;
/// the interesting parts are copied into chat-message metadata for
/// durability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionResult {
    pub step_number: u32,
    pub agent_type: AgentType,
    /// Free-text response for the customer-facing transcript.
    pub response: String,
    /// Specialist self-assessment in `[0, 1]`.
    pub confidence: f64,
    pub requires_escalation: bool,
    pub execution_time_ms: u64,
    /// Raw tool outputs keyed by tool name.
    #[serde(default)]
    pub tool_results: Map<String, Value>,
    /// Carries `full_specialist_output`, the step reason, dependency list,
    /// and (on failure) an `error` note.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32, deps: Vec<u32>) -> ExecutionStep {
        ExecutionStep::new(n, AgentType::GeneralSupport, "").with_depends_on(deps)
    }

    #[test]
    fn empty_plan_normalizes_to_default() {
        let plan =
            ExecutionPlan::new(Vec::new(), ExecutionStrategy::Parallel).normalized(&AgentType::available_agents());
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].agent_type, AgentType::GeneralSupport);
    }

    #[test]
    fn unknown_agent_rewritten_to_general_support() {
        let plan = ExecutionPlan::new(
            vec![ExecutionStep::new(1, AgentType::HumanAgent, "hand off")],
            ExecutionStrategy::Sequential,
        )
        .normalized(&AgentType::available_agents());
        assert_eq!(plan.steps[0].agent_type, AgentType::GeneralSupport);
    }

    #[test]
    fn context_references_autofilled_from_dependencies() {
        let plan = ExecutionPlan::new(
            vec![step(1, vec![]), step(2, vec![1]), step(3, vec![1, 2])],
            ExecutionStrategy::Sequential,
        )
        .normalized(&AgentType::available_agents());

        assert!(plan.steps[1].context_references.contains(&"step_1".to_string()));
        assert!(plan.steps[2].context_references.contains(&"step_1".to_string()));
        assert!(plan.steps[2].context_references.contains(&"step_2".to_string()));
    }

    #[test]
    fn forward_and_self_dependencies_dropped() {
        let plan = ExecutionPlan::new(
            vec![step(1, vec![1, 2]), step(2, vec![1])],
            ExecutionStrategy::Sequential,
        )
        .normalized(&AgentType::available_agents());
        assert!(plan.steps[0].depends_on.is_empty());
        // Steps already well-formed keep the invariant: deps appear as refs.
        for s in &plan.steps {
            for dep in &s.depends_on {
                assert!(s.context_references.contains(&format!("step_{}", dep)));
            }
        }
    }

    #[test]
    fn stage_grouping_follows_dependency_levels() {
        let plan = ExecutionPlan::new(
            vec![step(1, vec![]), step(2, vec![1]), step(3, vec![1]), step(4, vec![2, 3])],
            ExecutionStrategy::Hybrid,
        );
        let stages = plan.stages();
        let numbers: Vec<Vec<u32>> = stages
            .iter()
            .map(|stage| stage.iter().map(|s| s.step_number).collect())
            .collect();
        assert_eq!(numbers, vec![vec![1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn every_step_scheduled_exactly_once() {
        let plan = ExecutionPlan::new(
            vec![step(1, vec![]), step(2, vec![1]), step(3, vec![2]), step(4, vec![1])],
            ExecutionStrategy::Hybrid,
        );
        let mut seen: Vec<u32> = plan
            .stages()
            .into_iter()
            .flatten()
            .map(|s| s.step_number)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn cycle_runs_as_final_best_effort_stage() {
        // 2 and 3 depend on each other; 1 is free.
        let plan = ExecutionPlan::new(
            vec![step(1, vec![]), step(2, vec![3]), step(3, vec![2])],
            ExecutionStrategy::Sequential,
        );
        let stages = plan.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0][0].step_number, 1);
        let mut last: Vec<u32> = stages[1].iter().map(|s| s.step_number).collect();
        last.sort_unstable();
        assert_eq!(last, vec![2, 3]);
    }

    #[test]
    fn priority_orders_steps_within_a_stage() {
        let plan = ExecutionPlan::new(
            vec![
                ExecutionStep::new(1, AgentType::GeneralSupport, "").with_priority(5),
                ExecutionStep::new(2, AgentType::OrderSpecialist, "").with_priority(1),
            ],
            ExecutionStrategy::Parallel,
        );
        let stages = plan.stages();
        assert_eq!(stages[0][0].step_number, 2);
        assert_eq!(stages[0][1].step_number, 1);
    }

    #[test]
    fn agent_type_wire_names_round_trip() {
        for agent in AgentType::available_agents() {
            let json = serde_json::to_string(&agent).unwrap();
            assert_eq!(json, format!("\"{}\"", agent.as_str()));
            let back: AgentType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, agent);
        }
    }
}
