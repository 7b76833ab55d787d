//! Tool abstraction layer.
//!
//! Specialists call domain tools (order search, refund eligibility,
//! measurement validation, ...) during reasoning. This module defines the
//! tool surface the engine exposes to the language-model collaborator:
//!
//! - [`Tool`]: a named, described, schema'd async callable
//! - [`ToolSet`]: the ordered collection handed to one reasoning call
//! - [`ToolProvider`]: maps an agent kind to its tool set; the bundled
//!   [`StaticToolProvider`] wraps the in-process tools and caches one set
//!   per agent kind per process, while remote tool servers can be plugged
//!   in behind the same trait
//!
//! Read-style tools must be idempotent; write-style tools must be safe to
//! re-invoke with the same arguments within one agent step.

use crate::supportflow::model::AgentType;
use crate::supportflow::store::SupportStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type ToolHandlerResult = Result<ToolResult, Box<dyn Error + Send + Sync>>;

/// Boxed async function backing a [`Tool`].
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = ToolHandlerResult> + Send>> + Send + Sync>;

/// Structured result of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Flatten into the `{success, data|error}` record tools report to the
    /// reasoning loop.
    pub fn to_value(&self) -> Value {
        if self.success {
            serde_json::json!({ "success": true, "data": self.output })
        } else {
            serde_json::json!({
                "success": false,
                "error": self.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// One declared input of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Identity, description, and input schema of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }
}

/// Errors surfaced by tool lookup and execution.
#[derive(Debug, Clone)]
pub enum ToolError {
    NotFound(String),
    ExecutionFailed(String),
    InvalidParameters(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
            ToolError::ExecutionFailed(msg) => write!(f, "Tool execution failed: {}", msg),
            ToolError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// A runtime tool instance: metadata plus its async handler.
#[derive(Clone)]
pub struct Tool {
    metadata: ToolMetadata,
    handler: ToolHandler,
}

impl Tool {
    /// Bind metadata to an already-boxed async handler.
    pub fn new(metadata: ToolMetadata, handler: ToolHandler) -> Self {
        Self { metadata, handler }
    }

    /// Build a tool from a synchronous function; most in-process tools are
    /// plain store lookups and use this.
    pub fn from_fn<F>(metadata: ToolMetadata, function: F) -> Self
    where
        F: Fn(Value) -> ToolHandlerResult + Send + Sync + 'static,
    {
        let function = Arc::new(function);
        Self {
            metadata,
            handler: Arc::new(move |params| {
                let function = function.clone();
                Box::pin(async move { function(params) })
            }),
        }
    }

    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub async fn invoke(&self, parameters: Value) -> ToolHandlerResult {
        (self.handler)(parameters).await
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool").field("name", &self.metadata.name).finish()
    }
}

/// The ordered tool collection handed to one specialist reasoning call.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<Tool>>,
}

impl ToolSet {
    pub fn new(tools: Vec<Arc<Tool>>) -> Self {
        Self { tools }
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn metadata(&self) -> Vec<&ToolMetadata> {
        self.tools.iter().map(|t| t.metadata()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// A new set with `extra` appended; used to graft the per-invocation
    /// user-interaction tools onto an agent's cached base set.
    pub fn merged(&self, extra: Vec<Arc<Tool>>) -> ToolSet {
        let mut tools = self.tools.clone();
        tools.extend(extra);
        ToolSet { tools }
    }

    /// Execute a named tool. Unknown names report a failure result rather
    /// than an error so the reasoning loop can recover in-band.
    pub async fn invoke(&self, name: &str, parameters: Value) -> ToolResult {
        match self.get(name) {
            Some(tool) => match tool.invoke(parameters).await {
                Ok(result) => result,
                Err(e) => ToolResult::failure(e.to_string()),
            },
            None => ToolResult::failure(ToolError::NotFound(name.to_string()).to_string()),
        }
    }
}

/// Maps an agent kind to the tools it may call.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn tools_for(&self, agent_type: AgentType) -> Result<ToolSet, Box<dyn Error + Send + Sync>>;
}

/// Provider backed by the bundled in-process tools, built over the store.
///
/// Tool sets are assembled lazily and cached per agent kind for the life of
/// the process.
pub struct StaticToolProvider {
    store: Arc<SupportStore>,
    cache: RwLock<HashMap<AgentType, ToolSet>>,
}

impl StaticToolProvider {
    pub fn new(store: Arc<SupportStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn build(&self, agent_type: AgentType) -> ToolSet {
        use crate::supportflow::tools;

        let store = &self.store;
        let tools = match agent_type {
            AgentType::OrderSpecialist => tools::order::order_tools(store),
            AgentType::TechnicalSpecialist => tools::technical::technical_tools(store),
            AgentType::RefundSpecialist => tools::refund::refund_tools(store),
            AgentType::GeneralSupport => tools::general::general_tools(store),
            AgentType::MaleSpecialist => tools::measurement::measurement_tools(store, "male"),
            AgentType::FemaleSpecialist => tools::measurement::measurement_tools(store, "female"),
            AgentType::Billing => tools::billing::billing_tools(store),
            AgentType::Delivery => tools::delivery::delivery_tools(store),
            AgentType::Alteration => tools::alteration::alteration_tools(store),
            _ => Vec::new(),
        };
        ToolSet::new(tools)
    }
}

#[async_trait]
impl ToolProvider for StaticToolProvider {
    async fn tools_for(&self, agent_type: AgentType) -> Result<ToolSet, Box<dyn Error + Send + Sync>> {
        {
            let cache = self.cache.read().await;
            if let Some(set) = cache.get(&agent_type) {
                return Ok(set.clone());
            }
        }
        let set = self.build(agent_type);
        self.cache.write().await.insert(agent_type, set.clone());
        Ok(set)
    }
}
