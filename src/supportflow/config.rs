//! Runtime configuration.
//!
//! A plain struct users construct directly or load from the environment with
//! [`SupportConfig::from_env`]. No config-file parsing dependencies are
//! introduced.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Global configuration for a support runtime instance.
#[derive(Debug, Clone)]
pub struct SupportConfig {
    /// How long a ticket may sit idle in the `open` state before the
    /// maintenance sweep closes it. Env: `AUTO_CLOSE_INACTIVITY_MINUTES`.
    pub auto_close_inactivity_minutes: u64,
    /// The system message appended when a ticket is auto-closed.
    /// Env: `AUTO_CLOSE_MESSAGE`.
    pub auto_close_message: String,
    /// Cadence of the periodic auto-close sweep.
    /// Env: `AUTO_CLOSE_INTERVAL_SECONDS`.
    pub auto_close_interval: Duration,
    /// Model identifier forwarded to the injected language-model
    /// collaborator. Env: `SUPPORT_LLM_MODEL`.
    pub model_name: String,
    /// Upper bound on concurrently executing activities (reasoning calls,
    /// planning, synthesis) across all tickets.
    /// Env: `MAX_CONCURRENT_ACTIVITIES`.
    pub max_concurrent_activities: usize,
    /// Upper bound on concurrently executing child workflow tasks.
    /// Env: `MAX_CONCURRENT_WORKFLOW_TASKS`.
    pub max_concurrent_workflow_tasks: usize,
    /// Default wait applied when an agent question does not specify its own
    /// timeout. Env: `QUESTION_TIMEOUT_SECONDS`.
    pub question_timeout_seconds: u64,
    /// Per-specialist start-to-close bound.
    pub specialist_timeout: Duration,
    /// Start-to-close bound for planning and synthesis calls.
    pub llm_activity_timeout: Duration,
    /// Directory for the store's JSON persistence; `None` keeps everything
    /// in memory. Env: `SUPPORT_DATA_DIR`.
    pub data_dir: Option<PathBuf>,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            auto_close_inactivity_minutes: 60,
            auto_close_message: "This ticket is now closed due to inactivity".to_string(),
            auto_close_interval: Duration::from_secs(120),
            model_name: "gemini-2.5-flash".to_string(),
            max_concurrent_activities: 50,
            max_concurrent_workflow_tasks: 100,
            question_timeout_seconds: 300,
            specialist_timeout: Duration::from_secs(300),
            llm_activity_timeout: Duration::from_secs(120),
            data_dir: None,
        }
    }
}

impl SupportConfig {
    /// Build a config from the process environment, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(minutes) = env_parse("AUTO_CLOSE_INACTIVITY_MINUTES") {
            config.auto_close_inactivity_minutes = minutes;
        }
        if let Ok(message) = env::var("AUTO_CLOSE_MESSAGE") {
            config.auto_close_message = message;
        }
        if let Some(seconds) = env_parse("AUTO_CLOSE_INTERVAL_SECONDS") {
            config.auto_close_interval = Duration::from_secs(seconds);
        }
        if let Ok(model) = env::var("SUPPORT_LLM_MODEL") {
            config.model_name = model;
        }
        if let Some(n) = env_parse("MAX_CONCURRENT_ACTIVITIES") {
            config.max_concurrent_activities = n;
        }
        if let Some(n) = env_parse("MAX_CONCURRENT_WORKFLOW_TASKS") {
            config.max_concurrent_workflow_tasks = n;
        }
        if let Some(seconds) = env_parse("QUESTION_TIMEOUT_SECONDS") {
            config.question_timeout_seconds = seconds;
        }
        if let Ok(dir) = env::var("SUPPORT_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SupportConfig::default();
        assert_eq!(config.auto_close_inactivity_minutes, 60);
        assert_eq!(config.question_timeout_seconds, 300);
        assert_eq!(config.max_concurrent_activities, 50);
        assert_eq!(config.max_concurrent_workflow_tasks, 100);
        assert_eq!(config.specialist_timeout, Duration::from_secs(300));
        assert_eq!(config.llm_activity_timeout, Duration::from_secs(120));
    }
}
