// src/lib.rs

pub mod supportflow;

// Modules, re-exported at the crate root for shorter paths.
pub use supportflow::{
    conductor, config, llm, maintenance, model, orchestrator, question, runtime, specialist,
    store, tool, tools,
};

// Re-exporting key items for easier external access.
pub use supportflow::conductor::start_ticket;
pub use supportflow::config::SupportConfig;
pub use supportflow::llm::{ScriptedLlm, SupportLlm};
pub use supportflow::maintenance::AutoCloseSweeper;
pub use supportflow::runtime::{SupportRuntime, TicketHandle, TicketSignal};
pub use supportflow::store::SupportStore;
pub use supportflow::tool::{StaticToolProvider, ToolProvider};
