//! Durable multi-agent customer-support engine.
//!
//! ```text
//! customer message
//!   └─ TicketConductor (one task per ticket, owns the Ticket)
//!        └─ Orchestrator (one per message: plan -> stages -> synthesis)
//!             ├─ Specialist step (child task, one reasoning activity + tools)
//!             │    └─ Question workflow (optional: ask the customer, wait)
//!             └─ streamed chat messages back to the conductor
//! AutoCloseSweeper (periodic: closes idle open tickets)
//! ```

pub mod conductor;
pub mod config;
pub mod llm;
pub mod maintenance;
pub mod model;
pub mod orchestrator;
pub mod question;
pub mod runtime;
pub mod specialist;
pub mod store;
pub mod tool;
pub mod tools;
