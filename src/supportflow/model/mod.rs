//! Domain model: tickets and transcripts, execution plans, specialist I/O,
//! and agent-to-customer question records.

pub mod interaction;
pub mod plan;
pub mod specialist;
pub mod ticket;

pub use interaction::{
    timeout_marker, ExpectedAnswer, QuestionRecord, QuestionStatus, QuestionStatusSnapshot,
};
pub use plan::{AgentExecutionResult, AgentType, ExecutionPlan, ExecutionStep, ExecutionStrategy};
pub use specialist::{SpecialistContext, SpecialistFields, SpecialistInput, SpecialistOutput};
pub use ticket::{
    ChatMessage, EscalationReason, IntentType, MessageType, Ticket, TicketStart, TicketStatus,
    UrgencyLevel,
};
