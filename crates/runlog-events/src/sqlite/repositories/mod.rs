//! Repository implementations for `SQLite` database operations.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`,
//! so they compose freely inside one caller-owned transaction.

pub mod event;
pub mod session;
pub mod step;
pub mod tool_call;

pub use event::EventRepo;
pub use session::SessionRepo;
pub use step::StepRepo;
pub use tool_call::ToolCallRepo;
