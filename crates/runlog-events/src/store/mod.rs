//! The [`EventStore`] façade: pool ownership, transactions and the public
//! boundary operations.

mod event_store;

pub use event_store::*;
