//! Parent chain contract bindings and the inbox event schema.

pub mod abi;

mod event;
pub use event::{InboxEvent, InboxEventKind};

mod schema;
pub use schema::{EventDecodeError, EventSchema, SchemaError};
