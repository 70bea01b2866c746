/// Contract calls carrying batch and message data.
pub mod calls;

/// Inbox contract events.
pub mod logs;
