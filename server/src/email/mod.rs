pub mod client;
pub mod message;
pub mod sanitize;

pub use client::{GraphMailbox, MailboxError, MailboxGateway, MessagePage, TagOutcome};
pub use message::Message;
