//! Messaging platform clients.

mod line;

pub use line::{LineClient, Notifier};
