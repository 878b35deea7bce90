//! Conversational AI client (Dify chat app).
//!
//! One blocking query per inbound message; the relay keeps no conversation
//! state of its own.

mod dify;

pub use dify::{DifyClient, DifyError, DEFAULT_DIFY_BASE_URL, DEFAULT_DIFY_USER};
