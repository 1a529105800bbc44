//! Utility modules: retry, timeout, chat analytics.

pub mod analytics;
pub mod retry;
pub mod timeout;
