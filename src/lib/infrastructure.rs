//! Adapters: SMTP, templates, HTTP and process signals

pub mod email;
pub mod http;
pub mod signal;
