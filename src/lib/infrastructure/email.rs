//! Email infrastructure

pub mod smtp;
pub mod templates;
