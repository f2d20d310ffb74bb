//! Domain logic: signed activation tokens, outbound mail and process lifecycle

pub mod lifecycle;
pub mod mail;
pub mod tokens;
