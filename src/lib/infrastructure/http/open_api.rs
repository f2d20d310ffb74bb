//! OpenAPI module

use utoipa::OpenApi;

use crate::infrastructure::http::{errors::ErrorResponse, handlers::v1::*};

/// The API's OpenAPI document
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "Signup Mailer"),
    paths(
        register::handler,
        activate::handler,
        test_email::handler,
        uptime::handler
    ),
    components(schemas(
        register::RegisterBody,
        register::RegisterResponse,
        activate::ActivatedResponse,
        test_email::TestEmailBody,
        test_email::TestEmailResponse,
        uptime::UptimeResponse,
        ErrorResponse,
    ))
)]
pub struct ApiDocs;
