//! Registration handler
//!
//! Sends the account activation email. The email carries a signed link back
//! to the activation handler.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    domain::mail::{EmailAddress, Message, Payload},
    infrastructure::{
        email::templates::CONFIRMATION_EMAIL,
        http::{
            errors::{ApiError, ErrorResponse},
            state::AppState,
        },
    },
};

/// Registration request body
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterBody {
    /// The new user's email address
    #[schema(example = "email@example.com")]
    pub email: String,
}

/// Registration response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    /// What happened
    #[schema(example = "Confirmation email sent.")]
    pub message: String,
}

/// Builds the unsigned activation URL for `email`
pub fn activation_url(base_url: &str, email: &EmailAddress) -> String {
    format!(
        "{base_url}/api/v1/activate?email={}",
        urlencoding::encode(email.as_str())
    )
}

/// Register and send an activation email
#[utoipa::path(
    post,
    operation_id = "register",
    tag = "Auth",
    path = "/api/v1/register",
    request_body = RegisterBody,
    responses(
        (status = StatusCode::ACCEPTED, description = "Activation email queued", body = RegisterResponse),
        (status = StatusCode::UNPROCESSABLE_ENTITY, description = "Invalid email address", body = ErrorResponse),
        (status = StatusCode::SERVICE_UNAVAILABLE, description = "Shutting down", body = ErrorResponse),
    )
)]
pub async fn handler(
    State(state): State<AppState>,
    request: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let Json(request) = request?;
    let email = EmailAddress::new(&request.email)?;

    let link = state
        .tokens
        .sign(&activation_url(&state.config.base_url, &email));

    let message = Message::new(email, "Activate your account", Payload::Rendered(link))
        .with_from_name("Activate")
        .with_template(CONFIRMATION_EMAIL);

    state.mail.submit(message).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RegisterResponse {
            message: "Confirmation email sent.".to_string(),
        }),
    ))
}
