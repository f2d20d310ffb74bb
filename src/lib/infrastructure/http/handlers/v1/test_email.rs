//! Test email handler

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    domain::mail::{EmailAddress, Message},
    infrastructure::http::{
        errors::{ApiError, ErrorResponse},
        state::AppState,
    },
};

/// Test email request body
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TestEmailBody {
    /// Where to send the test email
    #[schema(example = "me@here.com")]
    pub to: String,
}

/// Test email response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TestEmailResponse {
    /// Id of the queued message
    pub id: uuid::Uuid,
}

/// Queue a plain text test email
#[utoipa::path(
    post,
    operation_id = "test_email",
    tag = "System",
    path = "/api/v1/test-email",
    request_body = TestEmailBody,
    responses(
        (status = StatusCode::ACCEPTED, description = "Test email queued", body = TestEmailResponse),
        (status = StatusCode::UNPROCESSABLE_ENTITY, description = "Invalid email address", body = ErrorResponse),
    )
)]
pub async fn handler(
    State(state): State<AppState>,
    request: Result<Json<TestEmailBody>, JsonRejection>,
) -> Result<(StatusCode, Json<TestEmailResponse>), ApiError> {
    let Json(request) = request?;

    let message = Message::new(EmailAddress::new(&request.to)?, "test email", "Hello world");
    let id = message.id;

    state.mail.submit(message).await?;

    Ok((StatusCode::ACCEPTED, Json(TestEmailResponse { id })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use testresult::TestResult;

    use crate::{
        domain::mail::Payload,
        infrastructure::http::{router, state::tests::test_state},
    };

    use super::TestEmailResponse;

    #[tokio::test]
    async fn test_test_email_is_queued_as_plain_text() -> TestResult {
        let (state, mut inbox) = test_state();

        let response = TestServer::new(router(state))?
            .post("/api/v1/test-email")
            .json(&json!({ "to": "me@here.com" }))
            .await;

        response.assert_status(StatusCode::ACCEPTED);

        let message = inbox.try_recv()?;

        assert_eq!(response.json::<TestEmailResponse>().id, message.id);
        assert_eq!(message.to.as_str(), "me@here.com");
        assert_eq!(message.data, Payload::PlainText("Hello world".to_string()));
        assert!(message.template.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_test_email_with_malformed_body() -> TestResult {
        let (state, _inbox) = test_state();

        let response = TestServer::new(router(state))?
            .post("/api/v1/test-email")
            .json(&json!({ "recipient": "me@here.com" }))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        Ok(())
    }
}
