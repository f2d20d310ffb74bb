//! Account activation handler

use axum::{
    extract::{rejection::QueryRejection, OriginalUri, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    domain::mail::EmailAddress,
    infrastructure::http::{
        errors::{ApiError, ErrorResponse},
        state::AppState,
    },
};

/// Activation link parameters
#[derive(Debug, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivateParams {
    /// The address being activated
    pub email: String,

    /// The link's signature
    pub hash: String,
}

/// Activation response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivatedResponse {
    /// The activated address
    #[schema(example = "email@example.com")]
    pub email: String,

    /// Whether the account was activated
    pub activated: bool,
}

/// Activate an account from a signed link
#[utoipa::path(
    get,
    operation_id = "activate",
    tag = "Auth",
    path = "/api/v1/activate",
    params(ActivateParams),
    responses(
        (status = StatusCode::OK, description = "Account activated", body = ActivatedResponse),
        (status = StatusCode::UNPROCESSABLE_ENTITY, description = "Invalid token", body = ErrorResponse),
    )
)]
pub async fn handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    params: Result<Query<ActivateParams>, QueryRejection>,
) -> Result<Json<ActivatedResponse>, ApiError> {
    let path_and_query = uri
        .path_and_query()
        .map(|path_and_query| path_and_query.as_str())
        .unwrap_or_default();

    let candidate = format!("{}{}", state.config.base_url, path_and_query);

    if !state.tokens.verify(&candidate) {
        return Err(ApiError::new_422("Invalid token"));
    }

    let Ok(Query(params)) = params else {
        return Err(ApiError::new_422("Invalid token"));
    };

    let email = EmailAddress::new(&params.email)?;

    info!(%email, "account activated");

    Ok(Json(ActivatedResponse {
        email: email.into(),
        activated: true,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use testresult::TestResult;

    use crate::infrastructure::http::{
        handlers::v1::register::activation_url, router, state::tests::test_state,
    };

    use super::*;

    fn split_link(link: &str) -> (&str, &str) {
        let path_and_query = link.trim_start_matches("https://example.com");

        path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""))
    }

    #[tokio::test]
    async fn test_activate_with_signed_link() -> TestResult {
        let (state, _inbox) = test_state();

        let link = state.tokens.sign(&activation_url(
            "https://example.com",
            &EmailAddress::new("a@example.com")?,
        ));
        let (path, query) = split_link(&link);

        let response = TestServer::new(router(state))?
            .get(path)
            .add_raw_query_param(query)
            .await;

        response.assert_status_ok();

        let json = response.json::<ActivatedResponse>();

        assert_eq!(json.email, "a@example.com");
        assert!(json.activated);

        Ok(())
    }

    #[tokio::test]
    async fn test_activate_with_tampered_email() -> TestResult {
        let (state, _inbox) = test_state();

        let link = state.tokens.sign(&activation_url(
            "https://example.com",
            &EmailAddress::new("a@example.com")?,
        ));
        let forged = link.replace("a%40example.com", "b%40example.com");
        let (path, query) = split_link(&forged);

        let response = TestServer::new(router(state))?
            .get(path)
            .add_raw_query_param(query)
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<ErrorResponse>().error, "Invalid token");

        Ok(())
    }

    #[tokio::test]
    async fn test_activate_without_signature() -> TestResult {
        let (state, _inbox) = test_state();

        let response = TestServer::new(router(state))?
            .get("/api/v1/activate")
            .add_raw_query_param("email=a%40example.com")
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        Ok(())
    }
}
