//! API error responses.
//!
//! Clients get a generic message plus a stable code; provider and database
//! text stays in the trace.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::Error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{}", pipeline_message(.0))]
    Pipeline(Error),
}

/// Wire shape of an error, shared by JSON responses and SSE `error` events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: &'static str,
    pub step: Option<&'static str>,
}

fn pipeline_message(error: &Error) -> &'static str {
    match error.code() {
        "VALIDATION_REJECTED" => "The generated query was rejected by the query validator.",
        "UPSTREAM_LLM_FAILURE" => "The language model service did not return a usable response.",
        "QUERY_EXECUTION_FAILED" => "The knowledge graph query failed.",
        _ => "Internal server error.",
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(e) => match e {
                Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Error::Expansion(_) | Error::Generation(_) | Error::Summarization(_) => StatusCode::BAD_GATEWAY,
                Error::Execution(e) if e.source.kind() == "timeout" => StatusCode::GATEWAY_TIMEOUT,
                Error::Execution(_) => StatusCode::BAD_GATEWAY,
                Error::Config(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::BadRequest(msg) => ErrorBody { message: msg.clone(), code: "BAD_REQUEST", step: None },
            ApiError::Pipeline(e) => ErrorBody {
                message: pipeline_message(e).to_string(),
                code: e.code(),
                step: e.step().map(|s| s.as_str()),
            },
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Pipeline(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationError;

    #[test]
    fn test_validation_body_hides_detail() {
        let err = ApiError::from(Error::Validation(ValidationError::UnknownKeyword { keyword: "DELETE".into() }));
        let body = err.body();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.code, "VALIDATION_REJECTED");
        assert_eq!(body.step, Some("validate_cypher"));
        assert!(!body.message.contains("DELETE"));
    }

    #[test]
    fn test_bad_request_keeps_message() {
        let body = ApiError::BadRequest("question must not be blank".into()).body();
        assert_eq!(body.code, "BAD_REQUEST");
        assert_eq!(body.message, "question must not be blank");
    }
}
