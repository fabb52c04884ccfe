//! RFC 9457 Problem Details. Every 4xx/5xx the API produces goes through
//! this type, serialized as `application/problem+json`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_uri: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    pub fn new(type_uri: impl Into<String>, status: StatusCode) -> Self {
        Self {
            type_uri: type_uri.into(),
            title: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
            status: status.as_u16(),
            detail: None,
            instance: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new("https://copyflow.dev/errors/not-found", StatusCode::NOT_FOUND)
            .with_detail(detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new("https://copyflow.dev/errors/conflict", StatusCode::CONFLICT).with_detail(detail)
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(
            "https://copyflow.dev/errors/validation",
            StatusCode::BAD_REQUEST,
        )
        .with_detail(detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            "https://copyflow.dev/errors/internal",
            StatusCode::INTERNAL_SERVER_ERROR,
        )
        .with_detail(detail)
    }
}

impl From<StoreError> for ProblemDetails {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::not_found(format!("{} not found", what)),
            StoreError::Conflict(detail) => Self::conflict(detail),
            StoreError::Backend(_) | StoreError::Encoding(_) => Self::internal(err.to_string()),
        }
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self)).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
