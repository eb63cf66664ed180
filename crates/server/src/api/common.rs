//! Error mapping and shared query types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use vigil_core::filter::{ListFilter, SortDirection};
use vigil_core::{ErrorKind, VigilError};
use vigil_store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Error kind plus a sanitized message, rendered as JSON.
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: ErrorKind::InvalidInput,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.kind,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<VigilError> for ApiError {
    fn from(err: VigilError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Transient | ErrorKind::Provider | ErrorKind::Fatal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            kind,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        VigilError::from(err).into()
    }
}

/// Query parameters shared by all list endpoints. `equals`-style
/// constraints are entity-specific and handled per handler.
#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub search: Option<String>,
    /// Comma-separated tag list; records must carry all of them.
    pub tags: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    /// Base filter; handlers add their exact-match fields on top.
    pub fn into_filter(self) -> ListFilter {
        ListFilter {
            equals: Default::default(),
            created_after: self.created_after,
            created_before: self.created_before,
            tags: self
                .tags
                .map(|t| {
                    t.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            search: self.search,
            sort_by: self.sort_by,
            sort_direction: match self.order.as_deref() {
                Some("asc") => SortDirection::Asc,
                _ => SortDirection::Desc,
            },
            limit: self.limit,
            offset: self.offset,
        }
    }
}
