//! Shared request and response shapes.
//!
//! Every successful response is a JSON object with a `message` plus one or
//! more named payload keys; lists add a `pagination` block.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scholar_core::db::{PaginatedResult, Pagination};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiResult;

/// Success envelope builder.
#[derive(Debug)]
pub struct Reply {
    status: StatusCode,
    body: Map<String, Value>,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::OK, message)
    }

    pub fn created(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CREATED, message)
    }

    fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("message".to_string(), Value::String(message.into()));
        Self { status, body }
    }

    /// Adds a payload under `key`.
    pub fn with<T: Serialize>(mut self, key: &str, value: &T) -> ApiResult<Self> {
        self.body
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Adds a page of items under `key` and its `pagination` block.
    pub fn page<T: Serialize>(self, key: &str, page: &PaginatedResult<T>) -> ApiResult<Self> {
        self.with(key, &page.items)?
            .with("pagination", &page.page_info())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(Value::Object(self.body))).into_response()
    }
}

/// Query parameters accepted by every list endpoint.
///
/// `page` and `limit` are kept as text so a non-numeric value falls back to
/// the default instead of rejecting the request.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    /// Narrows a super admin's view to one school.
    pub school_id: Option<Uuid>,
    pub search: Option<String>,
}

impl ListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::from_query(self.page.as_deref(), self.limit.as_deref())
    }

    /// Like [`ListQuery::pagination`] with an endpoint-specific default limit.
    pub fn pagination_or(&self, default_limit: u32) -> Pagination {
        Pagination::from_query_with_default(
            self.page.as_deref(),
            self.limit.as_deref(),
            default_limit,
        )
    }

    pub fn search(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// `?schoolId=` on single-resource and snapshot endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ScopeQuery {
    pub school_id: Option<Uuid>,
}

/// Plain `{message}` body, documented for OpenAPI.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
