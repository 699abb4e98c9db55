//! Uniform response envelopes.
//!
//! Every endpoint answers with `{success, data?, error?, details?}`. The
//! functions here only build values; nothing is logged or sent.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use routekit_core::{PaginationMeta, compute_meta};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<Value>>,
}

/// Data of a paginated envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedData<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

/// An envelope together with the status it is sent with.
#[derive(Debug, Clone, PartialEq)]
pub struct Shaped<T> {
    pub status: StatusCode,
    pub body: Envelope<T>,
}

impl<T: Serialize> IntoResponse for Shaped<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn success<T>(data: T) -> Shaped<T> {
    success_with(data, StatusCode::OK)
}

pub fn success_with<T>(data: T, status: StatusCode) -> Shaped<T> {
    Shaped {
        status,
        body: Envelope {
            success: true,
            data: Some(data),
            error: None,
            details: None,
        },
    }
}

pub fn created<T>(data: T) -> Shaped<T> {
    success_with(data, StatusCode::CREATED)
}

/// Error envelope. Accepts a plain message or any error value.
pub fn error(message: impl core::fmt::Display, status: StatusCode) -> Shaped<()> {
    Shaped {
        status,
        body: Envelope {
            success: false,
            data: None,
            error: Some(message.to_string()),
            details: None,
        },
    }
}

pub fn error_with_details(message: impl core::fmt::Display, details: Vec<Value>, status: StatusCode) -> Shaped<()> {
    let mut shaped = error(message, status);
    shaped.body.details = Some(details);
    shaped
}

pub fn bad_request(message: impl core::fmt::Display) -> Shaped<()> {
    error(message, StatusCode::BAD_REQUEST)
}

pub fn paginated<T>(items: Vec<T>, total: u64, page: u64, limit: u64) -> Shaped<PaginatedData<T>> {
    success(PaginatedData {
        items,
        pagination: compute_meta(total, page, limit),
    })
}

pub fn not_found(resource: &str) -> Shaped<()> {
    error(format!("{resource} not found"), StatusCode::NOT_FOUND)
}

pub fn unauthorized() -> Shaped<()> {
    error("Unauthorized", StatusCode::UNAUTHORIZED)
}

pub fn forbidden() -> Shaped<()> {
    error("Forbidden", StatusCode::FORBIDDEN)
}

pub fn conflict(message: impl core::fmt::Display) -> Shaped<()> {
    error(message, StatusCode::CONFLICT)
}

pub fn server_error(message: impl core::fmt::Display) -> Shaped<()> {
    error(message, StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn not_found_is_exact() {
        let shaped = not_found("User");
        assert_eq!(shaped.status, StatusCode::NOT_FOUND);
        assert_eq!(
            serde_json::to_value(&shaped.body).unwrap(),
            json!({"success": false, "error": "User not found"})
        );
    }

    #[test]
    fn success_omits_error_fields() {
        let shaped = success(json!({"id": 1}));
        assert_eq!(shaped.status, StatusCode::OK);
        assert_eq!(
            serde_json::to_value(&shaped.body).unwrap(),
            json!({"success": true, "data": {"id": 1}})
        );
    }

    #[test]
    fn created_uses_201() {
        assert_eq!(created(1).status, StatusCode::CREATED);
    }

    #[test]
    fn error_accepts_error_values() {
        let err = std::io::Error::other("disk on fire");
        let shaped = error(&err, StatusCode::BAD_REQUEST);
        assert_eq!(shaped.body.error.as_deref(), Some("disk on fire"));
    }

    #[test]
    fn convenience_statuses() {
        assert_eq!(unauthorized().status, StatusCode::UNAUTHORIZED);
        assert_eq!(forbidden().status, StatusCode::FORBIDDEN);
        assert_eq!(conflict("taken").status, StatusCode::CONFLICT);
        assert_eq!(server_error("boom").status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(bad_request("nope").status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn details_are_carried() {
        let shaped = error_with_details(
            "Validation failed",
            vec![json!({"path": "name", "message": "Required"})],
            StatusCode::BAD_REQUEST,
        );
        let v = serde_json::to_value(&shaped.body).unwrap();
        assert_eq!(v["details"][0]["path"], "name");
    }

    #[test]
    fn paginated_nests_metadata() {
        let shaped = paginated(vec![6, 7, 8, 9, 10], 12, 2, 5);
        let v = serde_json::to_value(&shaped.body).unwrap();
        assert_eq!(v["data"]["items"], json!([6, 7, 8, 9, 10]));
        assert_eq!(v["data"]["pagination"]["totalPages"], 3);
        assert_eq!(v["data"]["pagination"]["hasPrev"], true);
    }
}
