//! PSK-based authentication and operator identity.
//!
//! Implements constant-time comparison to mitigate timing attacks.

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;

use crate::errors::{codes, AppError, AppErrorWithRevision, ErrorDetails, ErrorResponse};

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header naming the operator performing door actions.
pub const OPERATOR_HEADER: &str = "x-operator-id";

/// Header listing the operator's capabilities, comma separated.
pub const CAPABILITIES_HEADER: &str = "x-operator-capabilities";

/// Capability required to check attendees in or out.
pub const MANAGE_ATTENDEES: &str = "manage_attendees";

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // If no PSK is configured, allow all requests (dev mode)
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match provided {
        Some(provided_key) => {
            if constant_time_compare(&provided_key, &expected) {
                next.run(request).await
            } else {
                unauthorized_response("Invalid API key")
            }
        }
        None => {
            // Also check Authorization header as bearer token
            let bearer = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.to_string());

            match bearer {
                Some(bearer_key) if constant_time_compare(&bearer_key, &expected) => {
                    next.run(request).await
                }
                _ => unauthorized_response("Missing or invalid API key"),
            }
        }
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Create an unauthorized response.
fn unauthorized_response(message: &str) -> Response {
    let body = ErrorResponse {
        success: false,
        error: ErrorDetails {
            code: codes::UNAUTHORIZED.to_string(),
            message: message.to_string(),
            details: None,
        },
        revision_id: 0,
    };

    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// The staff member driving a check-in desk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub id: String,
    pub capabilities: Vec<String>,
}

impl Operator {
    pub fn new(id: impl Into<String>, capabilities: &[&str]) -> Self {
        Self {
            id: id.into(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn can(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Fail with a permission error unless the operator holds `capability`.
    pub fn require(&self, capability: &str) -> Result<(), AppError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Operator {} is not allowed to {}",
                self.id,
                capability.replace('_', " ")
            )))
        }
    }
}

impl<S> FromRequestParts<S> for Operator
where
    S: Send + Sync,
{
    type Rejection = AppErrorWithRevision;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_value = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let Some(id) = header_value(OPERATOR_HEADER) else {
            return Err(AppErrorWithRevision {
                error: AppError::Unauthorized(format!("Missing {} header", OPERATOR_HEADER)),
                revision_id: 0,
            });
        };

        let capabilities = header_value(CAPABILITIES_HEADER)
            .map(|raw| parse_capabilities(&raw))
            .unwrap_or_default();

        Ok(Operator { id, capabilities })
    }
}

fn parse_capabilities(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}
