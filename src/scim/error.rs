//! SCIM 2.0 Error Types
//!
//! Error bodies per RFC 7644 Section 3.12, built from the engine errors so an
//! HTTP layer can map each failure to a status and `scimType` without
//! inspecting messages.

use http::StatusCode;
use serde::{Deserialize, Serialize};

use super::filter::FilterParseError;
use super::patch::PatchError;
use super::path::UnknownAttribute;
use super::schema::SCHEMA_ERROR;

/// SCIM error response per RFC 7644.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ScimErrorResponse {
    /// SCIM schema URIs (always contains the Error schema)
    pub schemas: Vec<String>,

    /// HTTP status code as a string (e.g., "400", "404")
    pub status: String,

    /// SCIM-specific error type (optional, per RFC 7644)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scim_type: Option<ScimErrorType>,

    /// Human-readable error detail
    pub detail: String,
}

impl ScimErrorResponse {
    fn new(
        status: StatusCode,
        scim_type: Option<ScimErrorType>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            schemas: vec![SCHEMA_ERROR.to_string()],
            status: status.as_u16().to_string(),
            scim_type,
            detail: detail.into(),
        }
    }

    fn bad_request_of(scim_type: ScimErrorType, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, Some(scim_type), detail)
    }

    /// Invalid filter syntax error (400)
    pub fn invalid_filter(detail: impl Into<String>) -> Self {
        Self::bad_request_of(ScimErrorType::InvalidFilter, detail)
    }

    /// Invalid request body (400)
    pub fn invalid_syntax(detail: impl Into<String>) -> Self {
        Self::bad_request_of(ScimErrorType::InvalidSyntax, detail)
    }

    /// Malformed or unresolvable PATCH path (400)
    pub fn invalid_path(detail: impl Into<String>) -> Self {
        Self::bad_request_of(ScimErrorType::InvalidPath, detail)
    }

    /// PATCH target missing or not matched (400)
    pub fn no_target(detail: impl Into<String>) -> Self {
        Self::bad_request_of(ScimErrorType::NoTarget, detail)
    }

    /// Attempt to modify immutable or read-only attribute (400)
    pub fn mutability(detail: impl Into<String>) -> Self {
        Self::bad_request_of(ScimErrorType::Mutability, detail)
    }

    /// Invalid attribute value (400)
    pub fn invalid_value(detail: impl Into<String>) -> Self {
        Self::bad_request_of(ScimErrorType::InvalidValue, detail)
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status.parse().unwrap_or(500))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<FilterParseError> for ScimErrorResponse {
    fn from(e: FilterParseError) -> Self {
        Self::invalid_filter(e.to_string())
    }
}

impl From<UnknownAttribute> for ScimErrorResponse {
    fn from(e: UnknownAttribute) -> Self {
        Self::invalid_filter(e.to_string())
    }
}

impl From<PatchError> for ScimErrorResponse {
    fn from(e: PatchError) -> Self {
        let detail = e.to_string();
        match e.root() {
            PatchError::InvalidSchema => Self::invalid_syntax(detail),
            PatchError::NoTarget(_) => Self::no_target(detail),
            PatchError::InvalidPath(_) | PatchError::UnknownAttribute(_) => {
                Self::invalid_path(detail)
            }
            PatchError::Mutability { .. } => Self::mutability(detail),
            PatchError::InvalidValue(_) => Self::invalid_value(detail),
            // root() never returns the wrapper
            PatchError::InvalidOperation { .. } => Self::invalid_syntax(detail),
        }
    }
}

/// SCIM error types per RFC 7644 Section 3.12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub enum ScimErrorType {
    /// Filter syntax is invalid, or names an unknown attribute
    InvalidFilter,

    /// Request body is not a valid PATCH request
    InvalidSyntax,

    /// PATCH path is malformed or names an unknown attribute
    InvalidPath,

    /// PATCH target missing or matched nothing
    NoTarget,

    /// Attempt to modify read-only or immutable attribute
    Mutability,

    /// Attribute value is invalid for its type
    InvalidValue,
}

impl std::fmt::Display for ScimErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScimErrorType::InvalidFilter => write!(f, "invalidFilter"),
            ScimErrorType::InvalidSyntax => write!(f, "invalidSyntax"),
            ScimErrorType::InvalidPath => write!(f, "invalidPath"),
            ScimErrorType::NoTarget => write!(f, "noTarget"),
            ScimErrorType::Mutability => write!(f, "mutability"),
            ScimErrorType::InvalidValue => write!(f, "invalidValue"),
        }
    }
}

/// Result type for SCIM operations
pub type ScimResult<T> = Result<T, ScimErrorResponse>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scim::filter::parse_filter;
    use crate::scim::schema::Mutability;

    #[test]
    fn test_scim_error_from_parse_error() {
        let err: ScimErrorResponse = parse_filter("userName eq").unwrap_err().into();

        assert_eq!(err.status, "400");
        assert_eq!(err.scim_type, Some(ScimErrorType::InvalidFilter));
        assert!(err.detail.contains("position"));

        let json = serde_json::to_string_pretty(&err).unwrap();
        assert!(json.contains("\"scimType\": \"invalidFilter\""));
        assert!(json.contains("\"status\": \"400\""));
        assert!(json.contains(SCHEMA_ERROR));
    }

    #[test]
    fn test_scim_error_from_patch_error() {
        let cases = [
            (PatchError::InvalidSchema, ScimErrorType::InvalidSyntax),
            (PatchError::NoTarget("x".into()), ScimErrorType::NoTarget),
            (PatchError::InvalidPath("x".into()), ScimErrorType::InvalidPath),
            (PatchError::UnknownAttribute("x".into()), ScimErrorType::InvalidPath),
            (PatchError::InvalidValue("x".into()), ScimErrorType::InvalidValue),
            (
                PatchError::Mutability {
                    attribute: "id".into(),
                    mutability: Mutability::ReadOnly,
                },
                ScimErrorType::Mutability,
            ),
        ];
        for (error, expected) in cases {
            let response = ScimErrorResponse::from(error);
            assert_eq!(response.scim_type, Some(expected));
            assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_scim_error_keeps_operation_index() {
        let err = PatchError::InvalidOperation {
            index: 2,
            error: Box::new(PatchError::NoTarget("emails".into())),
        };
        let response = ScimErrorResponse::from(err);

        assert_eq!(response.scim_type, Some(ScimErrorType::NoTarget));
        assert!(response.detail.contains("index 2"));
    }

    #[test]
    fn test_scim_error_from_unknown_attribute() {
        let response = ScimErrorResponse::from(UnknownAttribute {
            path: "favoriteColor".into(),
            message: "not declared".into(),
        });
        assert_eq!(response.scim_type, Some(ScimErrorType::InvalidFilter));
        assert!(response.detail.contains("favoriteColor"));
    }

    #[test]
    fn test_scim_error_status_code_fallback() {
        let mut err = ScimErrorResponse::no_target("x");
        err.status = "garbage".into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_scim_error_type_display() {
        assert_eq!(format!("{}", ScimErrorType::InvalidFilter), "invalidFilter");
        assert_eq!(format!("{}", ScimErrorType::InvalidPath), "invalidPath");
    }
}
