//! GraphQL response types.

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// GraphQLResponse
// ============================================================================

/// A GraphQL execution result.
///
/// # Format
///
/// ```json
/// {
///   "data": { ... },
///   "errors": [{ "message": "...", "path": ["field"] }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    /// Result data (absent when execution failed before it started).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Errors raised during execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,

    /// Protocol extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQLResponse {
    /// Returns `true` if the server reported any error.
    #[inline]
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Deserializes `data` into `T`.
    ///
    /// # Errors
    ///
    /// - [`Error::GraphQL`] if the response carries errors
    /// - [`Error::Json`] if `data` does not match `T`
    pub fn data<T: DeserializeOwned>(self) -> Result<T> {
        if self.has_errors() {
            return Err(Error::graphql(self.errors));
        }
        Ok(serde_json::from_value(self.data.unwrap_or(Value::Null))?)
    }
}

// ============================================================================
// GraphQLError
// ============================================================================

/// A single GraphQL error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Human-readable message.
    pub message: String,

    /// Source locations the error refers to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// Response path of the failing field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,

    /// Server-specific details such as `code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQLError {
    /// Creates an error with only a message.
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Returns `extensions.code`, if present.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(Value::as_str)
    }
}

/// Line/column position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

// ============================================================================
// Tests
// ============================================================================
