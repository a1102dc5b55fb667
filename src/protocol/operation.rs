//! GraphQL operation type.
//!
//! An [`Operation`] pairs the wire body sent to the server with the parsed
//! [`Document`] used for routing and a set of per-operation context headers.
//!
//! The document text is only reachable through [`Operation::query`] and
//! [`Operation::replace_query`], so the parsed document always describes the
//! text that is sent.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

use super::document::{Document, OperationKind};

// ============================================================================
// Operation
// ============================================================================

/// A GraphQL operation ready to be sent.
///
/// # Format
///
/// ```json
/// {
///   "query": "query GetApp($id: uuid!) { app(id: $id) { name } }",
///   "variables": { "id": "..." },
///   "operationName": "GetApp"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    query: String,

    /// Variable values.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,

    /// Operation to execute when the document holds several.
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    /// Protocol extensions.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,

    /// Headers merged into this operation's request, below auth headers.
    #[serde(skip)]
    pub context_headers: Vec<(String, String)>,

    #[serde(skip)]
    document: Document,
}

impl Operation {
    /// Parses `query` into a new operation.
    ///
    /// The operation name defaults to the main operation's name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDocument`](crate::Error::InvalidDocument) if
    /// the document cannot be scanned.
    pub fn parse(query: impl Into<String>) -> Result<Self> {
        let query = query.into();
        let document = Document::parse(&query)?;
        let operation_name = document.operation_name().map(str::to_string);

        Ok(Self {
            query,
            variables: Map::new(),
            operation_name,
            extensions: Map::new(),
            context_headers: Vec::new(),
            document,
        })
    }

    /// Sets a single variable.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Replaces all variables.
    ///
    /// Non-object values are ignored.
    #[must_use]
    pub fn variables(mut self, variables: Value) -> Self {
        if let Value::Object(map) = variables {
            self.variables = map;
        }
        self
    }

    /// Overrides the operation name.
    #[inline]
    #[must_use]
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Adds a context header for this operation only.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.context_headers.push((name.into(), value.into()));
        self
    }

    /// Returns the document source.
    #[inline]
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Replaces the document source and re-parses it.
    ///
    /// The operation name follows the new document. On error the operation
    /// is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDocument`](crate::Error::InvalidDocument) if
    /// the new document cannot be scanned.
    pub fn replace_query(&mut self, query: impl Into<String>) -> Result<()> {
        let query = query.into();
        let document = Document::parse(&query)?;

        self.operation_name = document.operation_name().map(str::to_string);
        self.query = query;
        self.document = document;
        Ok(())
    }

    /// Returns the parsed document.
    #[inline]
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Returns the main operation kind, or `None` for fragment-only documents.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<OperationKind> {
        self.document.operation_kind()
    }

    /// Returns a short label for logs.
    #[must_use]
    pub fn label(&self) -> &str {
        self.operation_name.as_deref().unwrap_or("<anonymous>")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_takes_operation_name_from_document() {
        let op = Operation::parse("query GetWorkspaces { workspaces { id } }").expect("parse");
        assert_eq!(op.operation_name.as_deref(), Some("GetWorkspaces"));
        assert_eq!(op.kind(), Some(OperationKind::Query));
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let op = Operation::parse("{ apps { id } }").expect("parse");
        let json = serde_json::to_value(&op).expect("serialize");
        assert_eq!(json, json!({ "query": "{ apps { id } }" }));
    }

    #[test]
    fn test_serialization_with_variables() {
        let op = Operation::parse("mutation InsertRole($role: String!) { insertRole(role: $role) { role } }")
            .expect("parse")
            .variable("role", "editor")
            .header("x-hasura-role", "admin");

        let json = serde_json::to_value(&op).expect("serialize");
        assert_eq!(json["operationName"], "InsertRole");
        assert_eq!(json["variables"], json!({ "role": "editor" }));
        assert!(json.get("context_headers").is_none());
        assert_eq!(op.context_headers.len(), 1);
    }

    #[test]
    fn test_variables_ignores_non_objects() {
        let op = Operation::parse("{ a }")
            .expect("parse")
            .variable("x", 1)
            .variables(json!([1, 2]));
        assert_eq!(op.variables.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_replace_query_reparses_document() {
        let mut op = Operation::parse("query Apps { apps { id } }").expect("parse");

        op.replace_query("subscription Watch { apps { id } }")
            .expect("replace");
        assert_eq!(op.query(), "subscription Watch { apps { id } }");
        assert_eq!(op.kind(), Some(OperationKind::Subscription));
        assert_eq!(op.operation_name.as_deref(), Some("Watch"));
        assert!(op.document().is_subscription());
    }

    #[test]
    fn test_failed_replace_keeps_operation() {
        let mut op = Operation::parse("query Apps { apps { id } }").expect("parse");

        assert!(op.replace_query("type Broken { id: ID }").is_err());
        assert_eq!(op.query(), "query Apps { apps { id } }");
        assert_eq!(op.kind(), Some(OperationKind::Query));
        assert_eq!(op.operation_name.as_deref(), Some("Apps"));
    }

    #[test]
    fn test_label_for_anonymous() {
        let op = Operation::parse("{ a }").expect("parse");
        assert_eq!(op.label(), "<anonymous>");
    }
}
