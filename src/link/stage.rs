//! Pipeline stages.
//!
//! A stage sees every operation on its way out ([`Stage::prepare`]) and every
//! result on its way back ([`Stage::observe`]).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::protocol::{GraphQLError, GraphQLResponse, Operation};

// ============================================================================
// Stage
// ============================================================================

/// One step of the link pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name shown in logs and by [`Pipeline::stage_names`](super::Pipeline::stage_names).
    fn name(&self) -> &str;

    /// Adjusts the operation before it reaches the transport.
    ///
    /// An error aborts the operation.
    async fn prepare(&self, _operation: &mut Operation) -> Result<()> {
        Ok(())
    }

    /// Inspects a result. For subscriptions, called once per item.
    fn observe(&self, _operation: &Operation, _result: &Result<GraphQLResponse>) {}
}

// ============================================================================
// ErrorStage
// ============================================================================

/// What went wrong with one result.
#[derive(Debug)]
pub struct ErrorContext<'a> {
    /// The operation that produced the result.
    pub operation: &'a Operation,
    /// Errors reported by the server, if any.
    pub graphql_errors: &'a [GraphQLError],
    /// Transport failure, if any.
    pub network_error: Option<&'a Error>,
}

/// Callback of the error stage.
pub type ErrorHandler = Arc<dyn Fn(&ErrorContext<'_>) + Send + Sync>;

/// Calls a handler for every failed result.
///
/// GraphQL errors come from the response body or from a server-rejected
/// subscription. Everything else is reported as a network error.
#[derive(Clone)]
pub struct ErrorStage {
    handler: ErrorHandler,
}

impl ErrorStage {
    /// Creates the stage.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ErrorContext<'_>) + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for ErrorStage {
    fn name(&self) -> &str {
        "error"
    }

    fn observe(&self, operation: &Operation, result: &Result<GraphQLResponse>) {
        let context = match result {
            Ok(response) if response.has_errors() => ErrorContext {
                operation,
                graphql_errors: &response.errors,
                network_error: None,
            },
            Ok(_) => return,
            Err(Error::GraphQL { errors }) => ErrorContext {
                operation,
                graphql_errors: errors,
                network_error: None,
            },
            Err(error) => ErrorContext {
                operation,
                graphql_errors: &[],
                network_error: Some(error),
            },
        };
        (self.handler)(&context);
    }
}

// ============================================================================
// FnStage
// ============================================================================

/// Stage built from a closure over the outgoing operation.
///
/// # Example
///
/// ```ignore
/// use graphql_link::link::FnStage;
///
/// let stage = FnStage::new("tracing-id", |operation| {
///     operation.context_headers.push(("x-request-id".into(), "42".into()));
///     Ok(())
/// });
/// ```
pub struct FnStage<F> {
    name: String,
    prepare: F,
}

impl<F> FnStage<F>
where
    F: Fn(&mut Operation) -> Result<()> + Send + Sync,
{
    /// Creates a named stage.
    pub fn new(name: impl Into<String>, prepare: F) -> Self {
        Self {
            name: name.into(),
            prepare,
        }
    }
}

impl<F> fmt::Debug for FnStage<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&mut Operation) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn prepare(&self, operation: &mut Operation) -> Result<()> {
        (self.prepare)(operation)
    }
}

// ============================================================================
// Tests
// ============================================================================
