//! Link pipeline.
//!
//! ```text
//! operation ──▶ [error] ──▶ [custom...] ──▶ split ──┬──▶ streaming
//!                                                  └──▶ http
//! result    ◀── observe in reverse order ◀─────────┘
//! ```
//!
//! The transport split is terminal and cannot be moved or removed.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{GraphQLResponse, Operation};
use crate::transport::{
    HttpTransport, Route, StreamingConnection, Subscription, TransportSelector,
};

use super::stage::Stage;

// ============================================================================
// Constants
// ============================================================================

/// Name reported for the terminal transport split.
pub const SPLIT_STAGE: &str = "split";

// ============================================================================
// Types
// ============================================================================

/// Shared stage handle.
pub type StageRef = Arc<dyn Stage>;

/// Construction-time hook over the pre-transport stages.
pub type LinkTransform = Arc<dyn Fn(Vec<StageRef>) -> Vec<StageRef> + Send + Sync>;

/// Outcome of [`Pipeline::execute`].
#[derive(Debug)]
pub enum Execution {
    /// Single result from the request/response transport.
    Response(GraphQLResponse),
    /// Result stream from the streaming transport.
    Stream(Subscription),
}

/// Orders the pre-transport stages: error stage first, then custom stages.
///
/// `transform` may then reorder, replace or drop any of them.
#[must_use]
pub fn compose_stages(
    error: Option<StageRef>,
    custom: Vec<StageRef>,
    transform: Option<&LinkTransform>,
) -> Vec<StageRef> {
    let stages: Vec<StageRef> = error.into_iter().chain(custom).collect();
    match transform {
        Some(transform) => transform(stages),
        None => stages,
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs operations through the stages and the transport split.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[StageRef]>,
    selector: TransportSelector,
    http: HttpTransport,
    streaming: Option<StreamingConnection>,
}

impl Pipeline {
    /// Creates a pipeline.
    ///
    /// Subscriptions go over `streaming` when present and over `http`
    /// otherwise.
    #[must_use]
    pub fn new(
        stages: Vec<StageRef>,
        http: HttpTransport,
        streaming: Option<StreamingConnection>,
    ) -> Self {
        Self {
            stages: stages.into(),
            selector: TransportSelector::new(streaming.is_some()),
            http,
            streaming,
        }
    }

    /// Stage names in execution order, ending with [`SPLIT_STAGE`].
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .map(|stage| stage.name())
            .chain(std::iter::once(SPLIT_STAGE))
            .collect()
    }

    /// Returns the transport selector.
    #[inline]
    #[must_use]
    pub fn selector(&self) -> TransportSelector {
        self.selector
    }

    /// Returns the streaming transport, if configured.
    #[inline]
    #[must_use]
    pub fn streaming(&self) -> Option<&StreamingConnection> {
        self.streaming.as_ref()
    }

    /// Executes `operation`: [`prepare`](Self::prepare), then
    /// [`dispatch`](Self::dispatch).
    ///
    /// # Errors
    ///
    /// Any error from a stage's `prepare` or from the selected transport.
    pub async fn execute(&self, operation: Operation) -> Result<Execution> {
        let operation = self.prepare(operation).await?;
        self.dispatch(operation).await
    }

    /// Runs every stage's `prepare` in order.
    ///
    /// A failing stage aborts the operation; the error is observed by all
    /// stages before it is returned.
    ///
    /// # Errors
    ///
    /// The first error returned by a stage.
    pub async fn prepare(&self, mut operation: Operation) -> Result<Operation> {
        for stage in self.stages.iter() {
            if let Err(error) = stage.prepare(&mut operation).await {
                debug!(stage = stage.name(), operation = operation.label(), error = %error, "Stage rejected operation");
                let failed = Err(error);
                self.observe(&operation, &failed);
                return failed.map(|_: GraphQLResponse| operation);
            }
        }
        Ok(operation)
    }

    /// Sends an already prepared operation over the selected transport.
    ///
    /// # Errors
    ///
    /// Any error from the selected transport.
    pub async fn dispatch(&self, operation: Operation) -> Result<Execution> {
        let route = self.selector.route(operation.document());
        trace!(operation = operation.label(), ?route, "Routing operation");

        match (route, &self.streaming) {
            (Route::Streaming, Some(streaming)) => match streaming.subscribe(&operation) {
                Ok(subscription) => {
                    let stages = Arc::clone(&self.stages);
                    Ok(Execution::Stream(subscription.with_observer(Box::new(
                        move |item: &Result<GraphQLResponse>| {
                            for stage in stages.iter().rev() {
                                stage.observe(&operation, item);
                            }
                        },
                    ))))
                }
                Err(error) => {
                    let failed = Err(error);
                    self.observe(&operation, &failed);
                    failed.map(Execution::Response)
                }
            },
            (Route::Streaming, None) => Err(Error::config("no streaming transport configured")),
            (Route::RequestResponse, _) => {
                let result = self.http.execute(&operation).await;
                self.observe(&operation, &result);
                result.map(Execution::Response)
            }
        }
    }

    fn observe(&self, operation: &Operation, result: &Result<GraphQLResponse>) {
        for stage in self.stages.iter().rev() {
            stage.observe(operation, result);
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
