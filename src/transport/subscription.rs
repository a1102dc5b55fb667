//! Subscription result stream.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::identifiers::OperationId;
use crate::protocol::GraphQLResponse;

use super::streaming::Command;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with every item before it is yielded.
pub type ResultObserver = Box<dyn Fn(&Result<GraphQLResponse>) + Send + Sync>;

// ============================================================================
// Subscription
// ============================================================================

/// Stream of results for one subscription operation.
///
/// Yields `Ok` for every `next` payload and a final `Err` when the server
/// rejects the operation or the connection gives up. Ends with `None` once the
/// operation completes. Dropping the subscription completes it on the server.
pub struct Subscription {
    id: OperationId,
    receiver: mpsc::UnboundedReceiver<Result<GraphQLResponse>>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    observer: Option<ResultObserver>,
}

impl Subscription {
    pub(crate) fn new(
        id: OperationId,
        receiver: mpsc::UnboundedReceiver<Result<GraphQLResponse>>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            id,
            receiver,
            commands: Some(commands),
            observer: None,
        }
    }

    /// Creates a subscription that yields `result` once and ends.
    ///
    /// Used when subscriptions are served over HTTP.
    #[must_use]
    pub fn once(result: Result<GraphQLResponse>) -> Self {
        let (tx, receiver) = mpsc::unbounded_channel();
        let _ = tx.send(result);

        Self {
            id: OperationId::generate(),
            receiver,
            commands: None,
            observer: None,
        }
    }

    pub(crate) fn with_observer(mut self, observer: ResultObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns the operation ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Receives the next result.
    pub async fn recv(&mut self) -> Option<Result<GraphQLResponse>> {
        let item = self.receiver.recv().await?;
        self.notify(&item);
        Some(item)
    }

    fn notify(&self, item: &Result<GraphQLResponse>) {
        if let Some(observer) = &self.observer {
            observer(item);
        }
    }
}

impl Stream for Subscription {
    type Item = Result<GraphQLResponse>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                this.notify(&item);
                Poll::Ready(Some(item))
            }
            other => other,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("streaming", &self.commands.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Complete(self.id));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
