//! GraphQL client facade.
//!
//! The [`Client`] ties the link pipeline, the cache and the auth bridge
//! together.
//!
//! # Example
//!
//! ```ignore
//! use graphql_link::{Client, Operation};
//!
//! let client = Client::builder()
//!     .graphql_url("https://api.example.com/v1/graphql")
//!     .build()?;
//!
//! let apps = client
//!     .query(Operation::parse("query Apps { apps { id name } }")?)
//!     .await?;
//!
//! let mut updates = client
//!     .subscribe(Operation::parse("subscription { apps { id } }")?)
//!     .await?;
//! while let Some(update) = updates.recv().await {
//!     println!("{:?}", update?.data);
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use url::Url;

use crate::auth::Credential;
use crate::cache::{Cache, CacheKey, FetchPolicy};
use crate::error::{Error, Result};
use crate::link::{Execution, Pipeline};
use crate::protocol::{GraphQLResponse, Operation, OperationKind};
use crate::transport::{StreamingConnection, Subscription};

use super::builder::ClientBuilder;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    /// GraphQL HTTP endpoint.
    pub endpoint: Url,

    /// Stages and transports.
    pub pipeline: Pipeline,

    /// Query result cache.
    pub cache: Arc<dyn Cache>,

    /// Default fetch policy of [`Client::query`].
    pub fetch_policy: FetchPolicy,

    /// Credential read by both transports.
    pub credential: Credential,

    /// Streaming transport, if enabled.
    pub streaming: Option<StreamingConnection>,

    /// Per-operation debug logging.
    pub connect_to_dev_tools: bool,

    /// Auth bridge task, if an interpreter was configured.
    pub bridge: Mutex<Option<JoinHandle<()>>>,
}

// ============================================================================
// Client
// ============================================================================

/// Authenticated GraphQL client.
///
/// Cloning is cheap; clones share transports, cache and credential.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_inner(inner: ClientInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the GraphQL HTTP endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Returns the shared credential.
    #[inline]
    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.inner.credential
    }

    /// Returns the streaming transport, if enabled.
    #[inline]
    #[must_use]
    pub fn streaming(&self) -> Option<&StreamingConnection> {
        self.inner.streaming.as_ref()
    }

    /// Returns `true` if the streaming connection is currently open.
    #[inline]
    #[must_use]
    pub fn is_streaming_open(&self) -> bool {
        self.inner
            .streaming
            .as_ref()
            .is_some_and(StreamingConnection::is_open)
    }

    /// Returns the cache.
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.inner.cache
    }

    /// Returns the default fetch policy of queries.
    #[inline]
    #[must_use]
    pub fn fetch_policy(&self) -> FetchPolicy {
        self.inner.fetch_policy
    }

    /// Returns `true` if per-operation debug logging is on.
    #[inline]
    #[must_use]
    pub fn connect_to_dev_tools(&self) -> bool {
        self.inner.connect_to_dev_tools
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.inner.pipeline.stage_names()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Runs `operation` through the pipeline without touching the cache.
    ///
    /// # Errors
    ///
    /// Any stage or transport error.
    pub async fn execute(&self, operation: Operation) -> Result<Execution> {
        let operation = self.inner.pipeline.prepare(operation).await?;
        self.dispatch(operation).await
    }

    /// Runs a query with the client's default fetch policy.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOperation`] if the document is not a query
    /// - [`Error::CacheMiss`] under [`FetchPolicy::CacheOnly`] without a cached result
    /// - Any stage or transport error
    pub async fn query(&self, operation: Operation) -> Result<GraphQLResponse> {
        self.query_with_policy(operation, self.inner.fetch_policy)
            .await
    }

    /// Runs a query with an explicit fetch policy.
    ///
    /// # Errors
    ///
    /// See [`query`](Self::query).
    pub async fn query_with_policy(
        &self,
        operation: Operation,
        policy: FetchPolicy,
    ) -> Result<GraphQLResponse> {
        expect_kind(&operation, OperationKind::Query)?;
        let operation = self.inner.pipeline.prepare(operation).await?;
        let key = CacheKey::for_operation(&operation)?;

        if policy.reads_cache() {
            if let Some(cached) = self.inner.cache.read(&key) {
                trace!(operation = operation.label(), "Cache hit");
                return Ok(cached);
            }
            if policy == FetchPolicy::CacheOnly {
                return Err(Error::cache_miss(operation.label()));
            }
        }

        // A reset while the request is in flight discards its result.
        let generation = self.inner.cache.generation();
        let response = match self.dispatch(operation).await? {
            Execution::Response(response) => response,
            Execution::Stream(_) => return Err(routed_to_streaming()),
        };
        if policy.writes_cache() {
            self.inner.cache.write(key, response.clone(), generation);
        }
        Ok(response)
    }

    /// Runs a mutation. Never cached.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOperation`] if the document is not a mutation
    /// - Any stage or transport error
    pub async fn mutate(&self, operation: Operation) -> Result<GraphQLResponse> {
        expect_kind(&operation, OperationKind::Mutation)?;
        self.request(operation).await
    }

    /// Starts a subscription.
    ///
    /// Without a streaming transport the subscription is sent over HTTP and
    /// yields its single result.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOperation`] if the document is not a subscription
    /// - Any stage or transport error
    pub async fn subscribe(&self, operation: Operation) -> Result<Subscription> {
        expect_kind(&operation, OperationKind::Subscription)?;
        match self.execute(operation).await? {
            Execution::Stream(subscription) => Ok(subscription),
            Execution::Response(response) => Ok(Subscription::once(Ok(response))),
        }
    }

    /// Clears every cached result.
    ///
    /// # Errors
    ///
    /// Any error of the cache backend.
    pub async fn reset_store(&self) -> Result<()> {
        self.inner.cache.reset().await
    }

    /// Stops the auth bridge and the streaming connection.
    pub fn shutdown(&self) {
        if let Some(bridge) = self.inner.bridge.lock().take() {
            bridge.abort();
        }
        if let Some(streaming) = &self.inner.streaming {
            streaming.shutdown();
        }
        debug!("Client shut down");
    }

    async fn request(&self, operation: Operation) -> Result<GraphQLResponse> {
        match self.execute(operation).await? {
            Execution::Response(response) => Ok(response),
            Execution::Stream(_) => Err(routed_to_streaming()),
        }
    }

    /// Sends a prepared operation.
    async fn dispatch(&self, operation: Operation) -> Result<Execution> {
        if self.inner.connect_to_dev_tools {
            debug!(
                operation = operation.label(),
                kind = ?operation.kind(),
                variables = %serde_json::Value::Object(operation.variables.clone()),
                "Executing operation"
            );
        }
        self.inner.pipeline.dispatch(operation).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("pipeline", &self.inner.pipeline)
            .field("fetch_policy", &self.inner.fetch_policy)
            .field("credential", &self.inner.credential)
            .finish_non_exhaustive()
    }
}

fn routed_to_streaming() -> Error {
    Error::invalid_operation("operation was routed to the streaming transport")
}

fn expect_kind(operation: &Operation, expected: OperationKind) -> Result<()> {
    match operation.kind() {
        Some(kind) if kind == expected => Ok(()),
        Some(kind) => Err(Error::invalid_operation(format!(
            "expected a {expected} operation, got a {kind}"
        ))),
        None => Err(Error::invalid_operation(format!(
            "expected a {expected} operation, document has none"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::auth::ChannelInterpreter;
    use crate::link::FnStage;
    use crate::test_support::{MockHttpServer, MockWsBehavior, MockWsServer, wait_until};

    fn http_only(url: &str) -> Client {
        Client::builder()
            .graphql_url(url)
            .streaming(false)
            .build()
            .expect("build")
    }

    fn apps() -> Operation {
        Operation::parse("query Apps { apps { id } }").expect("parse")
    }

    #[tokio::test]
    async fn test_cache_first_reuses_result() {
        let server = MockHttpServer::start(200, r#"{"data":{"apps":[]}}"#).await;
        let client = http_only(&server.url);

        let first = client.query(apps()).await.expect("query");
        let second = client.query(apps()).await.expect("query");

        assert_eq!(first, second);
        assert_eq!(server.request_count(), 1);
    }

    #[tokio::test]
    async fn test_network_only_always_fetches() {
        let server = MockHttpServer::start(200, r#"{"data":{"apps":[]}}"#).await;
        let client = http_only(&server.url);

        client
            .query_with_policy(apps(), FetchPolicy::NetworkOnly)
            .await
            .expect("query");
        client
            .query_with_policy(apps(), FetchPolicy::NetworkOnly)
            .await
            .expect("query");
        assert_eq!(server.request_count(), 2);

        client
            .query_with_policy(apps(), FetchPolicy::CacheOnly)
            .await
            .expect("cached by network-only");
        assert_eq!(server.request_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_only_miss() {
        let server = MockHttpServer::start(200, r#"{"data":{"apps":[]}}"#).await;
        let client = http_only(&server.url);

        let err = client
            .query_with_policy(apps(), FetchPolicy::CacheOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CacheMiss { ref operation } if operation == "Apps"));
        assert_eq!(server.request_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_store_forces_refetch() -> anyhow::Result<()> {
        let server = MockHttpServer::start(200, r#"{"data":{"apps":[]}}"#).await;
        let client = http_only(&server.url);

        client.query(apps()).await?;
        client.reset_store().await?;
        client.query(apps()).await?;

        assert_eq!(server.request_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_mutations_bypass_cache() {
        let server = MockHttpServer::start(200, r#"{"data":{"insert_app":{"id":1}}}"#).await;
        let client = http_only(&server.url);
        let insert = || Operation::parse("mutation { insert_app { id } }").expect("parse");

        client.mutate(insert()).await.expect("mutate");
        client.mutate(insert()).await.expect("mutate");
        assert_eq!(server.request_count(), 2);
    }

    #[tokio::test]
    async fn test_entry_points_check_operation_kind() {
        let server = MockHttpServer::start(200, r#"{"data":{}}"#).await;
        let client = http_only(&server.url);

        let err = client.mutate(apps()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));

        let err = client
            .query(Operation::parse("subscription { tick }").expect("parse"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected a query"));

        let err = client
            .subscribe(Operation::parse("fragment F on apps { id }").expect("parse"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
        assert_eq!(server.request_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_without_streaming_yields_http_result() {
        let server = MockHttpServer::start(200, r#"{"data":{"tick":1}}"#).await;
        let client = http_only(&server.url);

        let mut subscription = client
            .subscribe(Operation::parse("subscription { tick }").expect("parse"))
            .await
            .expect("subscribe");
        let item = subscription.recv().await.expect("item").expect("ok");

        assert_eq!(item.data, Some(json!({ "tick": 1 })));
        assert!(subscription.recv().await.is_none());
        assert_eq!(server.request_count(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_over_streaming() {
        let mut server = MockWsServer::start(MockWsBehavior::default()).await;
        let client = Client::builder()
            .graphql_url(&server.url)
            .build()
            .expect("build");

        let mut subscription = client
            .subscribe(Operation::parse("subscription Watch { tick }").expect("parse"))
            .await
            .expect("subscribe");
        server.next_init().await;

        let item = subscription.recv().await.expect("item").expect("ok");
        assert_eq!(item.data, Some(json!({ "tick": 1 })));
        assert!(client.is_streaming_open());

        client.shutdown();
        assert!(matches!(
            subscription.recv().await,
            Some(Err(Error::ConnectionClosed))
        ));
    }

    #[tokio::test]
    async fn test_on_error_sees_graphql_errors_and_skips_cache() {
        let server =
            MockHttpServer::start(200, r#"{"data":null,"errors":[{"message":"denied"}]}"#).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = Client::builder()
            .graphql_url(&server.url)
            .streaming(false)
            .on_error({
                let seen = Arc::clone(&seen);
                move |context| {
                    seen.lock().extend(
                        context
                            .graphql_errors
                            .iter()
                            .map(|error| error.message.clone()),
                    );
                }
            })
            .build()
            .expect("build");

        let response = client.query(apps()).await.expect("query");
        assert!(response.has_errors());
        client.query(apps()).await.expect("query");

        assert_eq!(*seen.lock(), vec!["denied", "denied"]);
        assert_eq!(server.request_count(), 2);
    }

    #[tokio::test]
    async fn test_on_error_sees_network_errors() {
        let server = MockHttpServer::start(500, "boom").await;
        let seen = Arc::new(Mutex::new(None));
        let client = Client::builder()
            .graphql_url(&server.url)
            .streaming(false)
            .on_error({
                let seen = Arc::clone(&seen);
                move |context| {
                    *seen.lock() = context.network_error.map(ToString::to_string);
                }
            })
            .build()
            .expect("build");

        let err = client.query(apps()).await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(seen.lock().as_deref(), Some("HTTP 500 Internal Server Error: boom"));
    }

    #[tokio::test]
    async fn test_stage_order_and_generate_links() {
        let client = Client::builder()
            .graphql_url("https://api.example.com/v1/graphql")
            .on_error(|_| {})
            .stage(FnStage::new("custom", |_: &mut Operation| Ok(())))
            .build()
            .expect("build");
        assert_eq!(client.stage_names(), vec!["error", "custom", "split"]);

        let client = Client::builder()
            .graphql_url("https://api.example.com/v1/graphql")
            .on_error(|_| {})
            .stage(FnStage::new("custom", |_: &mut Operation| Ok(())))
            .generate_links(|mut stages| {
                stages.reverse();
                stages
            })
            .build()
            .expect("build");
        assert_eq!(client.stage_names(), vec!["custom", "error", "split"]);
    }

    #[tokio::test]
    async fn test_custom_stage_headers_reach_server() {
        let mut server = MockHttpServer::start(200, r#"{"data":{"apps":[]}}"#).await;
        let client = Client::builder()
            .graphql_url(&server.url)
            .streaming(false)
            .header("x-client", "dashboard")
            .stage(FnStage::new("request-id", |operation: &mut Operation| {
                operation
                    .context_headers
                    .push(("x-request-id".into(), "42".into()));
                Ok(())
            }))
            .build()
            .expect("build");

        client.query(apps()).await.expect("query");
        let request = server.next_request().await;
        assert_eq!(request.header("x-request-id"), Some("42"));
        assert_eq!(request.header("x-client"), Some("dashboard"));
        assert_eq!(request.json()["operationName"], "Apps");
    }

    #[tokio::test]
    async fn test_interpreter_drives_request_headers() {
        let mut server = MockHttpServer::start(200, r#"{"data":{"apps":[]}}"#).await;
        let interpreter = ChannelInterpreter::default();
        let client = Client::builder()
            .graphql_url(&server.url)
            .streaming(false)
            .fetch_policy(FetchPolicy::NetworkOnly)
            .interpreter(interpreter.clone())
            .build()
            .expect("build");

        interpreter.sign_in("abc");
        assert!(wait_until(|| client.credential().is_authenticated()).await);
        client.query(apps()).await.expect("query");
        let signed_in = server.next_request().await;
        assert_eq!(signed_in.header("authorization"), Some("Bearer abc"));
        assert_eq!(signed_in.header("role"), None);

        interpreter.sign_out();
        assert!(wait_until(|| !client.credential().is_authenticated()).await);
        client.query(apps()).await.expect("query");
        let signed_out = server.next_request().await;
        assert_eq!(signed_out.header("role"), Some("public"));
        assert_eq!(signed_out.header("authorization"), None);

        client.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_sign_out_resets_cache() {
        let server = MockHttpServer::start(200, r#"{"data":{"apps":[]}}"#).await;
        let interpreter = ChannelInterpreter::default();
        let client = Client::builder()
            .graphql_url(&server.url)
            .streaming(false)
            .interpreter(interpreter.clone())
            .build()
            .expect("build");

        client.query(apps()).await.expect("query");
        client.query(apps()).await.expect("query");
        assert_eq!(server.request_count(), 1);

        interpreter.sign_out();
        let key = CacheKey::for_operation(&apps()).expect("key");
        assert!(wait_until(|| client.cache().read(&key).is_none()).await);

        client.query(apps()).await.expect("query");
        assert_eq!(server.request_count(), 2);
    }

    #[tokio::test]
    async fn test_sign_out_during_query_leaves_cache_empty() {
        let mut server = MockHttpServer::start_with_delay(
            200,
            r#"{"data":{"secret":"alice-private"}}"#,
            Duration::from_millis(300),
        )
        .await;
        let interpreter = ChannelInterpreter::default();
        let client = Client::builder()
            .graphql_url(&server.url)
            .streaming(false)
            .interpreter(interpreter.clone())
            .build()
            .expect("build");

        interpreter.sign_in("abc");
        assert!(wait_until(|| client.credential().is_authenticated()).await);

        let in_flight = tokio::spawn({
            let client = client.clone();
            async move { client.query(apps()).await }
        });
        let request = server.next_request().await;
        assert_eq!(request.header("authorization"), Some("Bearer abc"));

        interpreter.sign_out();
        assert!(wait_until(|| client.cache().generation() == 1).await);

        let response = in_flight.await.expect("join").expect("query");
        assert_eq!(response.data, Some(json!({ "secret": "alice-private" })));

        let key = CacheKey::for_operation(&apps()).expect("key");
        assert!(client.cache().read(&key).is_none());
        let cached = client
            .query_with_policy(apps(), FetchPolicy::CacheOnly)
            .await;
        assert!(matches!(cached, Err(Error::CacheMiss { .. })));

        client.shutdown();
    }

    #[tokio::test]
    async fn test_cache_key_follows_prepared_operation() {
        let server = MockHttpServer::start(200, r#"{"data":{"apps":[]}}"#).await;
        let client = Client::builder()
            .graphql_url(&server.url)
            .streaming(false)
            .stage(FnStage::new("tenant", |operation: &mut Operation| {
                operation
                    .variables
                    .insert("tenant".into(), json!("acme"));
                Ok(())
            }))
            .build()
            .expect("build");

        client.query(apps()).await.expect("query");
        client.query(apps()).await.expect("query");
        assert_eq!(server.request_count(), 1);

        let prepared = CacheKey::for_operation(&apps().variable("tenant", "acme")).expect("key");
        let unprepared = CacheKey::for_operation(&apps()).expect("key");
        assert!(client.cache().read(&prepared).is_some());
        assert!(client.cache().read(&unprepared).is_none());
    }
}
