//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```ignore
//! use graphql_link::{Client, RetryOptions};
//!
//! let client = Client::builder()
//!     .graphql_url("https://api.example.com/v1/graphql")
//!     .header("x-client", "dashboard")
//!     .public_role("anonymous")
//!     .retry(RetryOptions::new().with_attempts(20))
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;
use url::Url;

use crate::auth::{AuthBridge, AuthHeaders, AuthInterpreter, Credential, DEFAULT_PUBLIC_ROLE};
use crate::cache::{Cache, FetchPolicy, InMemoryCache};
use crate::error::{Error, Result};
use crate::link::{ErrorContext, ErrorStage, LinkTransform, Pipeline, Stage, StageRef, compose_stages};
use crate::transport::{HttpTransport, RetryOptions, StreamingConnection};

use super::core::{Client, ClientInner};

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Clone)]
pub struct ClientBuilder {
    /// GraphQL HTTP endpoint.
    graphql_url: Option<String>,
    /// Headers sent with every request and `connection_init`.
    headers: BTreeMap<String, String>,
    /// Role sent while signed out.
    public_role: String,
    /// Credential shared with the host.
    credential: Option<Credential>,
    /// Result cache.
    cache: Option<Arc<dyn Cache>>,
    /// Default fetch policy of queries.
    fetch_policy: FetchPolicy,
    /// Per-operation debug logging.
    connect_to_dev_tools: Option<bool>,
    /// Whether a streaming transport is created.
    streaming: bool,
    /// Reconnect policy of the streaming transport.
    retry: RetryOptions,
    /// Error stage.
    on_error: Option<ErrorStage>,
    /// Custom stages, in order.
    stages: Vec<StageRef>,
    /// Hook over the pre-transport stages.
    generate_links: Option<LinkTransform>,
    /// Source of auth transitions.
    interpreter: Option<Arc<dyn AuthInterpreter>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            graphql_url: None,
            headers: BTreeMap::new(),
            public_role: DEFAULT_PUBLIC_ROLE.to_string(),
            credential: None,
            cache: None,
            fetch_policy: FetchPolicy::default(),
            connect_to_dev_tools: None,
            streaming: true,
            retry: RetryOptions::default(),
            on_error: None,
            stages: Vec::new(),
            generate_links: None,
            interpreter: None,
        }
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the GraphQL HTTP endpoint.
    ///
    /// The streaming URL is derived from it (`https` → `wss`, `http` → `ws`).
    #[inline]
    #[must_use]
    pub fn graphql_url(mut self, url: impl Into<String>) -> Self {
        self.graphql_url = Some(url.into());
        self
    }

    /// Adds a static header.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds several static headers.
    #[must_use]
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the role sent while no credential is set.
    ///
    /// Defaults to `"public"`.
    #[inline]
    #[must_use]
    pub fn public_role(mut self, role: impl Into<String>) -> Self {
        self.public_role = role.into();
        self
    }

    /// Shares an existing credential instead of creating one.
    #[inline]
    #[must_use]
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Sets the result cache.
    ///
    /// Defaults to an [`InMemoryCache`].
    #[inline]
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the default fetch policy of queries.
    #[inline]
    #[must_use]
    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    /// Enables per-operation debug logging.
    ///
    /// Defaults to on in debug builds.
    #[inline]
    #[must_use]
    pub fn connect_to_dev_tools(mut self, enabled: bool) -> Self {
        self.connect_to_dev_tools = Some(enabled);
        self
    }

    /// Enables or disables the streaming transport.
    ///
    /// Without it every operation, subscriptions included, goes over HTTP.
    /// Disable it in server contexts.
    #[inline]
    #[must_use]
    pub fn streaming(mut self, enabled: bool) -> Self {
        self.streaming = enabled;
        self
    }

    /// Sets the reconnect policy of the streaming transport.
    #[inline]
    #[must_use]
    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Installs the error stage.
    #[must_use]
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ErrorContext<'_>) + Send + Sync + 'static,
    {
        self.on_error = Some(ErrorStage::new(handler));
        self
    }

    /// Appends a custom stage after the error stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Installs a hook over the pre-transport stages.
    ///
    /// The hook receives `[error, custom...]` and returns the stages to use.
    /// The transport split is appended afterwards.
    #[must_use]
    pub fn generate_links<F>(mut self, transform: F) -> Self
    where
        F: Fn(Vec<StageRef>) -> Vec<StageRef> + Send + Sync + 'static,
    {
        self.generate_links = Some(Arc::new(transform));
        self
    }

    /// Connects the client to an auth state machine.
    ///
    /// Requires [`build`](Self::build) to run inside a Tokio runtime.
    #[must_use]
    pub fn interpreter(mut self, interpreter: impl AuthInterpreter + 'static) -> Self {
        self.interpreter = Some(Arc::new(interpreter));
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no endpoint is set or it is not an http(s) URL
    /// - [`Error::Config`] if an interpreter is set outside a Tokio runtime
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn build(self) -> Result<Client> {
        let endpoint = self.validate_endpoint()?;
        let runtime = self.validate_runtime()?;

        let credential = self.credential.unwrap_or_default();
        let headers = AuthHeaders::new(self.headers, self.public_role, credential.clone());
        let http = HttpTransport::new(endpoint.clone(), headers.clone())?;
        let streaming = if self.streaming {
            Some(StreamingConnection::new(&endpoint, headers, self.retry)?)
        } else {
            None
        };

        let error_stage = self.on_error.map(|stage| Arc::new(stage) as StageRef);
        let stages = compose_stages(error_stage, self.stages, self.generate_links.as_ref());
        let pipeline = Pipeline::new(stages, http, streaming.clone());
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryCache::new()));

        let bridge = match (self.interpreter, runtime) {
            (Some(interpreter), Some(runtime)) => Some(
                AuthBridge::new(credential.clone(), streaming.clone(), Arc::clone(&cache))
                    .spawn(interpreter.as_ref(), &runtime),
            ),
            _ => None,
        };

        let connect_to_dev_tools = self
            .connect_to_dev_tools
            .unwrap_or(cfg!(debug_assertions));

        info!(
            endpoint = %endpoint,
            streaming = streaming.is_some(),
            stages = ?pipeline.stage_names(),
            "GraphQL client created"
        );

        Ok(Client::from_inner(ClientInner {
            endpoint,
            pipeline,
            cache,
            fetch_policy: self.fetch_policy,
            credential,
            streaming,
            connect_to_dev_tools,
            bridge: parking_lot::Mutex::new(bridge),
        }))
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("graphql_url", &self.graphql_url)
            .field("headers", &self.headers)
            .field("public_role", &self.public_role)
            .field("fetch_policy", &self.fetch_policy)
            .field("streaming", &self.streaming)
            .field("retry", &self.retry)
            .field("stages", &self.stages.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Validates the endpoint configuration.
    fn validate_endpoint(&self) -> Result<Url> {
        let raw = self.graphql_url.as_deref().ok_or_else(|| {
            Error::config(
                "No backend URL has been provided. Use .graphql_url() to set it.\n\
                 Example: Client::builder().graphql_url(\"https://api.example.com/v1/graphql\")",
            )
        })?;

        let url = Url::parse(raw)
            .map_err(|e| Error::config(format!("Invalid GraphQL URL `{raw}`: {e}")))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::config(format!(
                "GraphQL URL must use http or https, got `{other}`"
            ))),
        }
    }

    /// Validates that a runtime is available when one is needed.
    fn validate_runtime(&self) -> Result<Option<Handle>> {
        if self.interpreter.is_none() {
            return Ok(None);
        }
        Handle::try_current().map(Some).map_err(|_| {
            Error::config(
                "An auth interpreter needs a running Tokio runtime.\n\
                 Call build() from within an async context.",
            )
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ChannelInterpreter;

    #[test]
    fn test_defaults() {
        let builder = ClientBuilder::new();
        assert!(builder.graphql_url.is_none());
        assert_eq!(builder.public_role, "public");
        assert!(builder.streaming);
        assert_eq!(builder.fetch_policy, FetchPolicy::CacheFirst);
        assert_eq!(builder.retry.attempts, 100);
    }

    #[test]
    fn test_headers_accumulate() {
        let builder = ClientBuilder::new()
            .header("x-a", "1")
            .headers([("x-b", "2"), ("x-a", "3")]);
        assert_eq!(builder.headers.get("x-a").map(String::as_str), Some("3"));
        assert_eq!(builder.headers.len(), 2);
    }

    #[test]
    fn test_build_fails_without_url() {
        let err = ClientBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("No backend URL"));
    }

    #[test]
    fn test_build_fails_with_invalid_url() {
        let err = ClientBuilder::new().graphql_url("not a url").build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_build_rejects_non_http_scheme() {
        let err = ClientBuilder::new()
            .graphql_url("wss://api.example.com/v1/graphql")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_interpreter_requires_runtime() {
        let err = ClientBuilder::new()
            .graphql_url("https://api.example.com/v1/graphql")
            .interpreter(ChannelInterpreter::default())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Tokio runtime"));
    }

    #[test]
    fn test_build_without_runtime() {
        let client = ClientBuilder::new()
            .graphql_url("https://api.example.com/v1/graphql")
            .connect_to_dev_tools(false)
            .build()
            .expect("build");

        assert_eq!(client.endpoint().as_str(), "https://api.example.com/v1/graphql");
        assert!(client.streaming().is_some());
        assert!(!client.is_streaming_open());
        assert!(!client.connect_to_dev_tools());
    }

    #[test]
    fn test_streaming_disabled() {
        let client = ClientBuilder::new()
            .graphql_url("http://localhost:8080/v1/graphql")
            .streaming(false)
            .build()
            .expect("build");
        assert!(client.streaming().is_none());
    }

    #[test]
    fn test_streaming_url_is_derived() {
        let client = ClientBuilder::new()
            .graphql_url("https://api.example.com/v1/graphql")
            .build()
            .expect("build");
        let streaming = client.streaming().expect("streaming");
        assert_eq!(streaming.url().as_str(), "wss://api.example.com/v1/graphql");
    }
}
