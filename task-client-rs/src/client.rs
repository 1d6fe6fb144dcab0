//! Task dispatch to a remote agent
//!
//! A [`TaskClient`] is bound to one agent. It negotiates a wire protocol
//! once at construction and then delivers each task at most once: no
//! retries, no protocol switching. Retry policy belongs to the caller, who
//! can inspect [`Classify::is_retryable`](error_handling_rs::Classify).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use auth_service_rs::IdentityTokenSource;
use error_handling_rs::ErrorContext;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};
use url::Url;

use crate::config::{ProtocolPreference, TaskClientConfig};
use crate::credentials::TokenProvider;
use crate::error::mapping::{map_remote_error, map_rpc_error};
use crate::error::{Result, TaskError};
use crate::protocol::{
    supports_negotiation, task_payload, Protocol, RpcRequest, RpcResponse, AGENT_CARD_PATH,
};
use crate::types::{AgentCard, TaskRequest, TaskResponse};

const COMPONENT: &str = "task_client";

/// Client for one remote agent
pub struct TaskClient {
    http: reqwest::Client,
    config: TaskClientConfig,
    base_url: String,
    secure: bool,
    protocol: Protocol,
    token_provider: Option<Arc<dyn TokenProvider>>,
    next_rpc_id: AtomicU64,
    span: Span,
}

impl std::fmt::Debug for TaskClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskClient")
            .field("base_url", &self.base_url)
            .field("protocol", &self.protocol)
            .field("timeout", &self.config.timeout)
            .field("authenticated", &self.token_provider.is_some())
            .finish()
    }
}

impl TaskClient {
    /// Create a new builder
    pub fn builder() -> TaskClientBuilder {
        TaskClientBuilder::new()
    }

    /// Connect to the agent at `config.base_url`, negotiating the protocol.
    ///
    /// With an identity source, requests to `https` targets carry a bearer
    /// token minted for the base URL.
    pub async fn connect(
        config: TaskClientConfig,
        identity: Option<Arc<IdentityTokenSource>>,
    ) -> Result<Self> {
        let mut builder = Self::builder().config(config);
        if let Some(source) = identity {
            builder = builder.identity(source);
        }
        builder.connect().await
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn config(&self) -> &TaskClientConfig {
        &self.config
    }

    /// Execute a task and wait for the agent's response
    pub async fn execute(&self, request: &TaskRequest) -> Result<TaskResponse> {
        self.execute_with_cancellation(request, &CancellationToken::new()).await
    }

    /// Execute a task, giving up with [`TaskError::Cancelled`] as soon as
    /// `cancel` fires
    pub async fn execute_with_cancellation(
        &self,
        request: &TaskRequest,
        cancel: &CancellationToken,
    ) -> Result<TaskResponse> {
        request.validate()?;

        async {
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TaskError::Cancelled {
                    context: self.dispatch_context(request),
                }),
                result = self.dispatch(request) => result,
            };

            match &result {
                Ok(response) => info!(
                    session_id = %request.session_id,
                    step = %request.step,
                    artifacts = response.artifacts.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Task completed"
                ),
                Err(e) => warn!(
                    session_id = %request.session_id,
                    step = %request.step,
                    error = %e,
                    "Task failed"
                ),
            }
            result
        }
        .instrument(self.span.clone())
        .await
    }

    /// Probe the agent. Only `200 OK` counts as healthy.
    pub async fn health(&self) -> Result<()> {
        let url = match self.protocol {
            Protocol::Negotiated(_) => self.endpoint(AGENT_CARD_PATH),
            Protocol::Fallback => self.endpoint("healthz"),
        };
        let context = self.context("health", &url);

        async {
            let (status, body) = self.exchange(Method::GET, &url, None, &context).await?;
            if status == StatusCode::OK {
                debug!(url = %url, "Agent healthy");
                Ok(())
            } else {
                warn!(url = %url, status = status.as_u16(), "Agent unhealthy");
                Err(map_remote_error(status, &body, context))
            }
        }
        .instrument(self.span.clone())
        .await
    }

    async fn dispatch(&self, request: &TaskRequest) -> Result<TaskResponse> {
        let context = self.dispatch_context(request);
        let url = self.dispatch_url();

        match &self.protocol {
            Protocol::Fallback => {
                let body = serde_json::to_vec(request).map_err(|e| {
                    TaskError::validation(format!("failed to serialize request: {}", e))
                })?;

                debug!(session_id = %request.session_id, url = %url, "Dispatching task");
                let (status, text) = self.exchange(Method::POST, &url, Some(body), &context).await?;
                if !status.is_success() {
                    return Err(map_remote_error(status, &text, context));
                }

                serde_json::from_str(&text)
                    .map_err(|e| TaskError::decode(context.status_code(status.as_u16()), e.to_string()))
            }
            Protocol::Negotiated(_) => {
                let id = self.next_rpc_id.fetch_add(1, Ordering::Relaxed);
                let body = serde_json::to_vec(&RpcRequest::message_send(id, request)).map_err(|e| {
                    TaskError::validation(format!("failed to serialize request: {}", e))
                })?;

                debug!(session_id = %request.session_id, url = %url, rpc_id = id, "Dispatching task");
                let (status, text) = self.exchange(Method::POST, &url, Some(body), &context).await?;
                if !status.is_success() {
                    return Err(map_remote_error(status, &text, context));
                }

                let envelope: RpcResponse = serde_json::from_str(&text)
                    .map_err(|e| TaskError::decode(context.clone(), e.to_string()))?;
                if let Some(error) = envelope.error {
                    return Err(map_rpc_error(status, &error, context));
                }

                let result = envelope.result.ok_or_else(|| {
                    TaskError::decode(context.clone(), "JSON-RPC response has neither result nor error")
                })?;
                serde_json::from_value(task_payload(result))
                    .map_err(|e| TaskError::decode(context, e.to_string()))
            }
        }
    }

    /// One request/response round trip bounded by the configured timeout
    async fn exchange(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        context: &ErrorContext,
    ) -> Result<(StatusCode, String)> {
        let mut request = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json");

        if let Some(authorization) = self.authorization().await {
            request = request.header(AUTHORIZATION, authorization);
        }
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let timeout = self.config.timeout;
        let round_trip = async {
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        match tokio::time::timeout(timeout, round_trip).await {
            Ok(Ok(exchange)) => Ok(exchange),
            Ok(Err(e)) => Err(TaskError::from_reqwest(e, context.clone(), timeout)),
            Err(_) => Err(TaskError::Timeout {
                context: context.clone(),
                timeout,
            }),
        }
    }

    /// `Authorization` value for the next request, if one applies.
    ///
    /// Tokens only travel over `https`. A minting failure downgrades the
    /// request to unauthenticated instead of failing it.
    async fn authorization(&self) -> Option<String> {
        let provider = self.token_provider.as_ref()?;
        if !self.secure {
            return None;
        }

        match provider.token(&self.base_url).await {
            Ok(token) => Some(token.bearer()),
            Err(e) => {
                warn!(audience = %self.base_url, error = %e, "Identity token unavailable, sending unauthenticated");
                None
            }
        }
    }

    async fn negotiate(&self, base: &Url) -> Protocol {
        match self.config.protocol_preference {
            ProtocolPreference::ForceFallback => {
                info!("Protocol negotiation disabled, using fallback");
                return Protocol::Fallback;
            }
            ProtocolPreference::Auto if !supports_negotiation(base) => {
                debug!("Target does not publish an agent card, using fallback");
                return Protocol::Fallback;
            }
            _ => {}
        }

        let card_url = self.endpoint(AGENT_CARD_PATH);
        match self.fetch_card(base, &card_url).await {
            Ok(card) => {
                info!(agent = %card.name, endpoint = %card.url, "Negotiated agent protocol");
                Protocol::Negotiated(card)
            }
            Err(e) => {
                warn!(error = %e, "Agent card unavailable, using fallback protocol");
                Protocol::Fallback
            }
        }
    }

    async fn fetch_card(&self, base: &Url, card_url: &str) -> Result<AgentCard> {
        let context = self.context("negotiate", card_url);
        let (status, body) = self.exchange(Method::GET, card_url, None, &context).await?;
        if !status.is_success() {
            return Err(map_remote_error(status, &body, context));
        }

        let mut card: AgentCard = serde_json::from_str(&body)
            .map_err(|e| TaskError::decode(context.clone(), e.to_string()))?;

        // Cards may name their endpoint relative to the agent root
        let endpoint = base
            .join(&card.url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| {
                TaskError::decode(context, format!("agent card has invalid url {:?}", card.url))
            })?;
        card.url = endpoint.to_string();
        Ok(card)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn dispatch_url(&self) -> String {
        match &self.protocol {
            Protocol::Negotiated(card) => card.url.clone(),
            Protocol::Fallback => self.endpoint("task"),
        }
    }

    fn dispatch_context(&self, request: &TaskRequest) -> ErrorContext {
        self.context("execute", &self.dispatch_url())
            .session(&request.session_id)
            .with("step", &request.step)
    }

    fn context(&self, operation: &str, url: &str) -> ErrorContext {
        ErrorContext::new(COMPONENT, operation).remote(url)
    }
}

/// Builder for [`TaskClient`]
#[derive(Default)]
pub struct TaskClientBuilder {
    config: Option<TaskClientConfig>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    protocol_preference: Option<ProtocolPreference>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    span: Option<Span>,
}

impl TaskClientBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an explicit configuration instead of the environment
    pub fn config(mut self, config: TaskClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn protocol_preference(mut self, preference: ProtocolPreference) -> Self {
        self.protocol_preference = Some(preference);
        self
    }

    /// Attach tokens minted by the platform identity source
    pub fn identity(mut self, source: Arc<IdentityTokenSource>) -> Self {
        self.token_provider = Some(source as Arc<dyn TokenProvider>);
        self
    }

    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Log inside `span` instead of the default one
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Validate the configuration and negotiate the protocol
    pub async fn connect(self) -> Result<TaskClient> {
        let mut config = self.config.unwrap_or_else(TaskClientConfig::from_env);
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(preference) = self.protocol_preference {
            config.protocol_preference = preference;
        }

        config.validate()?;
        let base = config.parsed_base_url()?;
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.to_string())
            .build()
            .map_err(|e| TaskError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let span = self
            .span
            .unwrap_or_else(|| tracing::info_span!("task_client", agent = %base_url));

        let mut client = TaskClient {
            http,
            config,
            secure: base.scheme() == "https",
            base_url,
            protocol: Protocol::Fallback,
            token_provider: self.token_provider,
            next_rpc_id: AtomicU64::new(1),
            span,
        };

        client.protocol = client.negotiate(&base).instrument(client.span.clone()).await;
        Ok(client)
    }
}
