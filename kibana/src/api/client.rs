use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::error::{ApiError, ErrorBody};

/// How requests authenticate against Kibana
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Basic { username: String, password: String },
    ApiKey(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Basic { username, .. } => write!(f, "Basic({}, ***)", username),
            Auth::ApiKey(_) => write!(f, "ApiKey(***)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub auth: Auth,
    pub insecure: bool,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub tcp_keepalive: Option<Duration>,
}

impl ClientConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            auth: Auth::None,
            insecure: false,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(self.insecure)
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.idle_timeout);

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }

        builder.build()
    }
}

/// Kibana REST API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    auth: Auth,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let parsed = url::Url::parse(&config.url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", config.url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                config.url
            )));
        }

        let http_client = config.build_http_client()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                // Keep any base path (Kibana behind a proxy prefix)
                base_url: config.url.trim_end_matches('/').to_string(),
                auth: config.auth,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Connector operations
    pub fn connectors(&self) -> super::connectors::ConnectorsApi<'_> {
        super::connectors::ConnectorsApi::new(self)
    }

    /// Alerting rule operations
    pub fn alert_rules(&self) -> super::alert_rules::AlertRulesApi<'_> {
        super::alert_rules::AlertRulesApi::new(self)
    }

    /// GET a JSON document; every non-2xx status, 404 included, is an error
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.request(Method::GET, path).send().await?;
        let response = check_status(response).await?;
        parse_body(response).await
    }

    /// GET a single object that may have been removed remotely; a 404 reads as None
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, ApiError> {
        let response = self.request(Method::GET, path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("GET {} returned 404", path);
            return Ok(None);
        }
        let response = check_status(response).await?;
        parse_body(response).await.map(Some)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .with_body(self.request(Method::POST, path), body)?
            .send()
            .await?;
        parse_body(check_status(response).await?).await
    }

    /// POST without a request body, ignoring any response body
    pub async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        let response = self.request(Method::POST, path).send().await?;
        check_status(response).await.map(|_| ())
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .with_body(self.request(Method::PUT, path), body)?
            .send()
            .await?;
        parse_body(check_status(response).await?).await
    }

    /// DELETE; Kibana answers 204 with no body
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self.request(Method::DELETE, path).send().await?;
        check_status(response).await.map(|_| ())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.inner.base_url, path);
        tracing::debug!("{} request to: {}", method, url);

        let builder = self
            .inner
            .http_client
            .request(method, &url)
            .header("kbn-xsrf", "true")
            .header(CONTENT_TYPE, "application/json");

        match &self.inner.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
            Auth::ApiKey(key) => builder.header(AUTHORIZATION, format!("ApiKey {}", key)),
        }
    }

    fn with_body<B: Serialize>(
        &self,
        builder: RequestBuilder,
        body: &B,
    ) -> Result<RequestBuilder, ApiError> {
        let bytes = serde_json::to_vec(body).map_err(|e| ApiError::Encode(e.to_string()))?;
        Ok(builder.body(bytes))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let message = ErrorBody::describe(&text);

    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized(message));
    }
    Err(ApiError::Api { status, message })
}

async fn parse_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let text = response.text().await?;
    tracing::trace!("API response body: {}", text);

    serde_json::from_str::<T>(&text).map_err(|e| {
        tracing::error!("Failed to deserialize response: {}, body: {}", e, text);
        ApiError::Parse(e.to_string())
    })
}
