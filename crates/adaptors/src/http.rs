//! HTTP adaptor.
//!
//! Delivers the routed payload as a JSON body to a configured URL with
//! optional custom headers.

use std::collections::HashMap;
use std::time::Duration;

use beast_core::Route;

use crate::traits::{Adaptor, AdaptorError};

/// Header carrying the recipient name the payload was routed to.
pub const DESTINATION_HEADER: &str = "X-Beast-Destination";

/// Posts routed payloads as JSON to one endpoint.
///
/// Environment variable references (`${VAR_NAME}`) in the URL and header
/// values are resolved at construction time.
#[derive(Debug)]
pub struct HttpAdaptor {
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl HttpAdaptor {
    /// `method` defaults to `POST` when `None`.
    pub fn new(
        url: String,
        method: Option<reqwest::Method>,
        headers: HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<Self, AdaptorError> {
        let resolved_url = resolve_env_vars(&url)?;
        if resolved_url.trim().is_empty() {
            return Err(AdaptorError::Config("adaptor url must not be empty".into()));
        }

        let mut resolved_headers = HashMap::with_capacity(headers.len());
        for (key, value) in &headers {
            resolved_headers.insert(key.clone(), resolve_env_vars(value)?);
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            url: resolved_url,
            method: method.unwrap_or(reqwest::Method::POST),
            headers: resolved_headers,
            client: builder.build()?,
        })
    }

    /// Construct from config-level primitives. `method` is parsed
    /// case-insensitively; invalid methods produce [`AdaptorError::Config`].
    pub fn from_config(
        url: String,
        method: Option<String>,
        headers: HashMap<String, String>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, AdaptorError> {
        let parsed_method = match method {
            Some(m) => Some(
                m.to_uppercase()
                    .parse::<reqwest::Method>()
                    .map_err(|_| AdaptorError::Config(format!("invalid HTTP method: {m}")))?,
            ),
            None => None,
        };
        Self::new(url, parsed_method, headers, timeout_secs.map(Duration::from_secs))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Adaptor for HttpAdaptor {
    async fn handle(&self, route: &Route) -> Result<(), AdaptorError> {
        let body = serde_json::to_string(&route.payload)
            .map_err(|e| AdaptorError::Config(format!("failed to serialize payload: {e}")))?;

        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(DESTINATION_HEADER, route.destination.as_str())
            .body(body);

        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AdaptorError::Delivery {
                adaptor: route.destination.clone(),
                reason: format!("{} returned {status}: {body_text}", self.url),
            });
        }

        tracing::debug!(
            url = %self.url,
            method = %self.method,
            %status,
            "http delivery accepted"
        );
        Ok(())
    }

    fn kind(&self) -> &str {
        "http"
    }
}

/// Resolve `${VAR_NAME}` patterns. Fails if a referenced variable is unset.
fn resolve_env_vars(input: &str) -> Result<String, AdaptorError> {
    resolve_with(input, |name| std::env::var(name).ok())
}

fn resolve_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String, AdaptorError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| AdaptorError::Config(format!("unclosed env var reference in: {input}")))?;
        let name = &after[..end];
        let value = lookup(name)
            .ok_or_else(|| AdaptorError::Config(format!("env var not found: {name}")))?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}
