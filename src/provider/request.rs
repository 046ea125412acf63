//! Request engine: one call with timeout, classification, retry and
//! cancellation, for both plain JSON and SSE responses.

use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, Instrument};

use super::http::{build_client, request_headers, shared_client};
use crate::config::{RequestConfig, TransportSettings};
use crate::error::{ClassifiedError, ClassifierRules, ErrorKind, Outcome, Result};
use crate::stream::{event_stream_with, reducer_for_request};
use crate::types::{ProviderEventStream, ProviderStreamEvent};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;

/// Stateless request engine. Cheap to clone; every call gets fresh
/// attempt counters.
#[derive(Debug, Clone)]
pub struct TransportClient {
    http: reqwest::Client,
    rules: ClassifierRules,
}

impl Default for TransportClient {
    fn default() -> Self {
        Self {
            http: shared_client().clone(),
            rules: ClassifierRules::default(),
        }
    }
}

impl TransportClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-built reqwest client.
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self {
            http,
            rules: ClassifierRules::default(),
        }
    }

    /// A client with its own connect timeout and classifier rules.
    pub fn from_settings(settings: &TransportSettings) -> Result<Self> {
        Ok(Self {
            http: build_client(settings.connect_timeout())?,
            rules: settings.classifier.clone(),
        })
    }

    pub fn with_rules(mut self, rules: ClassifierRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &ClassifierRules {
        &self.rules
    }

    /// Send a request and parse the JSON response.
    ///
    /// A 2xx body that is not JSON, including an empty one, is
    /// `MalformedResponse` and is not retried.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        api_key: &str,
        body: Option<&Value>,
        config: &RequestConfig,
    ) -> Result<Value> {
        self.request_with_status(method, url, api_key, body, config)
            .await
            .map(|(_, value)| value)
    }

    /// Like [`request`](Self::request), deserializing into `T`. A body
    /// that does not match `T` is `MalformedResponse`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        api_key: &str,
        body: Option<&Value>,
        config: &RequestConfig,
    ) -> Result<T> {
        let (status, value) = self
            .request_with_status(method, url, api_key, body, config)
            .await?;
        T::deserialize(&value).map_err(|e| {
            let raw = value.to_string();
            self.rules.classify(Outcome::Malformed {
                status,
                body: &raw,
                detail: format!("response does not match the expected schema: {e}"),
            })
        })
    }

    /// Open a streaming request and decode it lazily.
    ///
    /// Nothing is sent until the stream is first polled. Failures while
    /// opening (after retries) arrive as a single `Error` event.
    pub fn stream_request(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
        config: RequestConfig,
    ) -> ProviderEventStream {
        let this = self.clone();
        let url = url.to_string();
        let api_key = api_key.to_string();
        let body = body.clone();

        let stream = async_stream::stream! {
            match this.open_stream(&url, &api_key, &body, config).await {
                Ok(events) => {
                    for await event in events {
                        yield event;
                    }
                }
                Err(e) => yield ProviderStreamEvent::Error(e),
            }
        };
        Box::pin(stream)
    }

    /// Send a streaming request, retrying until the response headers
    /// arrive with a success status. Once events flow there are no
    /// retries.
    pub async fn open_stream(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
        config: RequestConfig,
    ) -> Result<ProviderEventStream> {
        config.validate()?;
        let url = parse_url(url)?;
        let headers = request_headers(api_key, &config, true)?;
        let span = tracing::debug_span!(
            "stream_request",
            request_id = %uuid::Uuid::new_v4(),
            url = %url,
            format = %config.format,
        );

        let policy = RetryPolicy::new(config.max_retries, config.backoff);
        let response = policy
            .execute(&config.cancellation, |attempt| {
                debug!(url = %url, attempt, format = %config.format, "Opening stream");
                self.open_attempt(&url, &headers, body, &config)
            })
            .instrument(span)
            .await?;

        let rules = self.rules.clone();
        let chunks = futures::StreamExt::map(response.bytes_stream(), move |chunk| {
            chunk.map_err(|e| rules.classify(Outcome::StreamRead(&e)))
        });
        Ok(event_stream_with(
            chunks,
            config.format,
            reducer_for_request(config.format, body),
            config.cancellation.clone(),
            config.stream_idle_timeout,
        ))
    }

    async fn request_with_status(
        &self,
        method: Method,
        url: &str,
        api_key: &str,
        body: Option<&Value>,
        config: &RequestConfig,
    ) -> Result<(u16, Value)> {
        config.validate()?;
        let url = parse_url(url)?;
        let headers = request_headers(api_key, config, false)?;
        let span = tracing::debug_span!(
            "request",
            request_id = %uuid::Uuid::new_v4(),
            method = %method,
            url = %url,
        );

        let policy = RetryPolicy::new(config.max_retries, config.backoff);
        policy
            .execute(&config.cancellation, |attempt| {
                debug!(url = %url, attempt, "Sending request");
                self.json_attempt(&method, &url, &headers, body, config)
            })
            .instrument(span)
            .await
    }

    async fn json_attempt(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&Value>,
        config: &RequestConfig,
    ) -> Result<(u16, Value)> {
        with_timeout(config.timeout, async {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request
                .send()
                .await
                .map_err(|e| self.rules.classify(Outcome::Transport(&e)))?;

            let status = response.status().as_u16();
            let response_headers = response.headers().clone();
            let text = response
                .text()
                .await
                .map_err(|e| self.rules.classify(Outcome::Transport(&e)))?;

            if !(200..300).contains(&status) {
                return Err(self.rules.classify(Outcome::Http {
                    status,
                    headers: &response_headers,
                    body: &text,
                }));
            }
            serde_json::from_str(&text)
                .map(|value| (status, value))
                .map_err(|e| {
                    self.rules.classify(Outcome::Malformed {
                        status,
                        body: &text,
                        detail: format!("response body is not valid JSON: {e}"),
                    })
                })
        })
        .await
    }

    async fn open_attempt(
        &self,
        url: &Url,
        headers: &HeaderMap,
        body: &Value,
        config: &RequestConfig,
    ) -> Result<reqwest::Response> {
        with_timeout(config.timeout, async {
            let response = self
                .http
                .post(url.clone())
                .headers(headers.clone())
                .json(body)
                .send()
                .await
                .map_err(|e| self.rules.classify(Outcome::Transport(&e)))?;

            let status = response.status().as_u16();
            if (200..300).contains(&status) {
                return Ok(response);
            }
            let response_headers = response.headers().clone();
            let text = response
                .text()
                .await
                .map_err(|e| self.rules.classify(Outcome::Transport(&e)))?;
            Err(self.rules.classify(Outcome::Http {
                status,
                headers: &response_headers,
                body: &text,
            }))
        })
        .await
    }
}

fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| {
        ClassifiedError::new(ErrorKind::InvalidBaseUrl, format!("{url:?}: {e}")).with_source(e)
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClassifiedError::new(
            ErrorKind::InvalidBaseUrl,
            format!("{url:?}: scheme must be http or https"),
        ));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_must_be_absolute_http() {
        assert_eq!(parse_url("/v1/chat").unwrap_err().kind(), ErrorKind::InvalidBaseUrl);
        assert_eq!(parse_url("file:///etc/passwd").unwrap_err().kind(), ErrorKind::InvalidBaseUrl);
        assert!(parse_url("https://api.example.com/v1/chat/completions").is_ok());
    }

    #[tokio::test]
    async fn invalid_config_fails_before_any_io() {
        let client = TransportClient::new();
        let config = RequestConfig::builder()
            .timeout(std::time::Duration::ZERO)
            .build();
        let err = client
            .request(Method::POST, "https://api.example.com", "k", None, &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }

    #[tokio::test]
    async fn stream_open_failure_is_a_single_error_event() {
        use futures::StreamExt;

        let events: Vec<_> = TransportClient::new()
            .stream_request("not a url", "k", &serde_json::json!({}), RequestConfig::default())
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_error().map(|e| e.kind()),
            Some(ErrorKind::InvalidBaseUrl)
        );
    }
}
