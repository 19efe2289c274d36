//! The HTTP client every remote call goes through.

use std::sync::Arc;

use convergence::{CancellationToken, TransportError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::echo::curl_command;
use crate::request::{classify, excerpt, Exchange, Page, Redirected, Reply, RequestDescriptor};

/// Header carrying the consumer trace context.
pub const TRACE_CONTEXT_HEADER: &str = "X-DataRobot-Api-Consumer-Trace";

const JSON: &str = "application/json";

/// Typed client for the remote API.
///
/// Cheap to clone; clones share the connection pool and the immutable
/// configuration, so one client can serve concurrent operations.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    base: Url,
}

impl Client {
    /// Builds a client for `config`.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        if config.token.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        let base = Url::parse(&format!("{}/", config.endpoint)).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: e.to_string(),
        })?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ConfigError::HttpClient)?;

        Ok(Self {
            http,
            config: Arc::new(config),
            base,
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Executes one request and classifies the response.
    ///
    /// The body, if any, is serialized before anything is sent; a body that
    /// fails to serialize yields [`TransportError::Generic`] and no request.
    /// No call is ever retried.
    #[instrument(skip_all, fields(method = %descriptor.method, path = descriptor.path))]
    pub async fn execute<T, B>(
        &self,
        descriptor: RequestDescriptor<'_, B>,
        cancel: &CancellationToken,
    ) -> Result<Reply<T>, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let RequestDescriptor {
            method,
            path,
            query,
            body,
        } = descriptor;
        let url = self.url(path, &query)?;

        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| TransportError::wrap_generic(format!("failed to serialize {method} {url} request body"), e))?;

        let headers = self.standard_headers(Some(JSON))?;
        let echo = self
            .config
            .debug
            .then(|| curl_command(&method, &url, &headers, body.as_deref()));

        let mut request = self.http.request(method.clone(), url.clone()).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        self.send(&method, &url, request, echo, cancel).await
    }

    /// `GET` `path` and deserialize the body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, cancel: &CancellationToken) -> Result<T, TransportError> {
        self.execute(RequestDescriptor::get(path), cancel).await?.into_value()
    }

    /// `POST` `body` to `path` and deserialize the reply.
    pub async fn post<B, T>(&self, path: &str, body: &B, cancel: &CancellationToken) -> Result<Reply<T>, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(RequestDescriptor::with_body(Method::POST, path, body), cancel)
            .await
    }

    /// `PUT` `body` to `path`; `None` for a 204 reply.
    pub async fn put<B, T>(&self, path: &str, body: &B, cancel: &CancellationToken) -> Result<Option<T>, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        Ok(self
            .execute(RequestDescriptor::with_body(Method::PUT, path, body), cancel)
            .await?
            .value)
    }

    /// `PATCH` `body` to `path`; `None` for a 202 or 204 reply.
    pub async fn patch<B, T>(&self, path: &str, body: &B, cancel: &CancellationToken) -> Result<Option<T>, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        Ok(self
            .execute(RequestDescriptor::with_body(Method::PATCH, path, body), cancel)
            .await?
            .value)
    }

    /// `DELETE` `path`, ignoring any reply body.
    pub async fn delete(&self, path: &str, cancel: &CancellationToken) -> Result<(), TransportError> {
        self.execute::<IgnoredAny, ()>(RequestDescriptor::delete(path), cancel)
            .await
            .map(|_| ())
    }

    /// Fetches every page of a paginated listing.
    ///
    /// Each `next` link's query string is re-applied to `path`, so the server
    /// cannot steer later requests to a different resource.
    pub async fn get_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, TransportError> {
        let mut results = Vec::new();
        let mut descriptor = Some(RequestDescriptor::get(path).with_query(query.iter().copied()));

        while let Some(current) = descriptor.take() {
            let page: Page<T> = self.execute(current, cancel).await?.into_value()?;
            results.extend(page.data);

            if let Some(next) = page.next.filter(|n| !n.is_empty()) {
                let next = self
                    .base
                    .join(&next)
                    .map_err(|e| TransportError::wrap_generic(format!("invalid next-page link '{next}'"), e))?;
                let pairs: Vec<(String, String)> = next.query_pairs().into_owned().collect();
                descriptor = Some(RequestDescriptor::get(path).with_query(pairs));
            }
        }

        debug!(path, items = results.len(), "fetched all pages");
        Ok(results)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URL of `path` with `query` appended.
    pub(crate) fn url(&self, path: &str, query: &[(String, String)]) -> Result<Url, TransportError> {
        let raw = format!("{}{}", self.config.endpoint, path);
        let mut url =
            Url::parse(&raw).map_err(|e| TransportError::wrap_generic(format!("invalid request URL '{raw}'"), e))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Headers attached to every call.
    pub(crate) fn standard_headers(&self, content_type: Option<&str>) -> Result<HeaderMap, TransportError> {
        let value = |raw: &str, what: &str| {
            HeaderValue::from_str(raw).map_err(|e| TransportError::wrap_generic(format!("invalid {what} header value"), e))
        };

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, value(content_type, "content type")?);
        }
        headers.insert(USER_AGENT, value(&self.config.user_agent, "user agent")?);
        if let Some(trace_context) = &self.config.trace_context {
            headers.insert(
                HeaderName::from_static("x-datarobot-api-consumer-trace"),
                value(trace_context, "trace context")?,
            );
        }
        let mut auth = value(&format!("Bearer {}", self.config.token), "authorization")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }

    /// Sends a prepared request and classifies the response.
    pub(crate) async fn send<T: DeserializeOwned>(
        &self,
        method: &Method,
        url: &Url,
        request: RequestBuilder,
        echo: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<Reply<T>, TransportError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::cancelled(format!("{method} {url}"))),
            response = request.send() => response,
        }
        .map_err(|e| {
            warn!(%method, %url, error = %e, "request failed");
            let mut message = format!("{method} request {url} failed: {e}");
            if let Some(echo) = &echo {
                message.push_str(echo);
            }
            TransportError::wrap_generic(message, e)
        })?;

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if response.url() != url {
            let landed = response.url().to_string();
            debug!(%method, %url, %landed, "request was redirected");
            return Err(TransportError::Generic {
                message: format!("{method} request {url} : request was redirected to {landed}"),
                status: Some(status.as_u16()),
                cause: Some(Box::new(Redirected { location: landed })),
            });
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::cancelled(format!("{method} {url}"))),
            body = response.bytes() => body,
        }
        .map_err(|e| TransportError::wrap_generic(format!("failed to read {method} {url} response body"), e))?;

        if self.config.debug {
            debug!(%method, %url, status = status.as_u16(), body = %excerpt(&body), "api call");
        } else {
            debug!(%method, %url, status = status.as_u16(), "api call");
        }

        let url_text = url.as_str();
        let value = classify(&Exchange {
            method,
            url: url_text,
            status,
            body: &body,
            echo: echo.as_deref(),
        })?;

        Ok(Reply {
            value,
            status: status.as_u16(),
            location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> Client {
        Client::new(ClientConfig::new(endpoint, "token")).unwrap()
    }

    #[test]
    fn urls_append_path_and_query() {
        let url = client("https://example.test/api/v2/")
            .url("/datasets/", &[("limit".into(), "100".into()), ("name".into(), "a b".into())])
            .unwrap();
        assert_eq!(url.as_str(), "https://example.test/api/v2/datasets/?limit=100&name=a+b");
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(matches!(
            Client::new(ClientConfig::new("https://example.test", "")),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn relative_endpoint_is_rejected() {
        assert!(matches!(
            Client::new(ClientConfig::new("not a url", "t")),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn standard_headers_include_credential_and_trace_context() {
        let client = Client::new(
            ClientConfig::new("https://example.test", "token").with_trace_context("trace-1"),
        )
        .unwrap();
        let headers = client.standard_headers(Some(JSON)).unwrap();
        assert_eq!(headers[ACCEPT], JSON);
        assert_eq!(headers[CONTENT_TYPE], JSON);
        assert_eq!(headers[AUTHORIZATION], "Bearer token");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert_eq!(headers[TRACE_CONTEXT_HEADER.to_ascii_lowercase().as_str()], "trace-1");
    }

    #[test]
    fn header_rejects_control_characters_in_token() {
        let client = Client::new(ClientConfig::new("https://example.test", "bad\ntoken")).unwrap();
        assert!(client.standard_headers(None).is_err());
    }
}
