//! HTTP operation configuration
//!
//! Keys use the JSON names operators already write in their config files,
//! e.g. `Content-Type` and `disableKeepAlives`.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, HOST};
use reqwest::{Client, Method, Proxy, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use volley_core::{OperationConfig, OperationError};

/// Idle connections kept per host
pub const MAX_IDLE_PER_HOST: usize = 2;

pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Errors raised while preparing the HTTP client or request
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("missing required config key `url`")]
    MissingUrl,

    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid method `{0}`")]
    InvalidMethod(String),

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    #[error("invalid proxy `{url}`: {reason}")]
    InvalidProxy { url: String, reason: String },

    #[error("invalid timeout: {0}")]
    InvalidTimeout(f64),

    #[error("failed to build client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<HttpError> for OperationError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::MissingUrl => OperationError::MissingKey("url".to_string()),
            HttpError::InvalidUrl { reason, .. } => invalid("url", reason),
            HttpError::InvalidMethod(method) => invalid("method", format!("`{method}`")),
            HttpError::InvalidHeader { name, reason } => invalid(name, reason),
            HttpError::InvalidProxy { reason, .. } => invalid("proxy", reason),
            HttpError::InvalidTimeout(secs) => invalid("timeout", secs.to_string()),
            HttpError::Config(e) => invalid("http", e.to_string()),
            HttpError::Client(e) => OperationError::Setup(e.to_string()),
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> OperationError {
    OperationError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Configuration of the `http` operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Target URL (required)
    pub url: Option<String>,

    /// Request method, upper-cased before use (default `GET`)
    pub method: Option<String>,

    #[serde(rename = "Content-Type")]
    pub content_type: Option<String>,

    #[serde(rename = "Accept")]
    pub accept: Option<String>,

    /// Request body sent with every call
    pub body: Option<String>,

    /// Host header override
    pub host: Option<String>,

    /// Proxy URL for every scheme
    pub proxy: Option<String>,

    #[serde(rename = "disableCompression", default)]
    pub disable_compression: bool,

    /// Do not keep idle connections between calls
    #[serde(rename = "disableKeepAlives", default)]
    pub disable_keep_alives: bool,

    /// Allow HTTP/2; when false only HTTP/1.1 is spoken
    #[serde(default)]
    pub h2: bool,

    /// Whole-request timeout in seconds, 0 for none
    #[serde(default)]
    pub timeout: f64,
}

impl HttpConfig {
    pub fn from_map(config: &OperationConfig) -> Result<Self, HttpError> {
        Ok(serde_json::from_value(serde_json::Value::Object(
            config.clone(),
        ))?)
    }

    /// Build the shared client from the transport settings
    pub fn client(&self) -> Result<Client, HttpError> {
        let mut builder = Client::builder()
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(if self.disable_keep_alives {
                0
            } else {
                MAX_IDLE_PER_HOST
            });

        if self.disable_compression {
            builder = builder.no_gzip();
        }
        if !self.h2 {
            builder = builder.http1_only();
        }
        if let Some(timeout) = self.timeout()? {
            builder = builder.timeout(timeout);
        }
        if let Some(proxy) = &self.proxy {
            let proxy = Proxy::all(proxy.as_str()).map_err(|e| HttpError::InvalidProxy {
                url: proxy.clone(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        Ok(builder.build()?)
    }

    pub fn timeout(&self) -> Result<Option<Duration>, HttpError> {
        if !self.timeout.is_finite() || self.timeout < 0.0 {
            return Err(HttpError::InvalidTimeout(self.timeout));
        }
        if self.timeout == 0.0 {
            return Ok(None);
        }
        Ok(Some(Duration::from_secs_f64(self.timeout)))
    }

    pub fn method(&self) -> Result<Method, HttpError> {
        let method = self.method.as_deref().unwrap_or("GET").to_uppercase();
        Method::from_bytes(method.as_bytes()).map_err(|_| HttpError::InvalidMethod(method))
    }

    pub fn url(&self) -> Result<Url, HttpError> {
        let url = self.url.as_deref().ok_or(HttpError::MissingUrl)?;
        Url::parse(url).map_err(|e| HttpError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn headers(&self) -> Result<HeaderMap, HttpError> {
        let mut headers = HeaderMap::new();
        let content_type = self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        headers.insert(CONTENT_TYPE, header_value("Content-Type", content_type)?);
        if let Some(accept) = self.accept.as_deref().filter(|a| !a.is_empty()) {
            headers.insert(ACCEPT, header_value("Accept", accept)?);
        }
        if let Some(host) = self.host.as_deref().filter(|h| !h.is_empty()) {
            headers.insert(HOST, header_value("host", host)?);
        }
        Ok(headers)
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, HttpError> {
    HeaderValue::from_str(value).map_err(|e| HttpError::InvalidHeader {
        name,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> HttpConfig {
        HttpConfig::from_map(value.as_object().unwrap()).unwrap()
    }

    #[test]
    fn test_json_key_names() {
        let config = parse(json!({
            "url": "http://localhost:8080/ping",
            "method": "post",
            "Content-Type": "application/json",
            "Accept": "application/json",
            "disableKeepAlives": true,
            "disableCompression": true,
            "h2": true,
            "timeout": 5
        }));

        assert_eq!(config.method().unwrap(), Method::POST);
        assert!(config.disable_keep_alives);
        assert!(config.disable_compression);
        assert!(config.h2);
        assert_eq!(config.timeout().unwrap(), Some(Duration::from_secs(5)));

        let headers = config.headers().unwrap();
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[ACCEPT], "application/json");
    }

    #[test]
    fn test_defaults() {
        let config = parse(json!({ "url": "http://localhost" }));
        assert_eq!(config.method().unwrap(), Method::GET);
        assert_eq!(config.timeout().unwrap(), None);
        assert_eq!(config.headers().unwrap()[CONTENT_TYPE], DEFAULT_CONTENT_TYPE);
        assert!(config.client().is_ok());
    }

    #[test]
    fn test_missing_url() {
        let config = parse(json!({}));
        let err: OperationError = config.url().unwrap_err().into();
        assert_eq!(err, OperationError::MissingKey("url".to_string()));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            parse(json!({ "url": "not a url" })).url(),
            Err(HttpError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse(json!({ "method": "GE T" })).method(),
            Err(HttpError::InvalidMethod(_))
        ));
        assert!(matches!(
            parse(json!({ "timeout": -1 })).timeout(),
            Err(HttpError::InvalidTimeout(_))
        ));
        assert!(HttpConfig::from_map(json!({ "h2": "yes" }).as_object().unwrap()).is_err());
    }
}
