//! The `http` operation

use async_trait::async_trait;
use reqwest::{Client, Request};
use tokio::time::Instant;
use tracing::debug;
use volley_core::{OpResult, Operation, OperationConfig, OperationError};

use crate::config::HttpConfig;

/// Issues one prepared HTTP request per call
///
/// The client is built by the factory; the request is validated and prepared
/// once in `init` and cloned for every call. Any response is a success; only
/// transport errors (connect, timeout, body read) are failures.
pub struct HttpOperation {
    config: HttpConfig,
    client: Client,
    request: Option<Request>,
}

impl HttpOperation {
    pub const NAME: &'static str = "http";

    /// Registry factory
    pub fn factory(config: &OperationConfig) -> Result<Box<dyn Operation>, OperationError> {
        Ok(Box::new(Self::new(HttpConfig::from_map(config)?)?))
    }

    pub fn new(config: HttpConfig) -> Result<Self, OperationError> {
        let client = config.client()?;
        Ok(Self {
            config,
            client,
            request: None,
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

#[async_trait]
impl Operation for HttpOperation {
    async fn init(&mut self) -> Result<(), OperationError> {
        let url = self.config.url()?;
        let method = self.config.method()?;
        let headers = self.config.headers()?;

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = &self.config.body {
            builder = builder.body(body.clone());
        }
        let request = builder
            .build()
            .map_err(|e| OperationError::Setup(e.to_string()))?;

        debug!("Prepared {} {}", request.method(), request.url());
        self.request = Some(request);
        Ok(())
    }

    async fn call(&mut self, _base: usize, _index: usize, _n: usize) -> OpResult {
        let start = Instant::now();

        let Some(request) = self.request.as_ref().and_then(Request::try_clone) else {
            return OpResult::failure("request not prepared", start.elapsed());
        };

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => return OpResult::failure(e.to_string(), start.elapsed()),
        };

        let status = i32::from(response.status().as_u16());
        let declared = response.content_length();
        match response.bytes().await {
            Ok(body) => {
                let length = declared.unwrap_or(body.len() as u64);
                OpResult::success(status, start.elapsed(), length as i64)
            }
            Err(e) => OpResult::failure(e.to_string(), start.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn operation(config: serde_json::Value) -> HttpOperation {
        let config = HttpConfig::from_map(config.as_object().unwrap()).unwrap();
        let mut op = HttpOperation::new(config).unwrap();
        op.init().await.unwrap();
        op
    }

    #[tokio::test]
    async fn test_get_reports_status_and_length() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .match_header("content-type", "text/html")
            .with_status(200)
            .with_body("pong")
            .expect(3)
            .create_async()
            .await;

        let mut op = operation(json!({ "url": format!("{}/ping", server.url()) })).await;
        for i in 0..3 {
            let result = op.call(0, i, 3).await;
            assert!(result.is_success(), "{:?}", result.error);
            assert_eq!(result.status_code, 200);
            assert_eq!(result.content_length, 4);
            assert_eq!(result.count, 1);
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_sends_body_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/items")
            .match_header("content-type", "application/json")
            .match_header("accept", "application/json")
            .match_body(r#"{"id":1}"#)
            .with_status(201)
            .create_async()
            .await;

        let mut op = operation(json!({
            "url": format!("{}/items", server.url()),
            "method": "post",
            "Content-Type": "application/json",
            "Accept": "application/json",
            "body": r#"{"id":1}"#
        }))
        .await;

        let result = op.call(0, 0, 1).await;
        assert_eq!(result.status_code, 201);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let mut op = operation(json!({ "url": format!("{}/missing", server.url()) })).await;
        let result = op.call(0, 0, 1).await;

        assert!(result.is_success());
        assert_eq!(result.status_code, 404);
    }

    #[tokio::test]
    async fn test_connection_error_is_failure() {
        let mut op = operation(json!({ "url": "http://127.0.0.1:1/", "timeout": 2 })).await;
        let result = op.call(0, 0, 1).await;

        assert!(!result.is_success());
        assert_eq!(result.content_length, -1);
    }

    #[tokio::test]
    async fn test_init_requires_url() {
        let mut op = HttpOperation::new(HttpConfig::default()).unwrap();
        assert_eq!(
            op.init().await,
            Err(OperationError::MissingKey("url".to_string()))
        );
    }
}
