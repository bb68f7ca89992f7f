use std::time::{Duration, Instant};

use bytes::Bytes;
use http::Method;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::HttpCfg;
use crate::error::{CoreResult, ForgeError};
use crate::sse::ByteStream;

/// Body stream of an event-stream response.
pub type BodyStream = ByteStream<reqwest::Error>;

/// Thin wrapper around reqwest::Client with defaults and helpers.
/// No retries at this layer; callers that want them (the container poller) add them.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms));
        if let Some(ms) = cfg.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(n) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let inner = builder
            .build()
            .map_err(|e| ForgeError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: "forge-client/0.1".to_string(),
        })
    }

    pub fn new_default() -> CoreResult<Self> {
        Self::new(&HttpCfg::default())
    }

    fn build(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
    ) -> reqwest::RequestBuilder {
        let overrides_content_type = headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
        let mut req = self
            .inner
            .request(method, url)
            .header("User-Agent", &self.user_agent);
        if !overrides_content_type {
            req = req.header("Content-Type", "application/json");
        }
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        req
    }

    /// Send a request with an optional JSON body and decode a JSON reply.
    pub async fn request_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&T>,
        headers: &[(&str, &str)],
    ) -> CoreResult<R> {
        let start = Instant::now();
        let mut req = self.build(method.clone(), url, headers);
        if let Some(b) = body {
            let encoded = serde_json::to_vec(b)
                .map_err(|e| ForgeError::Validation(format!("request body encode error: {e}")))?;
            req = req.body(encoded);
        }

        let resp = req.send().await.map_err(network_error)?;
        let status = resp.status();
        tracing::debug!(
            %method,
            url,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "http request"
        );

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(status, &text));
        }

        let bytes = resp.bytes().await.map_err(network_error)?;
        serde_json::from_slice::<R>(&bytes)
            .map_err(|e| ForgeError::Protocol(format!("json decode error: {e}")))
    }

    pub async fn get_json<R: DeserializeOwned>(&self, url: &str) -> CoreResult<R> {
        self.request_json::<(), R>(Method::GET, url, None, &[]).await
    }

    pub async fn post_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
    ) -> CoreResult<R> {
        self.request_json(Method::POST, url, Some(body), &[]).await
    }

    pub async fn put_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
    ) -> CoreResult<R> {
        self.request_json(Method::PUT, url, Some(body), &[]).await
    }

    pub async fn delete_json<R: DeserializeOwned>(&self, url: &str) -> CoreResult<R> {
        self.request_json::<(), R>(Method::DELETE, url, None, &[]).await
    }

    /// POST JSON and return the raw body of an event-stream response.
    /// Status is checked before any byte of the body is handed out.
    pub async fn post_event_stream<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> CoreResult<BodyStream> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| ForgeError::Validation(format!("request body encode error: {e}")))?;
        let resp = self
            .build(Method::POST, url, &[("Accept", "text/event-stream")])
            .body(encoded)
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let byte_stream: futures::stream::BoxStream<'static, Result<Bytes, reqwest::Error>> =
            Box::pin(resp.bytes_stream());
        Ok(byte_stream)
    }
}

fn network_error(e: reqwest::Error) -> ForgeError {
    ForgeError::Network {
        cause: e.to_string(),
    }
}

fn map_http_error(status: StatusCode, body: &str) -> ForgeError {
    ForgeError::Http {
        status: status.as_u16(),
        body: truncate(body, 300),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        let mut t = s[..cut].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use httpmock::Method::{DELETE, GET, POST, PUT};
    use httpmock::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn post_json_success_sets_json_content_type() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/api/echo")
                .header("content-type", "application/json")
                .json_body(json!({"msg": "hi"}));
            then.status(200).json_body(json!({"ok": true}));
        });

        #[derive(serde::Deserialize)]
        struct Resp {
            ok: bool,
        }

        let client = HttpClient::new_default().unwrap();
        let resp: Resp = client
            .post_json(&format!("{}/api/echo", server.base_url()), &json!({"msg": "hi"}))
            .await
            .unwrap();
        assert!(resp.ok);
        m.assert();
    }

    #[tokio::test]
    async fn caller_can_override_content_type() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(PUT)
                .path("/raw")
                .header("content-type", "application/merge-patch+json");
            then.status(200).json_body(json!({}));
        });
        let client = HttpClient::new_default().unwrap();
        let _: serde_json::Value = client
            .request_json(
                Method::PUT,
                &format!("{}/raw", server.base_url()),
                Some(&json!({"a": 1})),
                &[("Content-Type", "application/merge-patch+json")],
            )
            .await
            .unwrap();
        m.assert();
    }

    #[tokio::test]
    async fn get_and_delete_without_body() {
        let server = MockServer::start();
        let g = server.mock(|when, then| {
            when.method(GET).path("/api/thing");
            then.status(200).json_body(json!({"n": 1}));
        });
        let d = server.mock(|when, then| {
            when.method(DELETE).path("/api/thing");
            then.status(200).json_body(json!({"n": 2}));
        });
        let client = HttpClient::new_default().unwrap();
        let url = format!("{}/api/thing", server.base_url());
        let a: serde_json::Value = client.get_json(&url).await.unwrap();
        let b: serde_json::Value = client.delete_json(&url).await.unwrap();
        assert_eq!(a["n"], 1);
        assert_eq!(b["n"], 2);
        g.assert();
        d.assert();
    }

    #[tokio::test]
    async fn non_2xx_maps_to_http_error_with_body() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/api/echo");
            then.status(429).body("slow down");
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                &format!("{}/api/echo", server.base_url()),
                &json!({"msg": "hi"}),
            )
            .await
            .unwrap_err();
        match err {
            ForgeError::Http { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("expected Http, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn bad_json_maps_to_protocol_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/api/echo");
            then.status(200).body("not-json");
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .get_json::<serde_json::Value>(&format!("{}/api/echo", server.base_url()))
            .await
            .unwrap_err();
        match err {
            ForgeError::Protocol(message) => assert!(message.starts_with("json decode error")),
            other => panic!("expected Protocol, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn error_body_is_truncated() {
        let server = MockServer::start();
        let big = "x".repeat(1000);
        let _m = server.mock(|when, then| {
            when.method(GET).path("/api/echo");
            then.status(400).body(big.clone());
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .get_json::<serde_json::Value>(&format!("{}/api/echo", server.base_url()))
            .await
            .unwrap_err();
        match err {
            ForgeError::Http { body, .. } => {
                assert!(body.ends_with("..."));
                assert!(body.len() <= 303);
            }
            other => panic!("expected Http, got: {:?}", other),
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "\u{e9}".repeat(200); // 400 bytes
        let t = truncate(&s, 301);
        assert!(t.ends_with("..."));
        assert_eq!(t.len(), 300 + 3);
    }

    #[tokio::test]
    async fn network_error_maps_to_network() {
        let client = HttpClient::new_default().expect("client");
        let url = "http://127.0.0.1:9/api/echo"; // port 9 (discard) is typically closed
        let err = client
            .get_json::<serde_json::Value>(url)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Network { .. }));
    }

    #[tokio::test]
    async fn event_stream_returns_raw_body() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/api/llm/chat")
                .header("accept", "text/event-stream");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("data: {\"done\":true}\n");
        });
        let client = HttpClient::new_default().unwrap();
        let mut body = client
            .post_event_stream(
                &format!("{}/api/llm/chat", server.base_url()),
                &json!({"message": "hi", "provider": "gpt4"}),
            )
            .await
            .unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"data: {\"done\":true}\n");
        m.assert();
    }

    #[tokio::test]
    async fn event_stream_checks_status_first() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/api/llm/chat");
            then.status(400).json_body(json!({"error": "Invalid provider"}));
        });
        let client = HttpClient::new_default().unwrap();
        let err = client
            .post_event_stream(&format!("{}/api/llm/chat", server.base_url()), &json!({}))
            .await
            .err()
            .expect("should fail");
        assert_eq!(err.status(), Some(400));
    }
}
