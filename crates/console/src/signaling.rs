//! Offer/answer exchange over HTTP: the local offer is POSTed as JSON and the
//! response body carries the answer.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, header};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;
use turret_protocol::SessionDescription;

use crate::media::Signaling;

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("signaling endpoint returned HTTP {0}")]
    Status(u16),
    #[error("failed to build signaling request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("signaling request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("failed to read signaling response: {0}")]
    Body(#[from] hyper::Error),
    #[error("invalid session description: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct HttpSignaling {
    endpoint: String,
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HttpSignaling {
    pub fn new(endpoint: impl Into<String>, tls: Arc<rustls::ClientConfig>) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config((*tls).clone())
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }
}

impl Signaling for HttpSignaling {
    async fn exchange(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, SignalingError> {
        let body = serde_json::to_vec(&offer)?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))?;

        let response = self.client.request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();
        debug!(%status, bytes = body.len(), "Signaling response");

        if !status.is_success() {
            return Err(SignalingError::Status(status.as_u16()));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use turret_protocol::SdpKind;

    /// Accept one HTTP request, answer with `status_line` and `body`, and
    /// hand back the raw request text.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/offer", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });
        (url, handle)
    }

    fn signaling(url: String) -> HttpSignaling {
        HttpSignaling::new(url, crate::tls::client_config(None).unwrap())
    }

    #[tokio::test]
    async fn posts_offer_and_parses_answer() {
        let (url, server) = serve_once("200 OK", r#"{"sdp":"v=0 answer","type":"answer"}"#).await;
        let answer = signaling(url)
            .exchange(SessionDescription::offer("v=0 offer"))
            .await
            .unwrap();
        assert_eq!(answer.kind, SdpKind::Answer);
        assert_eq!(answer.sdp, "v=0 answer");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /offer"));
        assert!(request.contains(r#""type":"offer""#));
        assert!(request.contains(r#""sdp":"v=0 offer""#));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (url, _server) = serve_once("503 Service Unavailable", "{}").await;
        let err = signaling(url)
            .exchange(SessionDescription::offer("v=0"))
            .await
            .unwrap_err();
        assert!(matches!(err, SignalingError::Status(503)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn malformed_answer_is_an_error() {
        let (url, _server) = serve_once("200 OK", r#"{"sdp":42}"#).await;
        let err = signaling(url)
            .exchange(SessionDescription::offer("v=0"))
            .await
            .unwrap_err();
        assert!(matches!(err, SignalingError::Json(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = signaling(format!("http://{addr}/offer"))
            .exchange(SessionDescription::offer("v=0"))
            .await
            .unwrap_err();
        assert!(matches!(err, SignalingError::Transport(_)));
    }
}
