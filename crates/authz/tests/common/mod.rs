//! A minimal HTTP server standing in for the identity provider's JWKS endpoint.

#![allow(dead_code, clippy::expect_used)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};

/// How the stub answers every request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// `200 OK` with a JSON body.
    Json(String),
    /// An arbitrary status with an empty body.
    Status(u16),
    /// Accept the request and never answer.
    Stall,
}

/// A running stub endpoint. Aborted on drop.
pub struct JwksServer {
    url: String,
    requests: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl JwksServer {
    /// Binds an ephemeral local port and serves `reply` at `/.well-known/jwks.json`.
    pub async fn start(reply: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub server");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let reply = reply.clone();

                tokio::spawn(async move {
                    let mut buf = [0_u8; 4096];
                    let _ = stream.read(&mut buf).await;

                    let response = match reply {
                        Reply::Json(body) => format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                            body.len()
                        ),
                        Reply::Status(status) => format!(
                            "HTTP/1.1 {status} Stub\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        ),
                        Reply::Stall => {
                            tokio::time::sleep(Duration::from_secs(3600)).await;
                            return;
                        },
                    };
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { url: format!("http://{addr}/.well-known/jwks.json"), requests, handle }
    }

    /// The JWKS URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connections accepted so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for JwksServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
