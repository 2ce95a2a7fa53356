//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Canned response served by the mock upstream.
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn binary(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            body,
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(head: &str) -> Option<usize> {
    head.lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse().ok())
}

/// Start a mock upstream backend. The handler receives the raw request
/// (request line, headers, and any body) and returns the response to serve.
pub async fn start_mock_upstream<F>(addr: SocketAddr, handler: F)
where
    F: Fn(String) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let mut data = Vec::new();
                        let mut chunk = [0u8; 1024];

                        let head_end = loop {
                            if let Some(i) = find(&data, b"\r\n\r\n") {
                                break i + 4;
                            }
                            match socket.read(&mut chunk).await {
                                Ok(0) => return,
                                Ok(n) => data.extend_from_slice(&chunk[..n]),
                                Err(_) => return,
                            }
                        };

                        // Drain the body so handlers can assert on it.
                        let head = String::from_utf8_lossy(&data[..head_end]).to_ascii_lowercase();
                        if head.contains("transfer-encoding: chunked") {
                            while find(&data[head_end..], b"0\r\n\r\n").is_none() {
                                match socket.read(&mut chunk).await {
                                    Ok(0) => break,
                                    Ok(n) => data.extend_from_slice(&chunk[..n]),
                                    Err(_) => return,
                                }
                            }
                        } else if let Some(length) = content_length(&head) {
                            while data.len() < head_end + length {
                                match socket.read(&mut chunk).await {
                                    Ok(0) => break,
                                    Ok(n) => data.extend_from_slice(&chunk[..n]),
                                    Err(_) => return,
                                }
                            }
                        }

                        let response = handler(String::from_utf8_lossy(&data).into_owned());
                        let status_text = match response.status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let header = format!(
                            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            status_text,
                            response.content_type,
                            response.body.len(),
                        );
                        let _ = socket.write_all(header.as_bytes()).await;
                        let _ = socket.write_all(&response.body).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}
