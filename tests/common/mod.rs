//! Shared helpers for the integration tests.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One `data: ` frame carrying `piece` as delta content.
pub fn delta_frame(piece: &str) -> String {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": piece } }] });
    format!("data: {payload}\n\n")
}

/// A provider that answers every connection with a chunked event stream,
/// sends the given frames and then goes silent without closing.
///
/// Returns the base URL; any path is accepted.
pub async fn stalling_provider(frames: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stalling provider");
    let addr = listener.local_addr().expect("No local addr");
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let frames = frames.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(read) => request.extend_from_slice(&buf[..read]),
                    }
                }

                let mut response = String::from(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
                );
                for frame in &frames {
                    response.push_str(&format!("{:x}\r\n{frame}\r\n", frame.len()));
                }
                if socket.write_all(response.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    format!("http://{addr}")
}
