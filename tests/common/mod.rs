#![allow(dead_code)]

use paygate::domain::payment::AccountProperties;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// How the fake provider answers one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Success,
    Failure(&'static str),
    Malformed,
    /// Waits before answering successfully; long enough for the client to give up.
    Stall(Duration),
    /// Answers successfully after a short pause, keeping the request in flight.
    Slow(Duration),
}

#[derive(Default)]
struct Stats {
    hits: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

/// A scripted stand-in for the provider's `/external/process` endpoint.
///
/// The n-th request gets the n-th reply of the script; once the script runs
/// out the last reply is repeated.
pub struct FakeProvider {
    host_port: String,
    stats: Arc<Stats>,
}

impl FakeProvider {
    pub async fn start(script: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host_port = listener.local_addr().unwrap().to_string();
        let stats = Arc::new(Stats::default());
        let script = Arc::new(script);

        let server_stats = Arc::clone(&stats);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let stats = Arc::clone(&server_stats);
                let script = Arc::clone(&script);
                tokio::spawn(serve(stream, stats, script));
            }
        });

        Self { host_port, stats }
    }

    pub fn host_port(&self) -> &str {
        &self.host_port
    }

    pub fn hits(&self) -> usize {
        self.stats.hits.load(Ordering::SeqCst)
    }

    /// Most requests observed in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }

    /// Request lines received so far, e.g. `POST /external/process?... HTTP/1.1`.
    pub fn requests(&self) -> Vec<String> {
        self.stats.requests.lock().unwrap().clone()
    }
}

async fn serve(mut stream: TcpStream, stats: Arc<Stats>, script: Arc<Vec<Reply>>) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buffer.windows(4).any(|window| window == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }

    let request = String::from_utf8_lossy(&buffer);
    let request_line = request.lines().next().unwrap_or_default().to_string();
    stats.requests.lock().unwrap().push(request_line);

    let index = stats.hits.fetch_add(1, Ordering::SeqCst);
    let reply = script
        .get(index)
        .or_else(|| script.last())
        .cloned()
        .unwrap_or(Reply::Success);

    let current = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    stats.peak.fetch_max(current, Ordering::SeqCst);

    let body = match reply {
        Reply::Success => response_body(true, None),
        Reply::Failure(message) => response_body(false, Some(message)),
        Reply::Malformed => "not json at all".to_string(),
        Reply::Stall(pause) | Reply::Slow(pause) => {
            tokio::time::sleep(pause).await;
            response_body(true, None)
        }
    };
    stats.in_flight.fetch_sub(1, Ordering::SeqCst);

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn response_body(result: bool, message: Option<&str>) -> String {
    serde_json::json!({
        "transactionId": "fake-transaction",
        "paymentId": "fake-payment",
        "result": result,
        "message": message,
    })
    .to_string()
}

/// Account whose calls time out after 300ms (three times the average processing time).
pub fn fast_account() -> AccountProperties {
    AccountProperties {
        service_name: "onlineStore".to_string(),
        account_name: "acc-test".to_string(),
        average_processing_time_ms: 100,
        ..AccountProperties::default()
    }
}
