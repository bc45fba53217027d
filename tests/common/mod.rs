//! Scripted sources, recording transports and a one-shot HTTP fixture.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use btc_relay_watchdog::check::{CheckPolicy, Watchdog};
use btc_relay_watchdog::notifier::Notifier;
use btc_relay_watchdog::source::{ReferenceChain, RelayTipSource, SourceError};
use btc_relay_watchdog::transport::AlertTransport;
use btc_relay_watchdog::types::{BlockHash, TipRecord};

pub const TIP_HASH: &str = "00000000000000000001a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f7";

pub fn tip_hash() -> BlockHash {
    TIP_HASH.parse().expect("valid test hash")
}

pub fn tip(height: u64) -> TipRecord {
    TipRecord {
        height,
        hash: tip_hash(),
    }
}

pub fn transient() -> SourceError {
    SourceError::transient("getblockcount", "connection refused")
}

pub fn rpc_failure(method: &str) -> SourceError {
    SourceError::Rpc {
        method: method.to_owned(),
        code: -1,
        message: "boom".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Replays scripted results, then answers with `fallback` forever.
pub struct ScriptedRelay {
    script: Mutex<VecDeque<Result<TipRecord, SourceError>>>,
    fallback: TipRecord,
    delay: Option<Duration>,
    panic: bool,
    calls: AtomicUsize,
}

impl ScriptedRelay {
    pub fn healthy(height: u64) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: tip(height),
            delay: None,
            panic: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_script(mut self, script: Vec<Result<TipRecord, SourceError>>) -> Self {
        self.script = Mutex::new(script.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayTipSource for ScriptedRelay {
    async fn tip(&self) -> Result<TipRecord, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        assert!(!self.panic, "relay source exploded");
        let next = self.script.lock().expect("script lock").pop_front();
        next.unwrap_or(Ok(self.fallback))
    }
}

// ---------------------------------------------------------------------------
// Reference chain
// ---------------------------------------------------------------------------

pub struct ScriptedReference {
    heights: Mutex<VecDeque<Result<u64, SourceError>>>,
    fallback_height: u64,
    membership: Mutex<VecDeque<Result<bool, SourceError>>>,
    fallback_membership: bool,
    queried: Mutex<Vec<BlockHash>>,
}

impl ScriptedReference {
    pub fn at(height: u64) -> Self {
        Self {
            heights: Mutex::new(VecDeque::new()),
            fallback_height: height,
            membership: Mutex::new(VecDeque::new()),
            fallback_membership: true,
            queried: Mutex::new(Vec::new()),
        }
    }

    pub fn with_heights(mut self, script: Vec<Result<u64, SourceError>>) -> Self {
        self.heights = Mutex::new(script.into());
        self
    }

    pub fn with_membership(mut self, script: Vec<Result<bool, SourceError>>) -> Self {
        self.membership = Mutex::new(script.into());
        self
    }

    pub fn not_in_main_chain(mut self) -> Self {
        self.fallback_membership = false;
        self
    }

    pub fn queried(&self) -> Vec<BlockHash> {
        self.queried.lock().expect("queried lock").clone()
    }
}

#[async_trait]
impl ReferenceChain for ScriptedReference {
    async fn tip_height(&self) -> Result<u64, SourceError> {
        let next = self.heights.lock().expect("heights lock").pop_front();
        next.unwrap_or(Ok(self.fallback_height))
    }

    async fn is_in_main_chain(&self, hash: &BlockHash) -> Result<bool, SourceError> {
        self.queried.lock().expect("queried lock").push(*hash);
        let next = self.membership.lock().expect("membership lock").pop_front();
        next.unwrap_or(Ok(self.fallback_membership))
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sent lock").len()
    }
}

#[async_trait]
impl AlertTransport for RecordingTransport {
    async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("transport unreachable");
        }
        self.sent
            .lock()
            .expect("sent lock")
            .push((subject.to_owned(), body.to_owned()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Watchdog assembly
// ---------------------------------------------------------------------------

pub struct Harness {
    pub relay: Arc<ScriptedRelay>,
    pub reference: Arc<ScriptedReference>,
    pub transport: Arc<RecordingTransport>,
    pub watchdog: Watchdog,
}

pub fn harness(relay: ScriptedRelay, reference: ScriptedReference) -> Harness {
    harness_with(relay, reference, RecordingTransport::default(), CheckPolicy::default())
}

pub fn harness_with(
    relay: ScriptedRelay,
    reference: ScriptedReference,
    transport: RecordingTransport,
    policy: CheckPolicy,
) -> Harness {
    let relay = Arc::new(relay);
    let reference = Arc::new(reference);
    let transport = Arc::new(transport);
    let notifier = Notifier::new(
        "SOLANA",
        Arc::clone(&transport) as Arc<dyn AlertTransport>,
        Duration::from_secs(3600),
    );
    let watchdog = Watchdog::new(
        "SOLANA",
        Arc::clone(&relay) as Arc<dyn RelayTipSource>,
        Arc::clone(&reference) as Arc<dyn ReferenceChain>,
        notifier,
        policy,
    );
    Harness {
        relay,
        reference,
        transport,
        watchdog,
    }
}

// ---------------------------------------------------------------------------
// HTTP fixture
// ---------------------------------------------------------------------------

/// Serve one HTTP response and hand back the raw request that was received.
pub async fn serve_once(status_line: &str, body: &str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener should expose addr");

    let (request_tx, request_rx) = oneshot::channel();
    let status_line_owned = status_line.to_owned();
    let body_owned = body.to_owned();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status_line_owned}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body_owned}",
                body_owned.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = request_tx.send(request);
        }
    });

    (format!("http://{addr}/"), request_rx)
}

/// An address nothing listens on.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener should expose addr");
    drop(listener);
    format!("http://{addr}/")
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            break;
        };
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&raw);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}
