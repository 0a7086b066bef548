//! Test fixtures: sample headers and an in-process mock peer

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::header::{Header, Identifier, IDENTIFIER_LEN};
use crate::peer::HeaderListResponse;

/// Identifier `02` followed by 32 copies of `seed`
pub(crate) fn sample_identifier(seed: u8) -> Identifier {
    let mut bytes = [seed; IDENTIFIER_LEN];
    bytes[0] = 0x02;
    Identifier::from_bytes(bytes)
}

/// Well-formed V1 string; `expire < time` is allowed so tests can build rejects
pub(crate) fn sample_header(time: u32, expire: u32, seed: u8) -> String {
    format!(
        "M0100:{:08x}:{:08x}:{}:03{}:02{}:{}:{}",
        time,
        expire,
        sample_identifier(seed).to_hex(),
        hex::encode([seed ^ 0x5a; 32]),
        hex::encode([seed.wrapping_add(1); 32]),
        hex::encode([seed ^ 0xa5; 32]),
        hex::encode([!seed; 32]),
    )
}

/// A local port nothing is listening on
pub(crate) fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// How the mock peer answers listing requests
#[derive(Clone, Debug, Default)]
pub(crate) enum PeerMode {
    #[default]
    Normal,
    /// 200 with a body that is not JSON
    Garbage,
    /// Answer normally after a delay
    Stall(Duration),
    Status(u16),
}

#[derive(Clone, Default)]
struct PeerState {
    headers: Arc<Mutex<Vec<String>>>,
    mode: Arc<Mutex<PeerMode>>,
}

/// Serves `GET /api/header/list/since/{since}` from a list of strings
pub(crate) struct MockPeer {
    addr: SocketAddr,
    state: PeerState,
    task: JoinHandle<()>,
}

impl MockPeer {
    pub(crate) async fn spawn() -> Self {
        let state = PeerState::default();
        let app = Router::new()
            .route("/api/header/list/since/{since}", get(list_since))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, task }
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    pub(crate) fn push(&self, header: String) {
        self.state.headers.lock().unwrap().push(header);
    }

    pub(crate) fn set_mode(&self, mode: PeerMode) {
        *self.state.mode.lock().unwrap() = mode;
    }
}

impl Drop for MockPeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn list_since(State(state): State<PeerState>, Path(since): Path<u32>) -> Response {
    let mode = state.mode.lock().unwrap().clone();
    match mode {
        PeerMode::Garbage => return (StatusCode::OK, "<html>not a listing</html>").into_response(),
        PeerMode::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap();
            return (status, "peer unavailable").into_response();
        }
        PeerMode::Stall(delay) => tokio::time::sleep(delay).await,
        PeerMode::Normal => {}
    }

    // malformed strings are listed regardless of `since`
    let header_list = state
        .headers
        .lock()
        .unwrap()
        .iter()
        .filter(|s| Header::deserialize(s).map_or(true, |h| h.time() >= since))
        .cloned()
        .collect();
    Json(HeaderListResponse { header_list }).into_response()
}
