use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use super::{HmrAsset, HmrError, HmrMessage};
use crate::asset::AssetType;
use crate::{Error, Result};

/// Messages buffered per client before new ones are dropped for it.
const CLIENT_BUFFER: usize = 100;

/// Connected live-update clients and the unresolved build error.
///
/// Cheap to clone; clones share the same client set.
#[derive(Clone)]
pub struct HmrServer {
    inner: Arc<Inner>,
}

struct Inner {
    path: String,
    clients: RwLock<HashMap<usize, mpsc::Sender<String>>>,
    next_client_id: Mutex<usize>,
    pending_error: Mutex<Option<HmrMessage>>,
}

impl HmrServer {
    /// Create a server answering event-stream requests on `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                clients: RwLock::new(HashMap::new()),
                next_client_id: Mutex::new(0),
                pending_error: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Register a client. An unresolved error is queued for it right away.
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = {
            let mut next_id = self.inner.next_client_id.lock();
            let id = *next_id;
            *next_id += 1;
            id
        };

        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        // held until the client is in the set, so an error is either replayed
        // here or broadcast to it, never both or neither
        let pending = self.inner.pending_error.lock();
        if let Some(error) = pending.as_ref() {
            let _ = tx.try_send(error.to_json());
        }
        self.inner.clients.write().insert(id, tx);
        drop(pending);

        tracing::debug!("HMR client {} connected", id);
        (id, rx)
    }

    pub fn unregister_client(&self, id: usize) {
        self.inner.clients.write().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.read().len()
    }

    /// The error replayed to clients connecting now, if any.
    pub fn pending_error(&self) -> Option<HmrMessage> {
        self.inner.pending_error.lock().clone()
    }

    /// Send a message to every client.
    ///
    /// Clients whose stream has gone away are dropped; a client that is not
    /// keeping up misses this message but stays connected.
    pub fn broadcast(&self, message: &HmrMessage) {
        let data = message.to_json();
        let clients: Vec<_> = self
            .inner
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut gone = Vec::new();
        for (id, tx) in clients {
            match tx.try_send(data.clone()) {
                Ok(()) => {}
                Err(TrySendError::Closed(_)) => gone.push(id),
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("HMR client {} is not keeping up, dropping message", id);
                }
            }
        }

        if !gone.is_empty() {
            let mut clients = self.inner.clients.write();
            for id in gone {
                tracing::debug!("HMR client {} disconnected", id);
                clients.remove(&id);
            }
        }
    }

    /// Announce the outcome of a clean pass.
    ///
    /// Clears a pending error first. A reload is sent instead of the update
    /// when asked for, or when a markup document changed.
    pub fn emit_update(&self, assets: Vec<HmrAsset>, reload: bool) {
        {
            let mut pending = self.inner.pending_error.lock();
            if pending.take().is_some() {
                self.broadcast(&HmrMessage::ErrorResolved);
            }
        }

        if reload || assets.iter().any(|asset| asset.asset_type == AssetType::Html) {
            tracing::info!("Reloading connected clients");
            self.broadcast(&HmrMessage::Reload);
        } else if !assets.is_empty() {
            tracing::info!("Sending update for {} module(s)", assets.len());
            self.broadcast(&HmrMessage::Update { assets });
        }
    }

    /// Report a failed pass and keep it for clients connecting later.
    pub fn emit_error(&self, err: &Error) {
        let message = HmrMessage::Error {
            error: HmrError::from(err),
        };
        let mut pending = self.inner.pending_error.lock();
        *pending = Some(message.clone());
        self.broadcast(&message);
    }

    /// Router serving the event stream on the configured path.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.inner.path, get(handle_events))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(self.clone())
    }

    /// Serve [`Self::router`] on `addr` in a background task.
    ///
    /// Returns the bound address, so port `0` picks a free one.
    pub async fn listen(&self, addr: SocketAddr) -> Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Server(format!("failed to bind {addr}: {e}")))?;
        let local = listener
            .local_addr()
            .map_err(|e| Error::Server(e.to_string()))?;

        let app = self.router();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("HMR server stopped: {}", e);
            }
        });

        tracing::info!("HMR server listening on {}", local);
        Ok(local)
    }
}

async fn handle_events(
    State(server): State<HmrServer>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (_id, rx) = server.register_client();
    let stream = ReceiverStream::new(rx).map(|data| Ok(Event::default().data(data)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
