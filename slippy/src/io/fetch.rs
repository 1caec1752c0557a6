//! Asynchronous fetching loop with bounded concurrency and generation-based cancellation.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use futures::{
    SinkExt, StreamExt,
    channel::mpsc::{Receiver, Sender},
    future::{Either, select, select_all},
};

use crate::{TileId, loader::Stats, texture::Texture};

/// Host hook asking for a new frame when an asset arrives between ticks.
pub trait Repaint: Send + Sync {
    fn request_repaint(&self);
}

/// Transport abstraction: fetch raw bytes for a URL. [`crate::HttpFetch`] is the stock
/// implementation; tests and exotic hosts provide their own.
pub trait Fetch {
    type Error: std::error::Error + Sync + Send;

    #[cfg(target_arch = "wasm32")]
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Bytes, Self::Error>>;

    #[cfg(not(target_arch = "wasm32"))]
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Bytes, Self::Error>> + Send;

    /// Maximum number of fetches running at once. Also sizes the request channel, so newer
    /// requests are prioritized over a long backlog.
    fn max_concurrency(&self) -> usize;
}

/// What an [`AssetRequest`] is for, and the cache key the result lands under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetKey {
    Tile(TileId),
    Icon(String),
}

/// A single fetch order from the map thread to the IO thread.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub key: AssetKey,
    pub url: String,

    /// Cancellation stamp. Results whose stamp no longer matches the shared counter are
    /// dropped instead of delivered.
    pub generation: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Request channel from the main thread was broken.")]
    RequestChannelBroken,

    #[error("Asset channel to the main thread was broken.")]
    AssetChannelClosed,

    #[error("Asset channel to the main thread was full.")]
    AssetChannelFull,

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error(transparent)]
    Decode(#[from] image::ImageError),

    #[error("Poison error.")]
    Poisoned,
}

impl From<futures::channel::mpsc::SendError> for Error {
    fn from(error: futures::channel::mpsc::SendError) -> Self {
        if error.is_disconnected() {
            Error::AssetChannelClosed
        } else {
            Error::AssetChannelFull
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::Poisoned
    }
}

/// Download and decode a single asset.
async fn fetch_and_decode(
    fetch: &impl Fetch,
    request: AssetRequest,
) -> (AssetRequest, Result<Texture, Error>) {
    let result = fetch_and_decode_impl(fetch, &request).await;
    (request, result)
}

async fn fetch_and_decode_impl(
    fetch: &impl Fetch,
    request: &AssetRequest,
) -> Result<Texture, Error> {
    let bytes = fetch
        .fetch(&request.url)
        .await
        .map_err(|e| Error::Fetch(e.to_string()))?;
    Ok(Texture::from_bytes(&bytes)?)
}

/// Deliver a finished fetch to the main thread, unless it was superseded in the meantime.
/// Failures are delivered as `None` so the placeholder gets cleared and the asset can be
/// re-requested when it becomes visible again.
async fn fetch_complete(
    mut asset_tx: Sender<(AssetRequest, Option<Arc<Texture>>)>,
    repaint: Option<Arc<dyn Repaint>>,
    generation: &AtomicU64,
    (request, result): (AssetRequest, Result<Texture, Error>),
) -> Result<(), Error> {
    if request.generation != generation.load(Ordering::SeqCst) {
        log::trace!("Dropping superseded result for {:?}.", request.key);
        return Ok(());
    }

    let texture = match result {
        Ok(texture) => Some(Arc::new(texture)),
        Err(e) => {
            log::warn!("Failed to fetch {:?}: {e}", request.key);
            None
        }
    };

    asset_tx.send((request, texture)).await.map_err(Error::from)?;

    if let Some(repaint) = &repaint {
        repaint.request_repaint();
    }

    Ok(())
}

async fn fetch_continuously_impl(
    fetch: impl Fetch,
    stats: Arc<Mutex<Stats>>,
    generation: Arc<AtomicU64>,
    mut request_rx: Receiver<AssetRequest>,
    asset_tx: Sender<(AssetRequest, Option<Arc<Texture>>)>,
    repaint: Option<Arc<dyn Repaint>>,
) -> Result<(), Error> {
    let mut outstanding = Vec::new();

    loop {
        if outstanding.is_empty() {
            // Only new fetches might be requested.
            let request = request_rx.next().await.ok_or(Error::RequestChannelBroken)?;
            if request.generation == generation.load(Ordering::SeqCst) {
                outstanding.push(Box::pin(fetch_and_decode(&fetch, request)));
            }
        } else if outstanding.len() < fetch.max_concurrency() {
            // New fetches might be requested or ongoing ones might be completed.
            match select(request_rx.next(), select_all(outstanding.drain(..))).await {
                // New fetch was requested.
                Either::Left((request, remaining)) => {
                    let request = request.ok_or(Error::RequestChannelBroken)?;
                    outstanding = remaining.into_inner();
                    if request.generation == generation.load(Ordering::SeqCst) {
                        outstanding.push(Box::pin(fetch_and_decode(&fetch, request)));
                    }
                }
                // Ongoing fetch was completed.
                Either::Right(((result, _, remaining), _)) => {
                    fetch_complete(asset_tx.to_owned(), repaint.clone(), &generation, result)
                        .await?;
                    outstanding = remaining;
                }
            }
        } else {
            // Only ongoing fetches might be completed.
            let (result, _, remaining) = select_all(outstanding.drain(..)).await;
            fetch_complete(asset_tx.to_owned(), repaint.clone(), &generation, result).await?;
            outstanding = remaining;
        }

        // Update stats.
        let mut stats = stats.lock()?;
        stats.in_progress = outstanding.len();
    }
}

/// Continuously fetch assets requested via the request channel.
pub(crate) async fn fetch_continuously(
    fetch: impl Fetch,
    stats: Arc<Mutex<Stats>>,
    generation: Arc<AtomicU64>,
    request_rx: Receiver<AssetRequest>,
    asset_tx: Sender<(AssetRequest, Option<Arc<Texture>>)>,
    repaint: Option<Arc<dyn Repaint>>,
) {
    match fetch_continuously_impl(fetch, stats, generation, request_rx, asset_tx, repaint).await {
        Ok(()) | Err(Error::AssetChannelClosed) | Err(Error::RequestChannelBroken) => {
            log::debug!("Asset fetch loop finished.");
        }
        Err(error) => {
            log::error!("Asset fetch loop failed: {error}.");
        }
    }
}
