//! Asynchronously load and cache textures: map tiles and marker icons.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use futures::channel::mpsc::{Receiver, Sender, TrySendError, channel};

use crate::{
    io::{AssetKey, AssetRequest, Fetch, Repaint, fetch_continuously, runtime::Runtime},
    lru::FixedCache,
    mercator::TileId,
    sources::TileSource,
    texture::Texture,
};

#[derive(Clone, Default, Debug)]
pub struct Stats {
    /// Number of assets that are currently being fetched.
    pub in_progress: usize,
}

/// Owns the asset caches and the IO thread fetching into them.
///
/// A `None` cache entry is an in-flight placeholder: the asset was requested and must not be
/// requested again until it either arrives or fails.
pub struct AssetLoader {
    /// Assets to be fetched by the IO thread.
    request_tx: Sender<AssetRequest>,

    /// Assets that got fetched and should be put in the caches. `None` means the fetch
    /// failed and the placeholder should be dropped.
    asset_rx: Receiver<(AssetRequest, Option<Arc<Texture>>)>,

    tiles: FixedCache<TileId, Option<Arc<Texture>>>,
    icons: FixedCache<String, Option<Arc<Texture>>>,

    /// Bumped by [`Self::invalidate`]; the IO thread drops anything stamped older.
    generation: Arc<AtomicU64>,

    /// Assets looked up but unavailable this frame. Hosts keep scheduling frames while
    /// this is non-zero.
    missing: usize,

    stats: Arc<Mutex<Stats>>,

    #[allow(dead_code)] // Significant Drop
    runtime: Runtime,
}

impl AssetLoader {
    pub fn new(
        fetch: impl Fetch + Send + Sync + 'static,
        repaint: Option<Arc<dyn Repaint>>,
        tile_capacity: usize,
        icon_capacity: usize,
    ) -> Self {
        let stats = Arc::new(Mutex::new(Stats::default()));
        let generation = Arc::new(AtomicU64::new(0));

        // This ensures that newer requests are prioritized.
        let channel_size = fetch.max_concurrency();

        let (request_tx, request_rx) = channel(channel_size);
        let (asset_tx, asset_rx) = channel(channel_size);

        // This will run concurrently in a loop, handling fetches and talking to us via
        // channels.
        let runtime = Runtime::new(fetch_continuously(
            fetch,
            stats.clone(),
            generation.clone(),
            request_rx,
            asset_tx,
            repaint,
        ));

        Self {
            request_tx,
            asset_rx,
            tiles: FixedCache::new(tile_capacity),
            icons: FixedCache::new(icon_capacity),
            generation,
            missing: 0,
            stats,
            runtime,
        }
    }

    /// Reset the per-frame missing counter. Call once at the start of each tick.
    pub fn begin_frame(&mut self) {
        self.missing = 0;
    }

    /// Install everything the IO thread delivered since the last tick, so a frame never
    /// observes an asset arriving halfway through its draw.
    pub fn drain_arrivals(&mut self) {
        loop {
            match self.asset_rx.try_next() {
                Ok(Some((request, texture))) => {
                    // Invalidation may have raced with the delivery.
                    if request.generation != self.generation.load(Ordering::SeqCst) {
                        continue;
                    }
                    match (request.key, texture) {
                        (AssetKey::Tile(tile_id), Some(texture)) => {
                            self.tiles.insert(tile_id, Some(texture));
                        }
                        (AssetKey::Tile(tile_id), None) => {
                            self.tiles.remove(&tile_id);
                        }
                        (AssetKey::Icon(url), Some(texture)) => {
                            self.icons.insert(url, Some(texture));
                        }
                        (AssetKey::Icon(url), None) => {
                            self.icons.remove(&url);
                        }
                    }
                }
                Err(_) => {
                    // No more deliveries this tick.
                    break;
                }
                Ok(None) => {
                    log::error!("IO thread is dead");
                    break;
                }
            }
        }
    }

    /// The tile texture, requesting a fetch on a miss when `fetch` is set. Fallback lookups
    /// pass `fetch: false` so ancestors and descendants are used but never fetched.
    pub fn tile(
        &mut self,
        tile_id: TileId,
        source: &dyn TileSource,
        fetch: bool,
    ) -> Option<Arc<Texture>> {
        if !fetch {
            return self.tiles.get(&tile_id).cloned().flatten();
        }

        let request = AssetRequest {
            key: AssetKey::Tile(tile_id),
            url: source.tile_url(tile_id),
            generation: self.generation.load(Ordering::SeqCst),
        };

        let texture = Self::get_or_request(&mut self.tiles, &mut self.request_tx, tile_id, request);
        if texture.is_none() {
            self.missing += 1;
        }
        texture
    }

    /// The icon texture for a URL, requesting a fetch on a miss when `fetch` is set.
    pub fn icon(&mut self, url: &str, fetch: bool) -> Option<Arc<Texture>> {
        if !fetch {
            return self.icons.get(&url.to_string()).cloned().flatten();
        }

        let request = AssetRequest {
            key: AssetKey::Icon(url.to_string()),
            url: url.to_string(),
            generation: self.generation.load(Ordering::SeqCst),
        };

        let texture =
            Self::get_or_request(&mut self.icons, &mut self.request_tx, url.to_string(), request);
        if texture.is_none() {
            self.missing += 1;
        }
        texture
    }

    fn get_or_request<K: std::hash::Hash + Eq + Clone>(
        cache: &mut FixedCache<K, Option<Arc<Texture>>>,
        request_tx: &mut Sender<AssetRequest>,
        key: K,
        request: AssetRequest,
    ) -> Option<Arc<Texture>> {
        match cache.try_get_or_insert(
            key,
            || -> Result<Option<Arc<Texture>>, TrySendError<AssetRequest>> {
                request_tx.try_send(request)?;
                Ok(None)
            },
        ) {
            Ok(texture) => texture.clone(),
            Err(err) if err.is_full() => {
                // Trying to fetch too many assets at once; retried next frame.
                log::trace!("Request queue is full.");
                None
            }
            Err(err) => {
                log::error!("Failed to send asset request: {err}");
                None
            }
        }
    }

    /// Cancel all outstanding fetches and drop their placeholders. Anything still visible
    /// will be re-requested on the next lookup with the new generation stamp.
    pub fn invalidate(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let stale: Vec<TileId> = self
            .tiles
            .iter()
            .filter(|(_, texture)| texture.is_none())
            .map(|(tile_id, _)| *tile_id)
            .collect();
        for tile_id in stale {
            self.tiles.remove(&tile_id);
        }

        let stale: Vec<String> = self
            .icons
            .iter()
            .filter(|(_, texture)| texture.is_none())
            .map(|(url, _)| url.clone())
            .collect();
        for url in stale {
            self.icons.remove(&url);
        }
    }

    /// Assets looked up but unavailable during the current frame.
    pub fn missing_assets(&self) -> usize {
        self.missing
    }

    pub fn stats(&self) -> Stats {
        if let Ok(stats) = self.stats.lock() {
            stats.clone()
        } else {
            // I really do not want this to return a Result.
            Stats::default()
        }
    }
}

#[cfg(test)]
impl AssetLoader {
    pub(crate) fn insert_tile(&mut self, tile_id: TileId, texture: Arc<Texture>) {
        self.tiles.insert(tile_id, Some(texture));
    }

    /// `Some(true)` resolved, `Some(false)` in-flight placeholder, `None` never requested.
    pub(crate) fn tile_state(&self, tile_id: &TileId) -> Option<bool> {
        self.tiles.peek(tile_id).map(|texture| texture.is_some())
    }

    pub(crate) fn pending_tiles(&self) -> usize {
        self.tiles
            .iter()
            .filter(|(_, texture)| texture.is_none())
            .count()
    }

    pub(crate) fn insert_icon(&mut self, url: &str, texture: Arc<Texture>) {
        self.icons.insert(url.to_string(), Some(texture));
    }

    pub(crate) fn icon_pending(&self, url: &str) -> bool {
        matches!(self.icons.peek(&url.to_string()), Some(None))
    }
}
