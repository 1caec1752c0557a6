use bytes::Bytes;

pub use reqwest::header::HeaderValue;

use crate::io::Fetch;

/// Controls how [`HttpFetch`] talks to asset servers.
pub struct FetchOptions {
    /// User agent to be sent to the tile servers.
    ///
    /// This should be set only on native targets. The browser sets its own user agent on wasm
    /// targets, and trying to set a different one may upset some servers.
    pub user_agent: Option<HeaderValue>,

    /// Maximum number of parallel fetches.
    ///
    /// Many services have rate limits, and exceeding them may result in throttling, bans, or
    /// degraded service. Use the default value when in doubt.
    pub max_parallel_fetches: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        let user_agent = Some(HeaderValue::from_static(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION"),
        )));

        #[cfg(target_arch = "wasm32")]
        let user_agent = None;

        Self {
            user_agent,
            max_parallel_fetches: 8,
        }
    }
}

/// Stock [`Fetch`] implementation over HTTP, for tiles and marker icons alike.
pub struct HttpFetch {
    client: reqwest::Client,
    options: FetchOptions,
}

impl HttpFetch {
    pub fn new(options: FetchOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            options,
        }
    }
}

impl Default for HttpFetch {
    fn default() -> Self {
        Self::new(FetchOptions::default())
    }
}

impl Fetch for HttpFetch {
    type Error = reqwest::Error;

    async fn fetch(&self, url: &str) -> Result<Bytes, reqwest::Error> {
        let mut request = self.client.get(url);

        if let Some(user_agent) = &self.options.user_agent {
            request = request.header(reqwest::header::USER_AGENT, user_agent.clone());
        }

        request.send().await?.error_for_status()?.bytes().await
    }

    fn max_concurrency(&self) -> usize {
        self.options.max_parallel_fetches
    }
}
