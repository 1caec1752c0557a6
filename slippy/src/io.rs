//! Asynchronous asset IO: the fetch pipeline and the managed thread it runs on.

mod fetch;
mod http;
pub(crate) mod runtime;

pub(crate) use fetch::fetch_continuously;
pub use fetch::{AssetKey, AssetRequest, Error, Fetch, Repaint};
pub use http::{FetchOptions, HeaderValue, HttpFetch};
