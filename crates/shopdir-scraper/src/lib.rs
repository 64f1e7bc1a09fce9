pub mod batch;
pub mod error;
pub mod fetch;
pub mod geocode;
pub mod job;
pub mod memory;
pub mod notify;
pub mod pacing;
pub mod parse;
pub mod region;
mod retry;
pub mod session;
pub mod site;
pub mod walker;

#[cfg(test)]
mod test_support;

pub use batch::{BatchOutcome, BatchWriter};
pub use error::{
    DetailError, FetchError, GeocodeProviderError, ParseError, RunFatalError, SessionError,
    SetupError, SiteError,
};
pub use fetch::{FetchRequest, FetchResponse, FetcherConfig, RateLimitedFetcher};
pub use geocode::{CachePolicy, GeocodeCache, GeocodeProvider, GoogleGeocoder, LatLng, Resolution};
pub use job::{JobOptions, ScrapeJob};
pub use memory::MemoryStores;
pub use notify::{notifier_from_config, NoopNotifier, SlackNotifier};
pub use pacing::RequestPacer;
pub use parse::{parser_for, Parser, ShopFields};
pub use region::{RegionScraper, ScraperSettings};
pub use session::SessionManager;
pub use site::{SiteClient, TokenPlacement};
pub use walker::{PageWalker, WalkEnd, WalkMode, WalkStep};
