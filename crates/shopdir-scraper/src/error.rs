use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("client error {status} from {url}")]
    ClientError { status: u16, url: String },

    #[error("server error {status} from {url}")]
    ServerError { status: u16, url: String },

    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Transient failures worth another attempt: network trouble, a truncated
    /// body, or a 5xx. Malformed requests and 4xx are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { source, .. } => !source.is_builder(),
            FetchError::Body { .. } | FetchError::ServerError { .. } => true,
            FetchError::ClientError { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session bootstrap from {url} failed: {reason}")]
    BootstrapFailed { url: String, reason: String },

    #[error("session bootstrap request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("{url} still rejects a freshly bootstrapped session")]
    StillStale { url: String },
}

/// Failure to get a page from a region's site, with or without a session.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("detail page {url} did not match the configured pattern")]
    NoMatch { url: String },

    #[error("detail page {url} has no {field}")]
    MissingField { url: String, field: &'static str },
}

/// A detail link that could not be turned into a record.
#[derive(Debug, Error)]
pub enum DetailError {
    #[error(transparent)]
    Site(#[from] SiteError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Error)]
pub enum GeocodeProviderError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geocoding provider returned {status}: {message}")]
    Status { status: String, message: String },
}

/// Invalid wiring: a pattern that does not compile or an HTTP client that
/// cannot be built.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid {what} pattern: {source}")]
    Pattern {
        what: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("invalid base URL {url}: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("unknown page encoding '{label}'")]
    Encoding { label: String },

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Ends a run at its last checkpoint.
#[derive(Debug, Error)]
pub enum RunFatalError {
    #[error("list page {page} could not be fetched: {source}")]
    PageWalk {
        page: u32,
        #[source]
        source: FetchError,
    },

    #[error("session could not be established for page {page}: {source}")]
    Session {
        page: u32,
        #[source]
        source: SessionError,
    },

    #[error("progress for {key} was changed by another run")]
    ProgressConflict { key: String },

    #[error("progress store failed for {key}: {reason}")]
    ProgressStore { key: String, reason: String },
}

impl RunFatalError {
    pub(crate) fn from_page(page: u32, error: SiteError) -> Self {
        match error {
            SiteError::Fetch(source) => RunFatalError::PageWalk { page, source },
            SiteError::Session(source) => RunFatalError::Session { page, source },
        }
    }
}
