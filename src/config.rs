use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.crossref.org";

/// Number of candidate records requested per title.
pub const DEFAULT_ROWS: usize = 3;

/// Maximum number of lookups in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings for the metadata lookup stage.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub base_url: String,
    /// Upper bound on the time spent retrying a single request.
    pub timeout: Duration,
    /// Contact address for the Crossref polite pool.
    pub mailto: Option<String>,
    pub rows: usize,
    pub concurrency: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            mailto: None,
            rows: DEFAULT_ROWS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl LookupConfig {
    /// Build a config from `CROSSREF_BASE_URL`, `API_TIMEOUT_SECS` and `CROSSREF_MAILTO`,
    /// falling back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = std::env::var("CROSSREF_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.base_url);

        let timeout = std::env::var("API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let mailto = std::env::var("CROSSREF_MAILTO")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Self {
            base_url,
            timeout,
            mailto,
            ..defaults
        }
    }

    pub fn user_agent(&self) -> String {
        let version = env!("CARGO_PKG_VERSION");
        match &self.mailto {
            Some(email) => format!("bibfill/{} (mailto:{})", version, email),
            None => format!("bibfill/{}", version),
        }
    }
}
