use serde::Deserialize;

/// Main configuration structure for Nargh
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub target: TargetConfig,
    pub tor: TorConfig,
    pub output: OutputConfig,
    pub index: Option<IndexConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of workers, each with its own isolated session
    pub workers: u32,

    /// Attempts for the one-shot category page fetch
    pub max_attempts: u32,

    /// Attempts per search page before the subcategory is abandoned
    pub page_retry_ceiling: u32,

    /// Timeout for a single HTTP request (seconds)
    pub request_timeout_secs: u64,

    /// Pause before retrying a request that does not rotate identity (milliseconds)
    pub retry_delay_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 5,
            page_retry_ceiling: 4,
            request_timeout_secs: 30,
            retry_delay_ms: 500,
        }
    }
}

/// Where the catalog lives and how to recognize its pages
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TargetConfig {
    /// Scheme and host of the catalog
    pub base_url: String,

    /// Path of the HTML page carrying the category tree and session cookies
    pub products_path: String,

    /// Path of the paginated search API
    pub search_path: String,

    /// Text that precedes the embedded category payload
    pub category_marker: String,

    pub user_agent: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "https://lcsc.com".to_string(),
            products_path: "/products".to_string(),
            search_path: "/api/products/search".to_string(),
            category_marker: "分类数据".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0"
                .to_string(),
        }
    }
}

/// Tor anonymization settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TorConfig {
    /// Route requests through Tor; when false requests go out directly
    pub enabled: bool,

    /// Address of the Tor SOCKS listener
    pub socks_addr: String,

    /// Address of the Tor control port
    pub control_addr: String,

    /// Control port password (HashedControlPassword), if any
    pub control_password: Option<String>,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socks_addr: "127.0.0.1:9050".to_string(),
            control_addr: "127.0.0.1:9051".to_string(),
            control_password: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory receiving one JSON file per subcategory
    pub json_dir: String,

    /// File receiving the sorted datasheet URL list
    pub datasheet_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_dir: "json".to_string(),
            datasheet_path: "pdf/datasheets.txt".to_string(),
        }
    }
}

/// Search index ingestion settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IndexConfig {
    /// Base URL of the index server
    pub host: String,

    pub index_uid: String,

    pub primary_key: String,

    pub api_key: Option<String>,

    /// Timeout for a single ingestion request (seconds)
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:7700".to_string(),
            index_uid: "lcsc".to_string(),
            primary_key: "ID".to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl IndexConfig {
    /// Index settings pointing at `host`, everything else defaulted
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }
}
