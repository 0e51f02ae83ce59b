//! One isolated network session
//!
//! Each transport owns its own HTTP client (connection pool and cookie
//! jar) and its own anti-forgery token. When Tor is in use, the SOCKS
//! username embeds the worker id and identity generation so Tor keeps
//! every worker, and every rotation, on a separate circuit.

use crate::catalog::{PageResult, SearchResponse};
use crate::config::Config;
use crate::transport::{extract_csrf_token, FetchError, IdentityProvider, TransportError};
use reqwest::{Client, Proxy};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

/// Header carrying the anti-forgery token on search requests
const CSRF_HEADER: &str = "X-Csrf-Token";

/// Everything needed to build a session, threaded in explicitly
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Page that hands out session cookies, token, and the category tree
    pub products_url: Url,

    /// Paginated search endpoint
    pub search_url: Url,

    pub user_agent: String,

    /// Timeout for a single request
    pub timeout: Duration,

    /// Tor SOCKS listener (`host:port`); `None` sends requests directly
    pub socks_addr: Option<String>,
}

impl TransportSettings {
    /// Derives transport settings from the crawl configuration
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let base = Url::parse(&config.target.base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", config.target.base_url, e)))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", path, e)))
        };

        Ok(Self {
            products_url: join(&config.target.products_path)?,
            search_url: join(&config.target.search_path)?,
            user_agent: config.target.user_agent.clone(),
            timeout: Duration::from_secs(config.crawler.request_timeout_secs),
            socks_addr: config
                .tor
                .enabled
                .then(|| config.tor.socks_addr.clone()),
        })
    }
}

/// Mutable session state; never held across an await
#[derive(Default)]
struct SessionState {
    client: Option<Client>,
    csrf_token: Option<String>,
}

/// One isolated network session bound to one anonymization circuit
///
/// A transport is owned by exactly one worker. Its methods take `&self`
/// so a fetch and its recovery action can be handed to the retry
/// executor side by side.
pub struct AnonymizingTransport {
    worker_id: usize,
    settings: Arc<TransportSettings>,
    provider: Arc<dyn IdentityProvider>,
    state: Mutex<SessionState>,
    generation: AtomicU64,
    rotations: AtomicU64,
}

impl AnonymizingTransport {
    /// Creates a transport with a fresh client and no session yet
    pub fn new(
        worker_id: usize,
        settings: Arc<TransportSettings>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self, TransportError> {
        let client = build_client(&settings, worker_id, 0)?;

        Ok(Self {
            worker_id,
            settings,
            provider,
            state: Mutex::new(SessionState {
                client: Some(client),
                csrf_token: None,
            }),
            generation: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
        })
    }

    /// Id of the worker owning this transport
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Number of identity rotations performed so far
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Whether the handshake produced an anti-forgery token
    pub fn has_token(&self) -> bool {
        self.lock_state().csrf_token.is_some()
    }

    /// Establishes a session with the target
    ///
    /// Loads the products page so the cookie jar picks up the session
    /// cookies, and stores the anti-forgery token found on it.
    pub async fn acquire(&self) -> Result<(), TransportError> {
        let client = self.client()?;
        let url = self.settings.products_url.as_str();

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|source| TransportError::Handshake {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HandshakeStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| TransportError::Handshake {
                url: url.to_string(),
                source,
            })?;

        let token = extract_csrf_token(&body);
        if token.is_none() {
            tracing::debug!(worker = self.worker_id, "No anti-forgery token on {}", url);
        }
        self.lock_state().csrf_token = token;

        tracing::debug!(worker = self.worker_id, "Session established");
        Ok(())
    }

    /// Discards the connection pool and moves to a brand-new identity
    ///
    /// Blocks until the provider confirms the new identity. On failure the
    /// transport is left without a client and must not be used again.
    pub async fn rotate(&self) -> Result<(), TransportError> {
        {
            let mut state = self.lock_state();
            state.client = None;
            state.csrf_token = None;
        }

        self.provider.new_identity().await?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let client = build_client(&self.settings, self.worker_id, generation)?;
        self.lock_state().client = Some(client);
        self.rotations.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            worker = self.worker_id,
            generation,
            "Rotated to a new network identity"
        );
        Ok(())
    }

    /// Rotates identity and establishes a new session on it
    pub async fn renew(&self) -> Result<(), TransportError> {
        self.rotate().await?;
        self.acquire().await
    }

    /// Fetches one page of search results for a category
    ///
    /// The body is decoded as JSON whatever the HTTP status; the target
    /// answers refusals with error pages, which surface as malformed JSON.
    pub async fn search(&self, page: u32, category: u64) -> Result<PageResult, FetchError> {
        let (client, token) = {
            let state = self.lock_state();
            let client = state.client.clone().ok_or(TransportError::NoSession)?;
            (client, state.csrf_token.clone())
        };
        let url = self.settings.search_url.as_str();

        let page_field = page.to_string();
        let category_field = category.to_string();
        let form = [
            ("current_page", page_field.as_str()),
            ("category", category_field.as_str()),
            ("in_stock", "false"),
            ("is_RoHS", "false"),
            ("show_icon", "false"),
            ("search_content", ""),
        ];

        let mut request = client.post(url).form(&form);
        if let Some(token) = token {
            request = request.header(CSRF_HEADER, token);
        }

        let response = request.send().await.map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;

        let parsed: SearchResponse = serde_json::from_slice(&body)
            .map_err(|source| FetchError::from_decode(url, status, source))?;

        Ok(PageResult::from(parsed))
    }

    /// Fetches a page as text through this session
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let client = self.client()?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })
    }

    /// URL of the products page
    pub fn products_url(&self) -> &Url {
        &self.settings.products_url
    }

    fn client(&self) -> Result<Client, TransportError> {
        self.lock_state()
            .client
            .clone()
            .ok_or(TransportError::NoSession)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds the HTTP client for one worker at one identity generation
///
/// Every client gets its own cookie jar and connection pool.
fn build_client(
    settings: &TransportSettings,
    worker_id: usize,
    generation: u64,
) -> Result<Client, TransportError> {
    let mut builder = Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(settings.timeout)
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true);

    if let Some(addr) = &settings.socks_addr {
        // Distinct SOCKS credentials put this session on its own circuit
        let proxy_url = format!("socks5h://nargh-{}-{}:x@{}", worker_id, generation, addr);
        builder = builder.proxy(Proxy::all(proxy_url).map_err(TransportError::Client)?);
    }

    builder.build().map_err(TransportError::Client)
}
