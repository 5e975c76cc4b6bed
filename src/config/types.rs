use serde::Deserialize;

/// Main configuration structure for Roll-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    /// Remote archive storage; when absent nothing is shipped and the resume
    /// ledger starts empty
    pub remote: Option<RemoteConfig>,
    pub captcha: CaptchaConfig,
}

/// Where the catalog and the documents are served from
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Landing page fetched once per session to obtain cookies
    #[serde(rename = "portal-url")]
    pub portal_url: String,

    /// Base URL every API endpoint path is appended to
    #[serde(rename = "api-base-url")]
    pub api_base_url: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub endpoints: EndpointConfig,

    #[serde(default)]
    pub markers: ResponseMarkers,
}

/// API endpoint paths, relative to `api-base-url`
///
/// `districts` and `constituencies` contain a `{state}` placeholder.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_captcha_path")]
    pub captcha: String,

    #[serde(default = "default_states_path")]
    pub states: String,

    #[serde(default = "default_districts_path")]
    pub districts: String,

    #[serde(default = "default_constituencies_path")]
    pub constituencies: String,

    #[serde(default = "default_languages_path")]
    pub languages: String,

    #[serde(default = "default_parts_path")]
    pub parts: String,

    /// Draft roll document endpoint
    #[serde(default = "default_draft_path")]
    pub draft: String,

    /// Final (supplement) roll document endpoint
    #[serde(rename = "final", default = "default_final_path")]
    pub final_roll: String,

    /// General roll document endpoint
    #[serde(default = "default_general_path")]
    pub general: String,
}

/// Message fragments used to classify document endpoint responses
///
/// Matching is case-insensitive and substring based.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMarkers {
    /// The submitted captcha text was rejected
    #[serde(rename = "invalid-captcha", default = "default_invalid_captcha_markers")]
    pub invalid_captcha: Vec<String>,

    /// The requested variant is not published for the jurisdiction
    #[serde(rename = "unpublished", default = "default_unpublished_markers")]
    pub unpublished: Vec<String>,
}

/// Per-operation retry behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Delayed retries allowed before an operation becomes fatal
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay (milliseconds); doubled after every delayed retry
    #[serde(rename = "initial-delay-ms", default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Consecutive captcha rejections tolerated before an operation becomes fatal
    #[serde(rename = "max-captcha-attempts", default = "default_max_captcha_attempts")]
    pub max_captcha_attempts: u32,
}

/// Whole-traversal restart behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session restarts allowed before the run is reported as failed
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First delay between sessions (milliseconds); doubled after every restart
    #[serde(rename = "initial-delay-ms", default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

/// Local filesystem configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root of the `raw/` and `pages/` trees
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: String,

    /// Optional newline-delimited list of state codes to crawl first
    #[serde(rename = "priority-file", default)]
    pub priority_file: Option<String>,
}

/// PDF to per-page image conversion
#[derive(Debug, Clone, Deserialize)]
pub struct ConversionConfig {
    /// Convert parts during the crawl and ship the pages tier alongside the raw tier
    #[serde(default)]
    pub enabled: bool,

    /// Documents allowed to wait between the crawl and the workers
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Document conversion worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Page encoding threads per worker, 0 means twice the available parallelism
    #[serde(rename = "page-threads", default)]
    pub page_threads: usize,
}

/// Remote object storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    /// S3-compatible service (credentials from the standard AWS environment variables)
    S3,
    /// Directory tree on the local filesystem, one subdirectory per bucket
    Local,
}

/// Remote archive storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub backend: RemoteBackend,

    /// Bucket receiving raw PDF archives
    #[serde(rename = "raw-bucket")]
    pub raw_bucket: String,

    /// Bucket receiving converted page archives
    #[serde(rename = "pages-bucket")]
    pub pages_bucket: String,

    /// Custom S3 endpoint (e.g. an R2 account endpoint)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Root directory for the local backend
    #[serde(rename = "local-root", default)]
    pub local_root: Option<String>,

    /// Multipart chunk size (MiB)
    #[serde(rename = "chunk-size-mb", default = "default_chunk_size_mb")]
    pub chunk_size_mb: usize,

    /// Parts uploaded concurrently during a multipart transfer
    #[serde(rename = "max-concurrency", default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// External captcha solver
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Program and arguments; the challenge PNG is written to its stdin and
    /// the guess is read from its stdout
    pub command: Vec<String>,
}

fn default_user_agent() -> String {
    format!("roll-harvester/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_captcha_path() -> String {
    "/captcha-service/generateCaptcha/EROLL".to_string()
}

fn default_states_path() -> String {
    "/common/states/".to_string()
}

fn default_districts_path() -> String {
    "/common/districts/{state}".to_string()
}

fn default_constituencies_path() -> String {
    "/common/constituencies?stateCode={state}".to_string()
}

fn default_languages_path() -> String {
    "/printing-publish/get-ac-languages".to_string()
}

fn default_parts_path() -> String {
    "/printing-publish/get-part-list".to_string()
}

fn default_draft_path() -> String {
    "/printing-publish/generate-published-droll".to_string()
}

fn default_final_path() -> String {
    "/printing-publish/generate-published-sroll".to_string()
}

fn default_general_path() -> String {
    "/printing-publish/generate-published-geroll".to_string()
}

fn default_invalid_captcha_markers() -> Vec<String> {
    // the portal misspells it
    vec!["invalid catpcha".to_string(), "invalid captcha".to_string()]
}

fn default_unpublished_markers() -> Vec<String> {
    vec!["not published".to_string()]
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    100_000
}

fn default_max_captcha_attempts() -> u32 {
    50
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_queue_capacity() -> usize {
    3
}

fn default_workers() -> usize {
    1
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_chunk_size_mb() -> usize {
    16
}

fn default_max_concurrency() -> usize {
    10
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            captcha: default_captcha_path(),
            states: default_states_path(),
            districts: default_districts_path(),
            constituencies: default_constituencies_path(),
            languages: default_languages_path(),
            parts: default_parts_path(),
            draft: default_draft_path(),
            final_roll: default_final_path(),
            general: default_general_path(),
        }
    }
}

impl Default for ResponseMarkers {
    fn default() -> Self {
        Self {
            invalid_captcha: default_invalid_captcha_markers(),
            unpublished: default_unpublished_markers(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_captcha_attempts: default_max_captcha_attempts(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            priority_file: None,
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            page_threads: 0,
        }
    }
}

impl ConversionConfig {
    /// Page encoding threads to use, resolving 0 to twice the available parallelism
    pub fn effective_page_threads(&self) -> usize {
        if self.page_threads > 0 {
            return self.page_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get() * 2)
            .unwrap_or(2)
    }
}

impl RemoteConfig {
    /// Multipart chunk size in bytes
    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_size_mb * 1024 * 1024
    }
}
