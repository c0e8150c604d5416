use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

// Namespace directory under the OS temp dir that holds every workspace
pub const APP_NAMESPACE: &str = "deck2pdf";

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_ENGINE: &str = "soffice";
const DEFAULT_CONVERT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CLEANUP_DELAY_SECS: u64 = 10;
const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 60;
const DEFAULT_JANITOR_MAX_AGE_SECS: u64 = 300;
const DEFAULT_API_RATE_LIMIT: u32 = 100;
const DEFAULT_CONVERT_RATE_LIMIT: u32 = 20;
const DEFAULT_RATE_WINDOW_SECS: u64 = 900;
const DEFAULT_CLIENT_IDLE_SECS: u64 = 180;
const DEFAULT_EVICTION_INTERVAL_SECS: u64 = 60;
const DEFAULT_MAX_UPLOAD_MB: u64 = 50;
const DEFAULT_ALLOWED_ORIGINS: &str =
    "http://localhost:3000,http://127.0.0.1:3000,http://localhost:8080,http://127.0.0.1:8080";

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "deck2pdf")]
#[command(about = "Presentation to PDF conversion service")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    // Conversion engine executable
    #[arg(long, env = "SOFFICE_PATH", default_value = DEFAULT_ENGINE)]
    pub engine: PathBuf,

    // Workspace root, defaults to <os temp>/deck2pdf
    #[arg(long, env = "WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    // Engine wall-clock budget in seconds
    #[arg(long, env = "CONVERT_TIMEOUT_SECS", default_value_t = DEFAULT_CONVERT_TIMEOUT_SECS)]
    pub convert_timeout: u64,

    // Grace delay before a finished workspace is removed
    #[arg(long, env = "CLEANUP_DELAY_SECS", default_value_t = DEFAULT_CLEANUP_DELAY_SECS)]
    pub cleanup_delay: u64,

    // Janitor tick
    #[arg(long, env = "JANITOR_INTERVAL_SECS", default_value_t = DEFAULT_JANITOR_INTERVAL_SECS)]
    pub janitor_interval: u64,

    // Workspaces older than this are swept
    #[arg(long, env = "JANITOR_MAX_AGE_SECS", default_value_t = DEFAULT_JANITOR_MAX_AGE_SECS)]
    pub janitor_max_age: u64,

    // Requests per window across the whole API
    #[arg(long, env = "API_RATE_LIMIT", default_value_t = DEFAULT_API_RATE_LIMIT)]
    pub api_rate_limit: u32,

    // Requests per window on the conversion endpoint
    #[arg(long, env = "CONVERT_RATE_LIMIT", default_value_t = DEFAULT_CONVERT_RATE_LIMIT)]
    pub convert_rate_limit: u32,

    // Rate limit window in seconds (both tiers)
    #[arg(long, env = "RATE_WINDOW_SECS", default_value_t = DEFAULT_RATE_WINDOW_SECS)]
    pub rate_window: u64,

    // Client entries idle longer than this are evicted
    #[arg(long, env = "CLIENT_IDLE_SECS", default_value_t = DEFAULT_CLIENT_IDLE_SECS)]
    pub client_idle: u64,

    // Evictor tick
    #[arg(long, env = "EVICTION_INTERVAL_SECS", default_value_t = DEFAULT_EVICTION_INTERVAL_SECS)]
    pub eviction_interval: u64,

    // Upload size cap in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = DEFAULT_MAX_UPLOAD_MB)]
    pub max_upload_mb: u64,

    // Allowed CORS origins (comma-separated)
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = DEFAULT_ALLOWED_ORIGINS)]
    pub allowed_origins: String,
}

impl Args {
    pub fn settings(&self) -> Settings {
        let workspace_root = self
            .workspace_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(APP_NAMESPACE));

        Settings {
            port: self.port,
            engine: self.engine.clone(),
            workspace_root,
            convert_timeout: Duration::from_secs(self.convert_timeout),
            cleanup_delay: Duration::from_secs(self.cleanup_delay),
            janitor_interval: Duration::from_secs(self.janitor_interval),
            janitor_max_age: Duration::from_secs(self.janitor_max_age),
            api_tier: TierSettings {
                max_requests: self.api_rate_limit,
                window: Duration::from_secs(self.rate_window),
            },
            convert_tier: TierSettings {
                max_requests: self.convert_rate_limit,
                window: Duration::from_secs(self.rate_window),
            },
            client_idle: Duration::from_secs(self.client_idle),
            eviction_interval: Duration::from_secs(self.eviction_interval),
            max_upload_bytes: self.max_upload_mb * 1024 * 1024,
            allowed_origins: parse_origins(&self.allowed_origins),
        }
    }
}

fn parse_origins(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Budget for one admission tier: `max_requests` per `window`.
#[derive(Debug, Clone, Copy)]
pub struct TierSettings {
    pub max_requests: u32,
    pub window: Duration,
}

/// Resolved runtime settings consumed by the library.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub engine: PathBuf,
    pub workspace_root: PathBuf,
    pub convert_timeout: Duration,
    pub cleanup_delay: Duration,
    pub janitor_interval: Duration,
    pub janitor_max_age: Duration,
    pub api_tier: TierSettings,
    pub convert_tier: TierSettings,
    pub client_idle: Duration,
    pub eviction_interval: Duration,
    pub max_upload_bytes: u64,
    pub allowed_origins: Vec<String>,
}

// Built-in policy, independent of the process environment
impl Default for Settings {
    fn default() -> Self {
        let tier = |max_requests| TierSettings {
            max_requests,
            window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
        };

        Self {
            port: DEFAULT_PORT,
            engine: PathBuf::from(DEFAULT_ENGINE),
            workspace_root: std::env::temp_dir().join(APP_NAMESPACE),
            convert_timeout: Duration::from_secs(DEFAULT_CONVERT_TIMEOUT_SECS),
            cleanup_delay: Duration::from_secs(DEFAULT_CLEANUP_DELAY_SECS),
            janitor_interval: Duration::from_secs(DEFAULT_JANITOR_INTERVAL_SECS),
            janitor_max_age: Duration::from_secs(DEFAULT_JANITOR_MAX_AGE_SECS),
            api_tier: tier(DEFAULT_API_RATE_LIMIT),
            convert_tier: tier(DEFAULT_CONVERT_RATE_LIMIT),
            client_idle: Duration::from_secs(DEFAULT_CLIENT_IDLE_SECS),
            eviction_interval: Duration::from_secs(DEFAULT_EVICTION_INTERVAL_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            allowed_origins: parse_origins(DEFAULT_ALLOWED_ORIGINS),
        }
    }
}
