use clap::Parser;
use session_store_core::SessionConfig;

/// Configuration for the session-store-http server.
#[derive(Parser, Debug, Clone)]
#[command(name = "session-store-http")]
#[command(about = "HTTP session store with cooperative in-document locking")]
pub struct Config {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "SESSION_HTTP_HOST")]
    pub host: String,

    /// Port to bind to
    #[arg(long, default_value = "8080", env = "SESSION_HTTP_PORT")]
    pub port: u16,

    /// Session lifetime in seconds
    #[arg(long, default_value = "3600", env = "SESSION_LIFETIME")]
    pub lifetime: u64,

    /// Database name
    #[arg(long, env = "SESSION_DATABASE")]
    pub database: Option<String>,

    /// Collection name
    #[arg(long, env = "SESSION_COLLECTION")]
    pub collection: Option<String>,

    /// Connection target(s), comma-separated (memory://, file:///dir or a path)
    #[arg(long, env = "SESSION_HOSTS", value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Store username
    #[arg(long, env = "SESSION_USERNAME")]
    pub username: Option<String>,

    /// Store password
    #[arg(long, env = "SESSION_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Keep the store connection open across operations
    #[arg(long, env = "SESSION_PERSISTENT")]
    pub persistent: bool,

    /// Seconds between background gc sweeps (0 disables)
    #[arg(long, default_value = "300", env = "SESSION_GC_INTERVAL")]
    pub gc_interval_secs: u64,
}

impl Config {
    /// Store options, unvalidated. Missing names are reported by the store at startup.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            lifetime: self.lifetime,
            database: self.database.clone().unwrap_or_default(),
            collection: self.collection.clone().unwrap_or_default(),
            hosts: self.hosts.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            persistent: self.persistent,
        }
    }
}
