use std::env;
use std::path::PathBuf;

/// Server configuration, resolved from the environment with fixed fallbacks
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listen port (default: 5000)
    pub port: u16,

    /// Listen address (default: "0.0.0.0")
    pub bind_addr: String,

    /// Metadata store connection string (default: "sqlite://fileshare.db?mode=rwc")
    pub database_url: String,

    /// Blob directory, also exposed under /uploads (default: "uploads")
    pub upload_dir: PathBuf,

    /// Staging directory for in-flight uploads; must share a filesystem with
    /// `upload_dir` so publication is a rename (default: "uploads-staging")
    pub staging_dir: PathBuf,

    /// Maximum file size in bytes (default: 256 MB)
    pub max_file_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            bind_addr: "0.0.0.0".to_string(),
            database_url: "sqlite://fileshare.db?mode=rwc".to_string(),
            upload_dir: PathBuf::from("uploads"),
            staging_dir: PathBuf::from("uploads-staging"),
            max_file_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            bind_addr: env::var("BIND_ADDR").unwrap_or(default.bind_addr),

            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),

            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),
        }
    }

    /// Config rooted in a scratch directory, used by tests and local tooling
    pub fn for_root(root: &std::path::Path) -> Self {
        Self {
            port: 0,
            bind_addr: "127.0.0.1".to_string(),
            database_url: format!("sqlite://{}?mode=rwc", root.join("fileshare.db").display()),
            upload_dir: root.join("uploads"),
            staging_dir: root.join("uploads-staging"),
            ..Self::default()
        }
    }

    /// Body limit for the upload route, with headroom for multipart framing
    pub fn upload_body_limit(&self) -> usize {
        self.max_file_size + 10 * 1024 * 1024
    }
}
