use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

const DEFAULT_JWT_SECRET: &str = "pfss-insecure-development-secret";
pub const DEFAULT_ROOT_PASSWORD: &str = "change_me_immediately";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub root_password: String,
    pub public_url: String,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Private file storage service")]
pub struct Args {
    /// Host to bind to (overrides PFSS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PFSS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded files are stored (overrides PFSS_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PFSS_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Secret for session tokens and signed URLs (overrides PFSS_JWT_SECRET)
    #[arg(long)]
    pub jwt_secret: Option<String>,

    /// Session token lifetime in hours (overrides PFSS_JWT_TTL_HOURS)
    #[arg(long)]
    pub jwt_ttl_hours: Option<i64>,

    /// Password given to the root account on first boot (overrides PFSS_ROOT_PASSWORD)
    #[arg(long)]
    pub root_password: Option<String>,

    /// Externally visible base URL used in signed URLs (overrides PFSS_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Largest accepted upload body in bytes (overrides PFSS_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win over `PFSS_*` environment variables, which win over
    /// defaults.
    pub fn merge(args: Args) -> Result<Self> {
        let host = args
            .host
            .unwrap_or_else(|| env::var("PFSS_HOST").unwrap_or_else(|_| "0.0.0.0".into()));
        let port = match args.port {
            Some(port) => port,
            None => env_or("PFSS_PORT", 8080)?,
        };
        let public_url = args
            .public_url
            .or_else(|| env::var("PFSS_PUBLIC_URL").ok())
            .unwrap_or_else(|| format!("http://{}:{}", host, port));

        let cfg = Self {
            storage_dir: args.storage_dir.unwrap_or_else(|| {
                env::var("PFSS_STORAGE_DIR").unwrap_or_else(|_| "./data/upload".into())
            }),
            database_url: args.database_url.unwrap_or_else(|| {
                env::var("PFSS_DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://./data/meta/pfss.db".into())
            }),
            jwt_secret: args.jwt_secret.unwrap_or_else(|| {
                env::var("PFSS_JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.into())
            }),
            jwt_ttl_hours: match args.jwt_ttl_hours {
                Some(hours) => hours,
                None => env_or("PFSS_JWT_TTL_HOURS", 24)?,
            },
            root_password: args.root_password.unwrap_or_else(|| {
                env::var("PFSS_ROOT_PASSWORD").unwrap_or_else(|_| DEFAULT_ROOT_PASSWORD.into())
            }),
            max_upload_bytes: match args.max_upload_bytes {
                Some(bytes) => bytes,
                None => env_or("PFSS_MAX_UPLOAD_BYTES", 8 * 1024 * 1024)?,
            },
            host,
            port,
            public_url,
        };

        if cfg.jwt_ttl_hours <= 0 {
            anyhow::bail!("jwt ttl must be positive, got {}", cfg.jwt_ttl_hours);
        }
        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_ttl_hours", &self.jwt_ttl_hours)
            .field("root_password", &"<redacted>")
            .field("public_url", &self.public_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

/// Read and parse `key`, falling back to `default` when it is unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
