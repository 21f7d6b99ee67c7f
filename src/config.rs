use crate::services::{
    pipeline::{DEFAULT_PAGE_SIZE, DEFAULT_SIZE_BUDGET_MB, PipelineConfig},
    storage_service::validate_bucket_name,
};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub size_budget_mb: f64,
    pub page_size: usize,
    pub photo_bucket: String,
    pub archive_bucket: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Packs event photos into size-bounded ZIP archives")]
pub struct Args {
    /// Host to bind to (overrides ARCHIVER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ARCHIVER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blobs are stored (overrides ARCHIVER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides ARCHIVER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Maximum declared size of one archive chunk in MB (overrides ARCHIVER_SIZE_BUDGET_MB)
    #[arg(long)]
    pub size_budget_mb: Option<f64>,

    /// Photos requested per listing page (overrides ARCHIVER_PAGE_SIZE)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Bucket photos are read from (overrides ARCHIVER_PHOTO_BUCKET)
    #[arg(long)]
    pub photo_bucket: Option<String>,

    /// Bucket archives are written to (overrides ARCHIVER_ARCHIVE_BUCKET)
    #[arg(long)]
    pub archive_bucket: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args, |key| env::var(key))?, migrate))
    }

    /// CLI flags win over environment variables, which win over defaults.
    fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|_| default.into());

        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| text("ARCHIVER_HOST", "0.0.0.0")),
            port: match args.port {
                Some(port) => port,
                None => parse_var(&lookup, "ARCHIVER_PORT", 3000)?,
            },
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| text("ARCHIVER_STORAGE_DIR", "./data/blobs")),
            database_url: args.database_url.unwrap_or_else(|| {
                text("ARCHIVER_DATABASE_URL", "sqlite://./data/meta/archiver.db")
            }),
            size_budget_mb: match args.size_budget_mb {
                Some(budget) => budget,
                None => parse_var(&lookup, "ARCHIVER_SIZE_BUDGET_MB", DEFAULT_SIZE_BUDGET_MB)?,
            },
            page_size: match args.page_size {
                Some(size) => size,
                None => parse_var(&lookup, "ARCHIVER_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            },
            photo_bucket: args
                .photo_bucket
                .unwrap_or_else(|| text("ARCHIVER_PHOTO_BUCKET", "photos")),
            archive_bucket: args
                .archive_bucket
                .unwrap_or_else(|| text("ARCHIVER_ARCHIVE_BUCKET", "archives")),
        };

        if !cfg.size_budget_mb.is_finite() || cfg.size_budget_mb <= 0.0 {
            bail!("size budget must be a positive number of MB, got {}", cfg.size_budget_mb);
        }
        if cfg.page_size == 0 {
            bail!("page size must be at least 1");
        }
        validate_bucket_name(&cfg.photo_bucket).context("invalid photo bucket")?;
        validate_bucket_name(&cfg.archive_bucket).context("invalid archive bucket")?;

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            size_budget_mb: self.size_budget_mb,
            page_size: self.page_size,
            photo_bucket: self.photo_bucket.clone(),
            archive_bucket: self.archive_bucket.clone(),
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
