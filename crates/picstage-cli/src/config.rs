//! 設定の読み込み
//!
//! 優先順位: CLI 引数 > 設定ファイル（TOML）> デフォルト値

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use picstage_core::app::{DEFAULT_IMAGE_API, ServiceConfig};
use picstage_core::impls::{DEFAULT_MAX_SIZE, LocalFsImageStore};

const DEFAULT_TTL_SECS: u64 = 3600;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Parser)]
#[command(
    name = "picstage",
    version,
    about = "Staged image uploads with delayed commit and TTL cleanup",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Configuration file path (TOML).
    #[arg(short, long, value_name = "PATH", env = "PICSTAGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Maximum staging lifetime in seconds.
    #[arg(long, value_name = "SECS", global = true)]
    pub ttl_secs: Option<u64>,

    /// Path fragment identifying our image URLs inside HTML.
    #[arg(long, value_name = "PATH", global = true)]
    pub image_api: Option<String>,

    /// Directory for staged (uncommitted) images.
    #[arg(long, value_name = "DIR", global = true)]
    pub staging: Option<PathBuf>,

    /// Directory for committed images.
    #[arg(long, value_name = "DIR", global = true)]
    pub location: Option<PathBuf>,

    /// Upload size limit in bytes.
    #[arg(long, value_name = "BYTES", global = true)]
    pub max_size: Option<u64>,

    /// Log filter (overridden by RUST_LOG).
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stage a file and print its image id.
    Save {
        /// Owner of the image.
        #[arg(long)]
        user: String,
        file: PathBuf,
    },
    /// Promote a staged image to committed.
    Commit { id: String },
    /// Write an image to a file or stdout.
    Load {
        id: String,
        #[arg(short, long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Print the image ids referenced by an HTML file.
    Extract { file: PathBuf },
    /// Run one cleanup pass and print the report as JSON.
    Sweep,
    /// Run the cleanup loop until Ctrl-C.
    Reap,
}

/// 設定ファイルの形（すべて省略可能）
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    ttl_secs: Option<u64>,
    image_api: Option<String>,
    staging: Option<PathBuf>,
    location: Option<PathBuf>,
    max_size: Option<u64>,
    log_level: Option<String>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("can't read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("can't parse config {}", path.display()))
    }
}

/// 解決済みの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub ttl: Duration,
    pub image_api: String,
    pub staging: PathBuf,
    pub location: PathBuf,
    pub max_size: u64,
    pub log_level: String,
}

impl Settings {
    pub fn resolve(args: &GlobalArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, file))
    }

    fn merge(args: &GlobalArgs, file: FileConfig) -> Self {
        let ttl_secs = args.ttl_secs.or(file.ttl_secs).unwrap_or(DEFAULT_TTL_SECS);
        Self {
            ttl: Duration::from_secs(ttl_secs),
            image_api: args
                .image_api
                .clone()
                .or(file.image_api)
                .unwrap_or_else(|| DEFAULT_IMAGE_API.to_string()),
            staging: args
                .staging
                .clone()
                .or(file.staging)
                .unwrap_or_else(|| PathBuf::from("var/pictures.staging")),
            location: args
                .location
                .clone()
                .or(file.location)
                .unwrap_or_else(|| PathBuf::from("var/pictures")),
            max_size: args.max_size.or(file.max_size).unwrap_or(DEFAULT_MAX_SIZE),
            log_level: args
                .log_level
                .clone()
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    /// ttl と image_api を core 側の規則で検証する（ttl 0 は全 staged 画像を消してしまう）
    pub fn service_config(&self) -> Result<ServiceConfig> {
        ServiceConfig::new(self.ttl, self.image_api.as_str()).context("invalid settings")
    }

    pub async fn open_store(&self) -> Result<LocalFsImageStore> {
        let store = LocalFsImageStore::new(&self.location, &self.staging)
            .await
            .with_context(|| format!("can't open image store at {}", self.location.display()))?;
        Ok(store.with_max_size(self.max_size))
    }
}
