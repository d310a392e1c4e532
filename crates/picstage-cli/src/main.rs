mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use picstage_core::app::{ReferenceExtractor, ServiceBuilder};
use picstage_core::{ImageId, ImageStore};

use crate::config::{Cli, Command, Settings};

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn parse_id(raw: &str) -> Result<ImageId> {
    raw.parse().with_context(|| format!("invalid image id {raw:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::resolve(&cli.global)?;
    init_logging(&settings);

    match cli.command {
        Command::Save { user, file } => {
            let store = settings.open_store().await?;
            let content = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("can't open {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let id = store.save(&file_name, &user, Box::new(content)).await?;
            info!(%id, ttl = ?settings.ttl, "image staged, commit it before the ttl runs out");
            println!("{id}");
        }
        Command::Commit { id } => {
            let store = settings.open_store().await?;
            let id = parse_id(&id)?;
            store.commit(&id).await?;
            info!(%id, "image committed");
        }
        Command::Load { id, out } => {
            let store = settings.open_store().await?;
            let (mut reader, size) = store.load(&parse_id(&id)?).await?;
            let copied = match out {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("can't create {}", path.display()))?;
                    let copied = tokio::io::copy(&mut reader, &mut file).await?;
                    file.flush().await?;
                    copied
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    let copied = tokio::io::copy(&mut reader, &mut stdout).await?;
                    stdout.flush().await?;
                    copied
                }
            };
            info!(%id, size, copied, "image loaded");
        }
        Command::Extract { file } => {
            let html = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("can't read {}", file.display()))?;
            let config = settings.service_config()?;
            let extractor = ReferenceExtractor::new(config.image_api());
            for id in extractor.extract_pictures(&html)? {
                println!("{id}");
            }
        }
        Command::Sweep => {
            let config = settings.service_config()?;
            let store = settings.open_store().await?;
            let report = store.cleanup(config.ttl()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Reap => {
            let config = settings.service_config()?;
            let store = settings.open_store().await?;
            let service = ServiceBuilder::new()
                .store(Arc::new(store))
                .ttl(config.ttl())
                .image_api(config.image_api())
                .build()?;
            let reaper = service.spawn_cleanup();

            tokio::signal::ctrl_c()
                .await
                .context("can't listen for shutdown signal")?;
            info!("shutdown requested");
            let cause = reaper.shutdown_and_join().await?;
            info!(?cause, "reaper stopped");
        }
    }
    Ok(())
}
