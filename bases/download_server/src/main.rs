// bases/download_server/src/main.rs
use clap::Parser;
use color_eyre::Result;
use download_orchestrator::Orchestrator;
use media_downloader::{Ffmpeg, YtDlp};
use media_library::LibraryStore;
use std::sync::Arc;

mod api;
mod config;
mod error;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "download_server=info,download_orchestrator=info,media_library=info,media_downloader=info,tower_http=info"
                    .into()
            }),
        )
        .init();

    let args = config::CliArgs::parse();
    let config = config::Config::from_args(args)?;

    let ytdlp = Arc::new(YtDlp::new(config.ytdlp.clone()));
    let ffmpeg = Arc::new(Ffmpeg::new(config.ffmpeg.clone()));
    let library = Arc::new(LibraryStore::open(&config.library_dir).await?);
    tracing::info!(
        "Library holds {} files in {}",
        library.stats().await.total_downloads,
        library.root().display()
    );

    let orchestrator = Orchestrator::new(
        config.orchestrator.clone(),
        library,
        ytdlp.clone(),
        ytdlp,
        ffmpeg,
    );
    orchestrator.check_tools().await?;

    server::run(config, orchestrator).await?;

    Ok(())
}
