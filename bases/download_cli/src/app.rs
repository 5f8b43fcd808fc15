// bases/download_cli/src/app.rs
use crate::args::Args;
use crate::output::OutputHandler;
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use download_orchestrator::{JobState, Orchestrator, OrchestratorConfig, OrchestratorError};
use media_downloader::{AudioFormat, Ffmpeg, FfmpegConfig, YtDlp, YtDlpConfig};
use media_library::LibraryStore;
use std::sync::Arc;

pub struct App {
    args: Args,
    output: OutputHandler,
}

impl App {
    pub fn new(args: Args) -> Self {
        let output = OutputHandler::new(args.verbose);
        Self { args, output }
    }

    async fn orchestrator(&self) -> Result<Orchestrator> {
        let format: AudioFormat = self.args.audio_format.parse()?;
        let ytdlp = Arc::new(YtDlp::new(YtDlpConfig {
            binary: self.args.yt_dlp.clone(),
            ..YtDlpConfig::default()
        }));
        let ffmpeg = Arc::new(Ffmpeg::new(FfmpegConfig {
            binary: self.args.ffmpeg.clone(),
            format,
            ..FfmpegConfig::default()
        }));
        let library = LibraryStore::open(&self.args.output_dir)
            .await
            .wrap_err_with(|| format!("opening library {}", self.args.output_dir.display()))?;

        Ok(Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(library),
            ytdlp.clone(),
            ytdlp,
            ffmpeg,
        ))
    }

    pub async fn run(&self) -> Result<()> {
        let orchestrator = self.orchestrator().await?;
        self.output.print_library_location(&self.args.output_dir);

        if self.args.info {
            let report = orchestrator.get_info(&self.args.url).await?;
            self.output.print_info(&report);
            return Ok(());
        }

        orchestrator.check_tools().await?;
        self.output.print_download_start(&self.args.url);

        let id = match orchestrator.start_download(&self.args.url).await {
            Err(OrchestratorError::Duplicate { existing_file }) => {
                self.output.print_already_downloaded(&existing_file);
                return Ok(());
            }
            other => other?,
        };

        let mut updates = orchestrator.watch_progress(&id)?;
        let job = loop {
            let job = updates.borrow_and_update().clone();
            self.output.print_progress(&job);
            if job.is_terminal() {
                break job;
            }
            if updates.changed().await.is_err() {
                bail!("job {} disappeared before finishing", id);
            }
        };

        match (job.state, job.error, job.result_filename) {
            (JobState::Completed, _, Some(filename)) => {
                let entry = orchestrator.fetch_file(&filename).await?.0;
                self.output.print_download_complete(&entry);
                Ok(())
            }
            (_, Some(failure), _) => match failure.existing_file() {
                Some(existing) => {
                    self.output.print_already_downloaded(existing);
                    Ok(())
                }
                None => bail!("download failed: {}", failure),
            },
            (state, _, _) => bail!("job {} ended as {} without a result", id, state),
        }
    }

    pub fn print_error(&self, error: &color_eyre::Report) {
        self.output.print_error(error);
    }
}
