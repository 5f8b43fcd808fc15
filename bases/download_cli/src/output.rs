// bases/download_cli/src/output.rs
use download_orchestrator::{InfoReport, Job};
use media_library::LibraryEntry;
use std::io::Write;
use std::path::Path;

pub struct OutputHandler {
    verbose: bool,
}

impl OutputHandler {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn print_info(&self, report: &InfoReport) {
        let info = &report.info;
        println!("Title: {}", info.title);
        println!("Uploader: {}", info.uploader.as_deref().unwrap_or("Unknown"));
        println!("Duration: {}", info.duration);
        if let Some(views) = info.view_count {
            println!("Views: {}", views);
        }
        match &report.existing_file {
            Some(existing) => println!("Already downloaded as: {}", existing),
            None => println!("Not downloaded yet"),
        }

        if self.verbose {
            println!("Media id: {}", info.media_id);
            println!("Page: {}", info.webpage_url);
        }
    }

    pub fn print_download_start(&self, url: &str) {
        println!("Starting download from: {}", url);
    }

    pub fn print_progress(&self, job: &Job) {
        if self.verbose {
            println!("[{}] {:>5.1}%", job.state.status(), job.progress);
        } else {
            print!("\r{:<12} {:>5.1}%", job.state.status(), job.progress);
            let _ = std::io::stdout().flush();
            if job.is_terminal() {
                println!();
            }
        }
    }

    pub fn print_already_downloaded(&self, filename: &str) {
        println!("Already downloaded as: {}", filename);
    }

    pub fn print_download_complete(&self, entry: &LibraryEntry) {
        println!("Downloaded: {}", entry.display_name);
        println!("File: {}", entry.filename);
        println!("Size: {}", entry.size);
        println!("Duration: {}", entry.duration);

        if self.verbose {
            if let Some(source) = &entry.source_url {
                println!("Source: {}", source);
            }
            if let Some(media_id) = &entry.media_id {
                println!("Media id: {}", media_id);
            }
        }
    }

    pub fn print_library_location(&self, dir: &Path) {
        if self.verbose {
            println!("Library: {}", dir.display());
        }
    }

    pub fn print_error(&self, error: &color_eyre::Report) {
        eprintln!("Error: {}", error);

        if self.verbose {
            eprintln!("\nError details:");
            error.chain().skip(1).for_each(|cause| {
                eprintln!("  caused by: {}", cause);
            });
        }
    }
}
