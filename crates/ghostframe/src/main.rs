mod cli;
mod progress;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{error, info, warn};

use ghostframe_core::pipeline::{
    self, DelayOffset, NoopObserver, PipelineConfig, PipelineObserver, RunOutcome,
};
use ghostframe_core::video::frame::ColorMode;

use crate::progress::ConsoleProgress;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();

    let offset = match (cli.frame_offset, cli.offset_seconds) {
        (Some(frames), None) => DelayOffset::Frames(frames),
        (None, Some(seconds)) => DelayOffset::Seconds(seconds),
        (None, None) => bail!("one of --frame-offset or --offset-seconds is required"),
        (Some(_), Some(_)) => unreachable!("clap rejects conflicting offset flags"),
    };

    if cli.out.is_some() && cli.inputs.len() > 1 {
        bail!("--out is only valid with a single input; use --out-dir for batches");
    }

    let config = PipelineConfig {
        offset,
        color_mode: if cli.color {
            ColorMode::Color
        } else {
            ColorMode::Grayscale
        },
    };

    let mut failed = 0usize;
    for input in &cli.inputs {
        let output = output_path(input, cli.out.as_deref(), cli.out_dir.as_deref(), &offset);

        let mut progress_observer;
        let mut noop_observer;
        let observer: &mut dyn PipelineObserver = if cli.quiet {
            noop_observer = NoopObserver;
            &mut noop_observer
        } else {
            progress_observer = ConsoleProgress::new();
            &mut progress_observer
        };

        match pipeline::run(input, &output, &config, observer) {
            Ok(summary) => match summary.outcome {
                RunOutcome::Completed => {
                    info!(
                        ?input,
                        ?output,
                        frames_written = summary.frames_written,
                        "motion extraction complete"
                    );
                    if !cli.quiet {
                        println!("Saved in: {}", output.display());
                    }
                }
                RunOutcome::Aborted => {
                    warn!(
                        ?input,
                        frames_written = summary.frames_written,
                        "run aborted by user"
                    );
                }
            },
            Err(e) => {
                // One bad input doesn't stop the batch.
                error!(?input, error = %e, "motion extraction failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} inputs failed", cli.inputs.len());
    }
    Ok(())
}

/// Resolve where a run's output goes: an explicit path, the input's file
/// name inside an output directory, or a derived sibling name.
fn output_path(
    input: &Path,
    out: Option<&Path>,
    out_dir: Option<&Path>,
    offset: &DelayOffset,
) -> PathBuf {
    if let Some(out) = out {
        return out.to_path_buf();
    }
    if let Some(dir) = out_dir {
        return dir.join(input.file_name().unwrap_or(input.as_os_str()));
    }

    let label = match *offset {
        DelayOffset::Frames(n) => n.to_string(),
        DelayOffset::Seconds(s) => format!("{s}s"),
    };
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}-motion-extraction-offset-{label}.mp4"))
}
