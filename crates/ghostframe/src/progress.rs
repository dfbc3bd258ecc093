use indicatif::{ProgressBar, ProgressStyle};

use ghostframe_core::pipeline::{Control, PipelineObserver};
use ghostframe_core::video::frame::Frame;

/// Observer that drives an indicatif progress bar over the run's output
/// frames.
pub struct ConsoleProgress {
    bar: Option<ProgressBar>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self { bar: None }
    }
}

impl PipelineObserver for ConsoleProgress {
    fn on_start(&mut self, total_output_frames: u64) {
        let bar = ProgressBar::new(total_output_frames);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.bar = Some(bar);
    }

    fn on_frame(&mut self, _frame: &Frame, _index: u64) -> Control {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
        Control::Continue
    }

    fn on_complete(&mut self, _frames_written: u64) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}
