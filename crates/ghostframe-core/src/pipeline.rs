use std::path::Path;

use tracing::{info, warn};

use crate::blend::blend;
use crate::delay::DelayQueue;
use crate::error::{PipelineError, PipelineResult};
use crate::video::decoder::{probe, StreamMetadata, VideoDecoder};
use crate::video::encoder::FfmpegEncoder;
use crate::video::frame::{ColorMode, Frame};

/// Delay between the live frame and the ghost frame it is blended against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DelayOffset {
    /// A raw frame count.
    Frames(u32),
    /// A duration, converted to frames against the source frame rate.
    Seconds(f64),
}

impl DelayOffset {
    /// Resolve to a frame count. Seconds round to the nearest frame.
    pub fn resolve(&self, fps: u32) -> PipelineResult<u64> {
        match *self {
            DelayOffset::Frames(n) => Ok(n as u64),
            DelayOffset::Seconds(s) => {
                if !s.is_finite() || s < 0.0 {
                    return Err(PipelineError::config(format!(
                        "offset seconds must be a non-negative number, got {s}"
                    )));
                }
                Ok((s * fps as f64).round() as u64)
            }
        }
    }
}

/// Parameters for one motion-extraction run. Every option is explicit and
/// validated up front; there are no ambient toggles.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How far behind the live frame the ghost frame sits.
    pub offset: DelayOffset,
    /// Single-channel luma (the default) or full RGB processing.
    pub color_mode: ColorMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            offset: DelayOffset::Frames(1),
            color_mode: ColorMode::Grayscale,
        }
    }
}

/// Sequential supplier of decoded frames. Implemented by [`VideoDecoder`];
/// tests substitute an in-memory source.
pub trait FrameSource {
    fn next_frame(&mut self) -> PipelineResult<Option<Frame>>;
    fn close(&mut self);
}

/// Consumer of blended frames. Implemented by [`FfmpegEncoder`]; tests
/// substitute an in-memory sink.
pub trait FrameSink {
    fn write(&mut self, frame: &Frame) -> PipelineResult<()>;
    fn close(&mut self) -> PipelineResult<()>;
}

impl FrameSource for VideoDecoder {
    fn next_frame(&mut self) -> PipelineResult<Option<Frame>> {
        VideoDecoder::next_frame(self)
    }

    fn close(&mut self) {
        VideoDecoder::close(self);
    }
}

impl FrameSink for FfmpegEncoder {
    fn write(&mut self, frame: &Frame) -> PipelineResult<()> {
        FfmpegEncoder::write(self, frame)
    }

    fn close(&mut self) -> PipelineResult<()> {
        FfmpegEncoder::close(self)
    }
}

/// What the observer wants the driver to do after seeing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Abort,
}

/// Hook for progress display and cooperative cancellation. The driver calls
/// these at well-defined points; implementations hold their own state, there
/// is no process-wide console state. A preview window's "quit" keypress maps
/// to returning [`Control::Abort`].
pub trait PipelineObserver {
    /// Called once, after validation, with the number of frames the run will
    /// produce.
    fn on_start(&mut self, _total_output_frames: u64) {}

    /// Called after each blended frame is written. `index` is 0-based.
    fn on_frame(&mut self, _frame: &Frame, _index: u64) -> Control {
        Control::Continue
    }

    /// Called once on successful completion (not on abort or failure).
    fn on_complete(&mut self, _frames_written: u64) {}
}

/// Observer that displays nothing and never aborts.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// How a run ended. An abort is a deliberate early stop requested through
/// the observer; it is reported distinctly from failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted,
}

/// Result of a successful (or user-aborted) run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub frames_written: u64,
    pub metadata: StreamMetadata,
}

/// The offset must leave at least one frame to blend.
pub fn validate_offset(offset: u64, frame_count: u64) -> PipelineResult<()> {
    if offset >= frame_count {
        return Err(PipelineError::config(format!(
            "frame offset ({offset}) must be < the number of frames in the video ({frame_count})"
        )));
    }
    Ok(())
}

/// Run motion extraction over `input`, writing the blended video to `output`.
///
/// Probes and validates before spawning any process, then drives the
/// fill/steady loop. On a mid-run failure the truncated output file is
/// removed; a user abort keeps what was written so far.
pub fn run(
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
    observer: &mut dyn PipelineObserver,
) -> PipelineResult<RunSummary> {
    let metadata = probe(input)?;
    let offset = config.offset.resolve(metadata.fps)?;
    validate_offset(offset, metadata.frame_count)?;

    info!(
        ?input,
        ?output,
        offset,
        color_mode = ?config.color_mode,
        total_frames = metadata.frame_count,
        "pipeline starting"
    );

    let mut source = VideoDecoder::open(input, metadata, config.color_mode)?;
    let mut sink = match FfmpegEncoder::open(output, metadata, config.color_mode) {
        Ok(sink) => sink,
        Err(e) => {
            source.close();
            return Err(e);
        }
    };

    match drive(&mut source, &mut sink, offset, metadata.frame_count, observer) {
        Ok((outcome, frames_written)) => {
            info!(?outcome, frames_written, "pipeline finished");
            Ok(RunSummary {
                outcome,
                frames_written,
                metadata,
            })
        }
        Err(e) => {
            // Don't leave a truncated video behind on a hard failure.
            if output.exists() {
                warn!(?output, "removing truncated output after failure");
                let _ = std::fs::remove_file(output);
            }
            Err(e)
        }
    }
}

/// The fill/steady state machine over abstract source and sink.
///
/// Always releases both endpoints before returning, on every path. Returns
/// the outcome and the number of frames written; errors are decode/encode
/// failures or internal invariant violations.
pub fn drive(
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    offset: u64,
    total_frames: u64,
    observer: &mut dyn PipelineObserver,
) -> PipelineResult<(RunOutcome, u64)> {
    let result = drive_inner(source, sink, offset, total_frames, observer);
    source.close();
    let sink_result = sink.close();
    match result {
        Ok(outcome) => {
            // A failed finalize still means no usable output.
            sink_result?;
            Ok(outcome)
        }
        // The driving error takes precedence over any finalize error.
        Err(e) => Err(e),
    }
}

fn drive_inner(
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    offset: u64,
    total_frames: u64,
    observer: &mut dyn PipelineObserver,
) -> PipelineResult<(RunOutcome, u64)> {
    let mut queue = DelayQueue::new();

    // Fill phase: the first `offset` frames go straight into the queue and
    // produce no output.
    while (queue.len() as u64) < offset {
        match source.next_frame()? {
            Some(frame) => queue.push_back(frame),
            None => {
                return Err(PipelineError::InsufficientFrames {
                    read: queue.len() as u64,
                    needed: offset,
                });
            }
        }
    }

    let total_output = total_frames - offset;
    observer.on_start(total_output);

    let mut written: u64 = 0;
    while written < total_output {
        let Some(live) = source.next_frame()? else {
            // The stream ended earlier than the probe promised; everything
            // written so far is complete, so drain normally.
            warn!(
                written,
                expected = total_output,
                "stream ended before the probed frame count"
            );
            break;
        };

        // With a zero offset the queue stays empty and every frame is
        // blended against itself.
        let ghost = if offset == 0 {
            live.clone()
        } else {
            queue.pop_front()?
        };

        let blended = blend(&live, &ghost)?;

        if offset > 0 {
            queue.push_back(live);
        }
        debug_assert_eq!(queue.len() as u64, offset);

        sink.write(&blended)?;
        written += 1;

        if observer.on_frame(&blended, written - 1) == Control::Abort {
            info!(written, "abort requested, stopping early");
            return Ok((RunOutcome::Aborted, written));
        }
    }

    observer.on_complete(written);
    Ok((RunOutcome::Completed, written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::Pixels;
    use image::GrayImage;
    use tracing_test::traced_test;

    fn gray_frame(n: u64, fill: u8) -> Frame {
        Frame {
            pixels: Pixels::Gray(GrayImage::from_pixel(2, 2, image::Luma([fill]))),
            frame_number: n,
            timestamp_seconds: 0.0,
        }
    }

    /// In-memory source that records whether it was released.
    struct VecSource {
        frames: std::collections::VecDeque<Frame>,
        closed: bool,
    }

    impl VecSource {
        fn new(frames: Vec<Frame>) -> Self {
            Self {
                frames: frames.into(),
                closed: false,
            }
        }
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> PipelineResult<Option<Frame>> {
            Ok(self.frames.pop_front())
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    /// In-memory sink collecting every written frame.
    struct VecSink {
        frames: Vec<Frame>,
        closed: bool,
    }

    impl VecSink {
        fn new() -> Self {
            Self {
                frames: Vec::new(),
                closed: false,
            }
        }
    }

    impl FrameSink for VecSink {
        fn write(&mut self, frame: &Frame) -> PipelineResult<()> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn close(&mut self) -> PipelineResult<()> {
            self.closed = true;
            Ok(())
        }
    }

    /// Observer that records calls and aborts after a set number of frames.
    struct RecordingObserver {
        started_with: Option<u64>,
        frame_indices: Vec<u64>,
        completed_with: Option<u64>,
        abort_after: Option<u64>,
    }

    impl RecordingObserver {
        fn new() -> Self {
            Self {
                started_with: None,
                frame_indices: Vec::new(),
                completed_with: None,
                abort_after: None,
            }
        }

        fn aborting_after(n: u64) -> Self {
            Self {
                abort_after: Some(n),
                ..Self::new()
            }
        }
    }

    impl PipelineObserver for RecordingObserver {
        fn on_start(&mut self, total_output_frames: u64) {
            self.started_with = Some(total_output_frames);
        }

        fn on_frame(&mut self, _frame: &Frame, index: u64) -> Control {
            self.frame_indices.push(index);
            match self.abort_after {
                Some(n) if index + 1 >= n => Control::Abort,
                _ => Control::Continue,
            }
        }

        fn on_complete(&mut self, frames_written: u64) {
            self.completed_with = Some(frames_written);
        }
    }

    #[test]
    #[traced_test]
    fn zero_video_with_offset_two_yields_all_white() {
        // 10 all-zero 2x2 gray frames, offset 2: 8 output frames, every
        // sample saturates to 255.
        let mut source = VecSource::new((0..10).map(|n| gray_frame(n, 0)).collect());
        let mut sink = VecSink::new();
        let mut observer = RecordingObserver::new();

        let (outcome, written) =
            drive(&mut source, &mut sink, 2, 10, &mut observer).unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(written, 8);
        assert_eq!(sink.frames.len(), 8);
        for frame in &sink.frames {
            assert!(frame.samples().iter().all(|&s| s == 255));
        }
        assert_eq!(observer.started_with, Some(8));
        assert_eq!(observer.frame_indices, (0..8).collect::<Vec<_>>());
        assert_eq!(observer.completed_with, Some(8));
        assert!(source.closed);
        assert!(sink.closed);
    }

    #[test]
    fn ramp_video_with_offset_one_saturates_to_zero() {
        // Frame i holds the constant value i; with offset 1 each output is
        // 255 - min(255, (k+1) + (255 - k)) = 0, pinning the saturation.
        let mut source = VecSource::new((0..20).map(|n| gray_frame(n, n as u8)).collect());
        let mut sink = VecSink::new();

        let (outcome, written) =
            drive(&mut source, &mut sink, 1, 20, &mut NoopObserver).unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(written, 19);
        for frame in &sink.frames {
            assert!(frame.samples().iter().all(|&s| s == 0));
        }
    }

    #[test]
    fn output_count_is_total_minus_offset_for_every_valid_offset() {
        for offset in 0..10u64 {
            let mut source = VecSource::new((0..10).map(|n| gray_frame(n, 7)).collect());
            let mut sink = VecSink::new();
            let (outcome, written) =
                drive(&mut source, &mut sink, offset, 10, &mut NoopObserver).unwrap();
            assert_eq!(outcome, RunOutcome::Completed);
            assert_eq!(written, 10 - offset, "offset {offset}");
        }
    }

    #[test]
    fn zero_offset_degenerates_to_self_blend() {
        let mut source = VecSource::new((0..5).map(|n| gray_frame(n, 123)).collect());
        let mut sink = VecSink::new();

        let (outcome, written) =
            drive(&mut source, &mut sink, 0, 5, &mut NoopObserver).unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(written, 5);
        for frame in &sink.frames {
            assert!(frame.samples().iter().all(|&s| s == 255));
        }
    }

    #[test]
    #[traced_test]
    fn abort_mid_run_is_not_an_error_and_releases_endpoints() {
        let mut source = VecSource::new((0..10).map(|n| gray_frame(n, 0)).collect());
        let mut sink = VecSink::new();
        let mut observer = RecordingObserver::aborting_after(3);

        let (outcome, written) =
            drive(&mut source, &mut sink, 2, 10, &mut observer).unwrap();

        assert_eq!(outcome, RunOutcome::Aborted);
        assert_eq!(written, 3);
        assert_eq!(sink.frames.len(), 3);
        assert!(observer.completed_with.is_none());
        assert!(source.closed);
        assert!(sink.closed);
    }

    #[test]
    fn short_stream_during_fill_is_insufficient_frames() {
        let mut source = VecSource::new((0..2).map(|n| gray_frame(n, 0)).collect());
        let mut sink = VecSink::new();

        let err = drive(&mut source, &mut sink, 5, 10, &mut NoopObserver).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientFrames { read: 2, needed: 5 }
        ));
        assert!(source.closed);
        assert!(sink.closed);
    }

    #[test]
    fn early_end_of_stream_in_steady_state_drains_cleanly() {
        // Probe promised 10 frames but the stream holds 6.
        let mut source = VecSource::new((0..6).map(|n| gray_frame(n, 0)).collect());
        let mut sink = VecSink::new();

        let (outcome, written) =
            drive(&mut source, &mut sink, 2, 10, &mut NoopObserver).unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(written, 4);
    }

    #[test]
    fn offset_must_be_below_frame_count() {
        assert!(validate_offset(9, 10).is_ok());
        assert!(matches!(
            validate_offset(10, 10),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            validate_offset(11, 10),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn offset_seconds_round_to_frames() {
        assert_eq!(DelayOffset::Seconds(0.5).resolve(30).unwrap(), 15);
        assert_eq!(DelayOffset::Seconds(2.0).resolve(24).unwrap(), 48);
        // 0.0333s at 30fps rounds to one frame.
        assert_eq!(DelayOffset::Seconds(1.0 / 30.0).resolve(30).unwrap(), 1);
        assert_eq!(DelayOffset::Frames(7).resolve(30).unwrap(), 7);
        assert!(DelayOffset::Seconds(-1.0).resolve(30).is_err());
        assert!(DelayOffset::Seconds(f64::NAN).resolve(30).is_err());
    }
}
