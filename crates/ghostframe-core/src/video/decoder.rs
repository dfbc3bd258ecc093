use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use anyhow::Context;
use image::RgbImage;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, PipelineResult};

use super::frame::{ColorMode, Frame};

/// Immutable per-video metadata, captured once when the source is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMetadata {
    pub width: u32,
    pub height: u32,
    /// Frames per second, rounded to an integer. Playback timing is carried
    /// through to the encoder from this value.
    pub fps: u32,
    /// Total number of frames in the stream.
    pub frame_count: u64,
}

/// Probe a video's metadata with ffprobe.
pub fn probe(path: &Path) -> PipelineResult<StreamMetadata> {
    if !path.exists() {
        return Err(PipelineError::open(format!(
            "video file does not exist: {}",
            path.display()
        )));
    }

    info!(?path, "probing video metadata with ffprobe");

    let output = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,r_frame_rate,nb_frames",
            "-of", "csv=p=0",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            PipelineError::open(format!("failed to run ffprobe — is ffmpeg installed? ({e})"))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(%stderr, ?path, "ffprobe failed");
        return Err(PipelineError::open(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            stderr.trim()
        )));
    }

    // Output format: "width,height,num/den,nb_frames" (nb_frames may be N/A).
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parts: Vec<&str> = stdout.trim().split(',').collect();
    if parts.len() < 3 {
        error!(%stdout, "unexpected ffprobe output format");
        return Err(PipelineError::open(format!(
            "unexpected ffprobe output: {stdout}"
        )));
    }

    let width: u32 = parts[0].parse().context("failed to parse width")?;
    let height: u32 = parts[1].parse().context("failed to parse height")?;
    if width == 0 || height == 0 {
        return Err(PipelineError::open(format!(
            "invalid video dimensions: {width}x{height}"
        )));
    }

    let fps_raw = parse_frame_rate(parts[2])?;
    if fps_raw <= 0.0 {
        return Err(PipelineError::open(format!(
            "video has non-positive frame rate: {fps_raw}"
        )));
    }
    let fps = fps_raw.round() as u32;
    if fps == 0 {
        return Err(PipelineError::open(format!(
            "frame rate {fps_raw} rounds to zero frames per second"
        )));
    }
    if (fps_raw - fps as f64).abs() > 1e-9 {
        debug!(fps_raw, fps, "rounded fractional frame rate");
    }

    let frame_count = match parts.get(3).map(|s| s.trim()) {
        Some(n) if !n.is_empty() && n != "N/A" => n
            .parse()
            .with_context(|| format!("failed to parse nb_frames '{n}'"))?,
        _ => {
            // Some containers don't record nb_frames; fall back to counting
            // packets, which is slower but works everywhere.
            warn!(?path, "nb_frames unavailable, counting packets");
            count_packets(path)?
        }
    };

    if frame_count == 0 {
        return Err(PipelineError::open(format!(
            "video has no frames: {}",
            path.display()
        )));
    }

    info!(width, height, fps, frame_count, "probe completed");
    Ok(StreamMetadata {
        width,
        height,
        fps,
        frame_count,
    })
}

fn parse_frame_rate(field: &str) -> PipelineResult<f64> {
    if let Some((num, den)) = field.split_once('/') {
        let num: f64 = num.parse().context("failed to parse fps numerator")?;
        let den: f64 = den.parse().context("failed to parse fps denominator")?;
        Ok(if den > 0.0 { num / den } else { 0.0 })
    } else {
        Ok(field.parse().context("failed to parse fps")?)
    }
}

fn count_packets(path: &Path) -> PipelineResult<u64> {
    let output = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-count_packets",
            "-show_entries", "stream=nb_read_packets",
            "-of", "csv=p=0",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| PipelineError::open(format!("failed to run ffprobe -count_packets: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::open(format!(
            "ffprobe -count_packets failed: {}",
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .trim()
        .parse()
        .with_context(|| format!("failed to parse packet count '{}'", stdout.trim()))?)
}

/// Decodes video frames by piping raw RGB24 data from the ffmpeg CLI.
///
/// Frames come out in strict decode order, one per call, with no rewind.
/// When the run is grayscale, the luma conversion is applied here so every
/// downstream component sees single-channel frames for the whole run.
pub struct VideoDecoder {
    child: Option<Child>,
    metadata: StreamMetadata,
    color_mode: ColorMode,
    frames_read: u64,
    frame_bytes: usize,
}

impl VideoDecoder {
    /// Open a video file for decoding. `metadata` must come from a prior
    /// [`probe`] of the same path.
    pub fn open(
        path: &Path,
        metadata: StreamMetadata,
        color_mode: ColorMode,
    ) -> PipelineResult<Self> {
        info!(?path, ?color_mode, "spawning ffmpeg decoder process");

        let child = Command::new("ffmpeg")
            .args(["-i"])
            .arg(path)
            .args([
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-v", "error",
                "pipe:1",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PipelineError::open(format!("failed to spawn ffmpeg — is ffmpeg installed? ({e})"))
            })?;

        let frame_bytes = (metadata.width as usize) * (metadata.height as usize) * 3;

        info!(
            width = metadata.width,
            height = metadata.height,
            fps = metadata.fps,
            frame_bytes,
            "video decoder opened"
        );

        Ok(Self {
            child: Some(child),
            metadata,
            color_mode,
            frames_read: 0,
            frame_bytes,
        })
    }

    pub fn metadata(&self) -> StreamMetadata {
        self.metadata
    }

    /// Read the next frame from the ffmpeg pipe, or `None` if the video is
    /// finished.
    pub fn next_frame(&mut self) -> PipelineResult<Option<Frame>> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| PipelineError::decode("decoder is already closed"))?;
        let stdout = child
            .stdout
            .as_mut()
            .ok_or_else(|| PipelineError::decode("ffmpeg stdout not available"))?;

        let mut buf = vec![0u8; self.frame_bytes];
        let mut read = 0;

        while read < self.frame_bytes {
            match stdout.read(&mut buf[read..]) {
                Ok(0) => {
                    if read == 0 {
                        info!(total_frames = self.frames_read, "video stream ended");
                        return Ok(None);
                    }
                    error!(
                        read_bytes = read,
                        expected_bytes = self.frame_bytes,
                        frame = self.frames_read,
                        "ffmpeg stream ended mid-frame"
                    );
                    return Err(PipelineError::decode(format!(
                        "ffmpeg stream ended mid-frame (read {read}/{} bytes)",
                        self.frame_bytes,
                    )));
                }
                Ok(n) => read += n,
                Err(e) => {
                    error!(frame = self.frames_read, %e, "failed to read from ffmpeg pipe");
                    return Err(PipelineError::decode(format!(
                        "failed to read from ffmpeg pipe: {e}"
                    )));
                }
            }
        }

        let image = RgbImage::from_raw(self.metadata.width, self.metadata.height, buf)
            .ok_or_else(|| PipelineError::decode("failed to build image from raw frame data"))?;

        let frame_number = self.frames_read;
        let timestamp_seconds = frame_number as f64 / self.metadata.fps as f64;
        self.frames_read += 1;

        debug!(frame_number, timestamp_seconds, "decoded frame");

        Ok(Some(Frame::from_rgb(
            image,
            self.color_mode,
            frame_number,
            timestamp_seconds,
        )))
    }

    /// Release the decoder process. Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!(total_frames = self.frames_read, "closing video decoder");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        self.close();
    }
}
