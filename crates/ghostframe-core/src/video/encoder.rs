use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, PipelineResult};

use super::decoder::StreamMetadata;
use super::frame::{ColorMode, Frame};

/// Encodes frames by piping raw pixel data into the ffmpeg CLI.
///
/// The output container carries the source's exact resolution and frame rate
/// so playback speed and aspect ratio are preserved; the channel count
/// follows the run's color mode. We use the system `ffmpeg` binary rather
/// than native bindings, same as the decoder.
pub struct FfmpegEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    shape: (u32, u32, u8),
    out_path: PathBuf,
    frames_written: u64,
}

impl FfmpegEncoder {
    /// Open an encoder writing to `out_path` with the source's timing and
    /// resolution.
    pub fn open(
        out_path: &Path,
        metadata: StreamMetadata,
        color_mode: ColorMode,
    ) -> PipelineResult<Self> {
        if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::open(format!(
                    "failed to create output directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }

        if metadata.width % 2 != 0 || metadata.height % 2 != 0 {
            // libx264 with yuv420p needs even dimensions; let ffmpeg report
            // the failure, but flag the likely cause up front.
            warn!(
                width = metadata.width,
                height = metadata.height,
                "odd video dimensions, the encoder may reject them"
            );
        }

        let pix_fmt = match color_mode {
            ColorMode::Grayscale => "gray",
            ColorMode::Color => "rgb24",
        };

        info!(?out_path, pix_fmt, fps = metadata.fps, "spawning ffmpeg encoder process");

        let mut child = Command::new("ffmpeg")
            .args([
                "-y",
                "-loglevel", "error",
                "-f", "rawvideo",
                "-pix_fmt", pix_fmt,
                "-s", &format!("{}x{}", metadata.width, metadata.height),
                "-r", &metadata.fps.to_string(),
                "-i", "pipe:0",
                "-an",
                "-c:v", "libx264",
                "-pix_fmt", "yuv420p",
            ])
            .arg(out_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PipelineError::open(format!("failed to spawn ffmpeg — is ffmpeg installed? ({e})"))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PipelineError::open("ffmpeg stdin not available"))?;

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            shape: (metadata.width, metadata.height, color_mode.channels()),
            out_path: out_path.to_path_buf(),
            frames_written: 0,
        })
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append one encoded frame. The frame's shape must match the shape
    /// declared at open time.
    pub fn write(&mut self, frame: &Frame) -> PipelineResult<()> {
        if frame.shape() != self.shape {
            return Err(PipelineError::ShapeMismatch {
                expected: self.shape,
                actual: frame.shape(),
            });
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PipelineError::encode("encoder is already finalized"))?;

        stdin.write_all(frame.samples()).map_err(|e| {
            error!(frame = self.frames_written, %e, "failed to write frame to ffmpeg pipe");
            PipelineError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;

        self.frames_written += 1;
        debug!(frames_written = self.frames_written, "encoded frame");
        Ok(())
    }

    /// Finalize the container: close the pipe, wait for ffmpeg to write the
    /// trailer, and surface a non-zero exit. Idempotent; a second call is a
    /// no-op returning Ok.
    pub fn close(&mut self) -> PipelineResult<()> {
        drop(self.stdin.take());
        let Some(child) = self.child.take() else {
            return Ok(());
        };

        info!(frames_written = self.frames_written, "finalizing output video");

        let output = child
            .wait_with_output()
            .map_err(|e| PipelineError::encode(format!("failed to wait for ffmpeg to finish: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(status = ?output.status, %stderr, "ffmpeg encoder failed");
            return Err(PipelineError::encode(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        // Normal paths call close() explicitly; this only reaps the child if
        // the encoder is dropped mid-run.
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
