use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "ghostframe",
    about = "Extract a motion-trail visualization from a video by blending each frame with a delayed, inverted earlier frame."
)]
pub struct Cli {
    /// Input video file(s). With multiple inputs, each is processed
    /// independently and a failure on one does not stop the rest.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Number of frames to delay the ghost by. Larger offsets track slower
    /// motion more effectively and vice versa.
    #[arg(short = 'o', long, conflicts_with = "offset_seconds")]
    pub frame_offset: Option<u32>,

    /// Delay expressed as a duration in seconds, converted to frames
    /// against the source frame rate.
    #[arg(long)]
    pub offset_seconds: Option<f64>,

    /// Keep color instead of converting to grayscale (roughly half as fast).
    #[arg(long)]
    pub color: bool,

    /// Output file path. Only valid with a single input; the default is
    /// "<input-stem>-motion-extraction-offset-<offset>.mp4" next to the input.
    #[arg(long, conflicts_with = "out_dir")]
    pub out: Option<PathBuf>,

    /// Directory to place outputs in, keeping each input's original file
    /// name.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Suppress the progress bar and per-file status lines.
    #[arg(long)]
    pub quiet: bool,
}
