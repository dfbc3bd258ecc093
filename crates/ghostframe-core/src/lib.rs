//! Motion-trail extraction: blend each video frame with a time-delayed,
//! inverted copy of an earlier frame. Static background cancels toward
//! white; moving objects leave dark ghost trails.
//!
//! The pipeline is strictly sequential: decode one frame, blend it against
//! the frame `offset` frames behind it, encode the result, repeat. Video
//! I/O goes through the system `ffmpeg`/`ffprobe` binaries over pipes.

pub mod blend;
pub mod delay;
pub mod error;
pub mod pipeline;
pub mod video;
