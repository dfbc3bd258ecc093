pub type PipelineResult<T> = Result<T, PipelineError>;

/// Everything that can end a run early, apart from a user abort
/// (which is an outcome, not an error — see [`crate::pipeline::RunOutcome`]).
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Invalid configuration, detected before any process is spawned.
    #[error("configuration error: {0}")]
    Config(String),

    /// The source or sink could not be opened.
    #[error("open error: {0}")]
    Open(String),

    /// A frame read failed mid-run.
    #[error("decode error: {0}")]
    Decode(String),

    /// A frame write failed mid-run.
    #[error("encode error: {0}")]
    Encode(String),

    /// Two frames with different dimensions or channel counts met where
    /// identical shapes are guaranteed. A defect, not a user-facing fault.
    #[error("frame shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (u32, u32, u8),
        actual: (u32, u32, u8),
    },

    /// The delay queue was popped while empty. A defect, not a user-facing fault.
    #[error("delay queue underflow: popped while empty")]
    Underflow,

    /// The stream ended before the delay queue could be filled. Cannot happen
    /// when the probed frame count is accurate, since the offset is validated
    /// against it up front.
    #[error("insufficient frames: stream ended after {read} frames while filling a {needed}-frame delay queue")]
    InsufficientFrames { read: u64, needed: u64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn open(msg: impl Into<String>) -> Self {
        Self::Open(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}
