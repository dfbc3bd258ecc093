use std::collections::VecDeque;

use crate::error::{PipelineError, PipelineResult};
use crate::video::frame::Frame;

/// Bounded FIFO holding the frames "in flight" between the live read position
/// and the ghost position `offset` frames behind it.
///
/// Usage is strictly "fill to `offset`, then pop and push exactly once per
/// processed frame", so the length is constant at steady state.
#[derive(Debug, Default)]
pub struct DelayQueue {
    frames: VecDeque<Frame>,
}

impl DelayQueue {
    pub fn new() -> DelayQueue {
        DelayQueue {
            frames: VecDeque::new(),
        }
    }

    pub fn push_back(&mut self, frame: Frame) {
        self.frames.push_back(frame);
    }

    /// Remove and return the oldest frame. Popping an empty queue is a driver
    /// bug, surfaced as `Underflow` rather than corrupting output.
    pub fn pop_front(&mut self) -> PipelineResult<Frame> {
        self.frames.pop_front().ok_or(PipelineError::Underflow)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
