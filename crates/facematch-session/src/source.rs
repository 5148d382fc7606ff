//! Boundary to the external face detection / embedding model.

use facematch_core::{BoundingBox, Embedding, Frame};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// One face found in a frame: where it is, and what it looks like.
#[derive(Debug, Clone)]
pub struct FaceDetection {
    /// Face region; landmarks ride along inside.
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Turns frames into face embeddings.
///
/// "No face" is an empty result, not an error. Errors are reserved for
/// the model itself failing. Nothing in this crate retries a call.
pub trait EmbeddingSource: Send {
    fn is_loaded(&self) -> bool;

    /// Load model weights. Called at most once per session unless it fails.
    fn load_models(&mut self) -> Result<(), SourceError>;

    /// Every face in the frame, most confident first.
    fn extract_all(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>, SourceError>;

    /// Embedding of the most confident face, if any.
    fn extract(&mut self, frame: &Frame) -> Result<Option<Embedding>, SourceError> {
        Ok(self
            .extract_all(frame)?
            .into_iter()
            .next()
            .map(|d| d.embedding))
    }
}

/// Supplies frames to the periodic recognition loop.
pub trait FrameFeed: Send {
    /// Next frame, or `None` once the feed is exhausted.
    fn next_frame(&mut self) -> Option<Frame>;
}

impl<I> FrameFeed for I
where
    I: Iterator<Item = Frame> + Send,
{
    fn next_frame(&mut self) -> Option<Frame> {
        self.next()
    }
}
