use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("cannot average an empty set of embeddings")]
    Empty,
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector (typically 128-dimensional).
///
/// Serializes as a bare JSON array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Only the overlapping dimensions are compared; callers that care
    /// about mismatched lengths check [`dim`](Self::dim) first.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Element-wise mean of several samples of the same face.
    pub fn mean(samples: &[Embedding]) -> Result<Embedding, EmbeddingError> {
        let first = samples.first().ok_or(EmbeddingError::Empty)?;
        let dim = first.dim();
        let mut sum = vec![0.0f32; dim];

        for sample in samples {
            if sample.dim() != dim {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dim,
                    actual: sample.dim(),
                });
            }
            for (acc, v) in sum.iter_mut().zip(sample.values.iter()) {
                *acc += v;
            }
        }

        let n = samples.len() as f32;
        Ok(Embedding::new(sum.into_iter().map(|v| v / n).collect()))
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// A registered identity as held by the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: String,
    /// Display-cased name. Unique case-insensitively.
    pub name: String,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
}

/// Best registry entry for a query embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Normalized (lower-cased) registry key.
    pub name: String,
    /// `clamp(1 - distance, 0, 1)`. Not a calibrated probability.
    pub confidence: f32,
    pub distance: f32,
}

/// A match observed during a recognition pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub name: String,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}
