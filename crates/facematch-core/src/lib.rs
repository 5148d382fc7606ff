//! facematch-core — Identity matching and name autocomplete.
//!
//! Holds registered face embeddings in a case-insensitive registry,
//! matches query embeddings by exact Euclidean nearest neighbor, and indexes
//! display names in a prefix trie for search-as-you-type.

pub mod frame;
pub mod matcher;
pub mod quality;
pub mod registry;
pub mod trie;
pub mod types;

pub use frame::Frame;
pub use matcher::{Matcher, NearestNeighborMatcher, DEFAULT_MATCH_THRESHOLD};
pub use quality::{QualityConfig, QualityReport};
pub use registry::{normalize_name, EmbeddingRegistry};
pub use trie::NameTrie;
pub use types::{
    BoundingBox, Embedding, EmbeddingError, IdentityRecord, MatchResult, RecognitionResult,
};
