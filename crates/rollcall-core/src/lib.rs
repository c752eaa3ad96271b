//! rollcall-core — face engine and roster matching.
//!
//! SCRFD finds faces, ArcFace embeds them (both on ONNX Runtime), and the
//! matchers compare those embeddings against the reference roster.

pub mod alignment;
pub mod detector;
pub mod matching;
pub mod pipeline;
pub mod recognizer;
pub mod roster;
pub mod types;

use std::path::PathBuf;

pub use matching::{
    recognize_faces, CosineMatcher, FirstMatchMatcher, MatchPolicy, MatchResult, Matcher,
    Recognition, Recognized,
};
pub use pipeline::{EncodeError, FaceEncoder, OnnxFaceEncoder};
pub use roster::{
    load_roster, parse_reference_name, ReferenceIdentity, ReferenceName, RosterError,
};
pub use types::{BoundingBox, Embedding, FaceEncoding};

/// Where model files live when nothing else is configured.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/rollcall/models")
}
