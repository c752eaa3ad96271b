//! Matching probe embeddings against the reference roster.

use crate::pipeline::{EncodeError, FaceEncoder};
use crate::roster::ReferenceIdentity;
use crate::types::{BoundingBox, Embedding};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result of matching one probe embedding against the roster.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the reported candidate [-1, 1].
    pub similarity: f32,
    /// Roster position of the matched identity (if any).
    pub index: Option<usize>,
}

impl MatchResult {
    fn miss(similarity: f32) -> Self {
        Self {
            matched: false,
            similarity,
            index: None,
        }
    }
}

/// Strategy for comparing a probe embedding against the roster.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, roster: &[ReferenceIdentity], threshold: f32)
        -> MatchResult;
}

/// Accepts the first identity, in roster order, that clears the threshold.
///
/// Later identities are never examined once one matches, even if they are
/// closer to the probe.
pub struct FirstMatchMatcher;

impl Matcher for FirstMatchMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        roster: &[ReferenceIdentity],
        threshold: f32,
    ) -> MatchResult {
        let mut best_miss = f32::NEG_INFINITY;
        for (i, identity) in roster.iter().enumerate() {
            let sim = probe.similarity(&identity.embedding);
            if sim >= threshold {
                return MatchResult {
                    matched: true,
                    similarity: sim,
                    index: Some(i),
                };
            }
            best_miss = best_miss.max(sim);
        }
        MatchResult::miss(if roster.is_empty() { 0.0 } else { best_miss })
    }
}

/// Scans the whole roster and accepts the most similar identity.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        roster: &[ReferenceIdentity],
        threshold: f32,
    ) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, identity) in roster.iter().enumerate() {
            let sim = probe.similarity(&identity.embedding);
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim >= threshold => MatchResult {
                matched: true,
                similarity: best_sim,
                index: Some(idx),
            },
            Some(_) => MatchResult::miss(best_sim),
            None => MatchResult::miss(0.0),
        }
    }
}

/// Tie-break policy selecting the [`Matcher`] used for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    #[default]
    First,
    Best,
}

impl MatchPolicy {
    pub fn matcher(self) -> &'static dyn Matcher {
        match self {
            MatchPolicy::First => &FirstMatchMatcher,
            MatchPolicy::Best => &CosineMatcher,
        }
    }
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(MatchPolicy::First),
            "best" => Ok(MatchPolicy::Best),
            other => Err(format!("unknown match policy '{other}' (expected first or best)")),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchPolicy::First => "first",
            MatchPolicy::Best => "best",
        })
    }
}

/// A face in a frame that matched a roster identity.
#[derive(Debug, Clone)]
pub struct Recognized {
    pub index: usize,
    pub name: String,
    pub similarity: f32,
    pub bbox: BoundingBox,
}

/// Everything found in one frame.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    pub recognized: Vec<Recognized>,
    /// Faces that matched nobody; kept only for drawing.
    pub unknown: Vec<BoundingBox>,
}

/// Encode all faces in `rgb` and match each against `roster`.
pub fn recognize_faces(
    encoder: &mut dyn FaceEncoder,
    matcher: &dyn Matcher,
    rgb: &[u8],
    width: u32,
    height: u32,
    roster: &[ReferenceIdentity],
    threshold: f32,
) -> Result<Recognition, EncodeError> {
    let mut out = Recognition::default();

    for face in encoder.encode(rgb, width, height)? {
        let result = matcher.compare(&face.embedding, roster, threshold);
        match result.index {
            Some(index) if result.matched => out.recognized.push(Recognized {
                index,
                name: roster[index].display_name(),
                similarity: result.similarity,
                bbox: face.bbox,
            }),
            _ => {
                tracing::debug!(similarity = result.similarity, "face did not match any reference");
                out.unknown.push(face.bbox);
            }
        }
    }

    Ok(out)
}
