//! Reference roster: labeled face images loaded once at startup.
//!
//! Each reference image is named `<roll>_<prn>_<first>_<last>_<division>.jpg`
//! (or `.jpeg`). The division field is cut at its first `.`.

use crate::pipeline::{EncodeError, FaceEncoder};
use crate::types::Embedding;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("cannot read reference directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("reference file name '{0}' is not <roll>_<prn>_<first>_<last>_<division>.jpg")]
    MalformedName(String),
    #[error("cannot decode reference image {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("no face found in reference image {0}")]
    NoFace(PathBuf),
    #[error("encoding reference image {path}: {source}")]
    Encode {
        path: PathBuf,
        source: EncodeError,
    },
}

/// Identity fields parsed from a reference file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceName {
    pub roll_number: String,
    pub prn: String,
    pub first_name: String,
    pub last_name: String,
    pub division: String,
}

/// A known person and their reference embedding.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceIdentity {
    pub roll_number: String,
    pub prn: String,
    pub first_name: String,
    pub last_name: String,
    pub division: String,
    #[serde(skip)]
    pub embedding: Embedding,
}

impl ReferenceIdentity {
    fn new(name: ReferenceName, embedding: Embedding) -> Self {
        Self {
            roll_number: name.roll_number,
            prn: name.prn,
            first_name: name.first_name,
            last_name: name.last_name,
            division: name.division,
            embedding,
        }
    }

    /// "First Last".
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Parse `roll_prn_first_last_division.ext` into its five fields.
pub fn parse_reference_name(file_name: &str) -> Result<ReferenceName, RosterError> {
    let parts: Vec<&str> = file_name.split('_').collect();
    let [roll, prn, first, last, division] = parts.as_slice() else {
        return Err(RosterError::MalformedName(file_name.to_string()));
    };

    let division = division.split('.').next().unwrap_or_default();

    Ok(ReferenceName {
        roll_number: roll.to_string(),
        prn: prn.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        division: division.to_string(),
    })
}

/// `.jpg` / `.jpeg`, case-insensitive.
pub fn is_reference_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

/// Load every reference image under `dir`, in file-name order.
///
/// Any malformed name, undecodable image or face-less image aborts the whole
/// load; no partial roster is returned.
pub fn load_roster(
    dir: &Path,
    encoder: &mut dyn FaceEncoder,
) -> Result<Vec<ReferenceIdentity>, RosterError> {
    let read_dir = |source| RosterError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_dir)? {
        let path = entry.map_err(read_dir)?.path();
        if path.is_file() && is_reference_image(&path) {
            paths.push(path);
        } else {
            tracing::debug!(path = %path.display(), "skipping non-reference entry");
        }
    }
    paths.sort();

    let mut roster = Vec::with_capacity(paths.len());
    for path in paths {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = parse_reference_name(&file_name)?;

        let img = image::open(&path)
            .map_err(|source| RosterError::Decode {
                path: path.clone(),
                source,
            })?
            .to_rgb8();

        let faces = encoder
            .encode(img.as_raw(), img.width(), img.height())
            .map_err(|source| RosterError::Encode {
                path: path.clone(),
                source,
            })?;

        let face = faces
            .into_iter()
            .next()
            .ok_or_else(|| RosterError::NoFace(path.clone()))?;

        let identity = ReferenceIdentity::new(name, face.embedding);
        tracing::info!(
            roll = %identity.roll_number,
            prn = %identity.prn,
            name = %identity.display_name(),
            division = %identity.division,
            "loaded reference face"
        );
        roster.push(identity);
    }

    tracing::info!(count = roster.len(), dir = %dir.display(), "reference roster loaded");
    Ok(roster)
}
