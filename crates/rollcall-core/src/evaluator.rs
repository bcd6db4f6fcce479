//! Match evaluation: oracle detections resolved against the session gallery.

use crate::types::{BoundingBox, Encoding, EuclideanMatcher, Gallery, Matcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label reported for faces with no gallery candidate.
pub const UNKNOWN_LABEL: &str = "Unknown";

pub const DEFAULT_TOLERANCE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle protocol error: {0}")]
    Protocol(String),
    #[error("oracle i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// One face located by the oracle, with its encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub encoding: Encoding,
}

/// External face localisation + encoding extraction.
///
/// Input is a packed RGB8 frame (`width * height * 3` bytes).
pub trait FaceOracle {
    fn analyze(&mut self, rgb: &[u8], width: u32, height: u32)
        -> Result<Vec<DetectedFace>, OracleError>;
}

/// A detected face resolved to a known identity or "Unknown".
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub label: String,
    pub bbox: BoundingBox,
    pub identity_id: Option<i64>,
    pub distance: Option<f32>,
}

impl Resolution {
    pub fn is_known(&self) -> bool {
        self.identity_id.is_some()
    }
}

/// Resolves oracle detections against a gallery. Never mutates the gallery.
pub struct Evaluator<M = EuclideanMatcher> {
    matcher: M,
    tolerance: f32,
}

impl Evaluator {
    pub fn new(tolerance: f32) -> Self {
        Self::with_matcher(EuclideanMatcher, tolerance)
    }
}

impl<M: Matcher> Evaluator<M> {
    pub fn with_matcher(matcher: M, tolerance: f32) -> Self {
        Self { matcher, tolerance }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Run the oracle on a match frame and resolve every detected face.
    pub fn evaluate<O: FaceOracle + ?Sized>(
        &self,
        oracle: &mut O,
        rgb: &[u8],
        width: u32,
        height: u32,
        gallery: &Gallery,
    ) -> Result<Vec<Resolution>, OracleError> {
        let faces = oracle.analyze(rgb, width, height)?;
        Ok(self.resolve_all(&faces, gallery))
    }

    pub fn resolve_all(&self, faces: &[DetectedFace], gallery: &Gallery) -> Vec<Resolution> {
        faces.iter().map(|f| self.resolve(f, gallery)).collect()
    }

    pub fn resolve(&self, face: &DetectedFace, gallery: &Gallery) -> Resolution {
        let result = self.matcher.compare(&face.encoding, gallery, self.tolerance);
        match (result.matched, result.identity_id, result.label) {
            (true, Some(id), Some(label)) => Resolution {
                label,
                bbox: face.bbox,
                identity_id: Some(id),
                distance: result.distance,
            },
            _ => Resolution {
                label: UNKNOWN_LABEL.to_string(),
                bbox: face.bbox,
                identity_id: None,
                distance: result.distance,
            },
        }
    }
}
