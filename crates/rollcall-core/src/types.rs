use serde::{Deserialize, Serialize};

/// Bounding box of a detected face, in pixel coordinates of the frame it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Map a box found in a downscaled frame back onto the full-size frame.
    pub fn rescale(&self, factor: f32) -> BoundingBox {
        if factor <= 0.0 {
            return *self;
        }
        BoundingBox {
            x: self.x / factor,
            y: self.y / factor,
            width: self.width / factor,
            height: self.height / factor,
        }
    }
}

/// Face encoding vector produced by the matching oracle.
///
/// Serialises as a bare array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two encodings. Lower = more similar.
    pub fn distance(&self, other: &Encoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Element-wise mean of a set of same-dimension encodings.
    ///
    /// Returns `None` for an empty set or mixed dimensions.
    pub fn mean(samples: &[Encoding]) -> Option<Encoding> {
        let first = samples.first()?;
        let dim = first.dimension();
        if samples.iter().any(|s| s.dimension() != dim) {
            return None;
        }

        let mut sum = vec![0.0f64; dim];
        for sample in samples {
            for (acc, v) in sum.iter_mut().zip(&sample.values) {
                *acc += f64::from(*v);
            }
        }
        let n = samples.len() as f64;
        Some(Encoding {
            values: sum.into_iter().map(|v| (v / n) as f32).collect(),
        })
    }

    /// Little-endian `f32` byte layout used for persistence.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Inverse of [`to_le_bytes`](Self::to_le_bytes). `None` if the length is not a multiple of 4.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Encoding> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Some(Encoding { values })
    }
}

/// A registered person, as owned by the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub display_name: String,
    pub roll: String,
    pub encoding: Encoding,
}

/// Session-scoped, denormalized copy of an identity used for matching.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity_id: i64,
    pub encoding: Encoding,
    pub label: String,
}

/// Read-only snapshot of every registered identity, rebuilt on each session start.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn from_identities(identities: Vec<Identity>) -> Self {
        let entries = identities
            .into_iter()
            .map(|i| GalleryEntry {
                identity_id: i.id,
                label: format!("{} ({})", i.display_name, i.roll),
                encoding: i.encoding,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of matching a query encoding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the nearest entry (`None` if nothing was comparable).
    pub distance: Option<f32>,
    pub identity_id: Option<i64>,
    pub label: Option<String>,
}

/// Strategy for comparing a query encoding against the gallery.
pub trait Matcher {
    fn compare(&self, query: &Encoding, gallery: &Gallery, tolerance: f32) -> MatchResult;
}

/// Nearest-neighbour matcher over Euclidean distance.
///
/// An entry is a candidate when its distance is `<= tolerance`. The
/// minimum-distance candidate wins; exact ties go to the lowest identity id
/// so the outcome never depends on gallery ordering. Entries whose
/// dimension differs from the query are skipped.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, query: &Encoding, gallery: &Gallery, tolerance: f32) -> MatchResult {
        let mut best: Option<(f32, &GalleryEntry)> = None;

        for entry in gallery.entries() {
            if entry.encoding.dimension() != query.dimension() {
                tracing::warn!(
                    identity_id = entry.identity_id,
                    expected = query.dimension(),
                    actual = entry.encoding.dimension(),
                    "gallery entry dimension mismatch; skipping"
                );
                continue;
            }
            let dist = query.distance(&entry.encoding);
            let is_better = match best {
                None => true,
                Some((best_dist, best_entry)) => {
                    dist < best_dist
                        || (dist == best_dist && entry.identity_id < best_entry.identity_id)
                }
            };
            if is_better {
                best = Some((dist, entry));
            }
        }

        match best {
            Some((dist, entry)) if dist <= tolerance => MatchResult {
                matched: true,
                distance: Some(dist),
                identity_id: Some(entry.identity_id),
                label: Some(entry.label.clone()),
            },
            Some((dist, _)) => MatchResult {
                matched: false,
                distance: Some(dist),
                identity_id: None,
                label: None,
            },
            None => MatchResult {
                matched: false,
                distance: None,
                identity_id: None,
                label: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: i64, roll: &str, values: Vec<f32>) -> Identity {
        Identity {
            id,
            display_name: format!("Person {id}"),
            roll: roll.into(),
            encoding: Encoding::new(values),
        }
    }

    #[test]
    fn test_distance_identical() {
        let a = Encoding::new(vec![0.1, 0.2, 0.3]);
        assert_eq!(a.distance(&a.clone()), 0.0);
    }

    #[test]
    fn test_distance_pythagorean() {
        let a = Encoding::new(vec![0.0, 0.0]);
        let b = Encoding::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_mean_of_samples() {
        let samples = vec![Encoding::new(vec![1.0, 0.0]), Encoding::new(vec![0.0, 1.0])];
        let mean = Encoding::mean(&samples).unwrap();
        assert_eq!(mean.values, vec![0.5, 0.5]);
    }

    #[test]
    fn test_mean_rejects_mixed_dimensions() {
        let samples = vec![Encoding::new(vec![1.0, 0.0]), Encoding::new(vec![1.0])];
        assert!(Encoding::mean(&samples).is_none());
        assert!(Encoding::mean(&[]).is_none());
    }

    #[test]
    fn test_le_bytes_rejects_truncated_blob() {
        assert!(Encoding::from_le_bytes(&[0, 0, 128]).is_none());
        assert_eq!(Encoding::from_le_bytes(&[]).unwrap().dimension(), 0);
    }

    #[test]
    fn test_gallery_label_format() {
        let gallery = Gallery::from_identities(vec![identity(1, "R001", vec![0.0])]);
        assert_eq!(gallery.entries()[0].label, "Person 1 (R001)");
    }

    #[test]
    fn test_matcher_picks_nearest_within_tolerance() {
        let gallery = Gallery::from_identities(vec![
            identity(1, "R001", vec![0.4, 0.0]),
            identity(2, "R002", vec![0.1, 0.0]),
            identity(3, "R003", vec![5.0, 5.0]),
        ]);
        let query = Encoding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&query, &gallery, 0.5);
        assert!(result.matched);
        assert_eq!(result.identity_id, Some(2));
        assert_eq!(result.label.as_deref(), Some("Person 2 (R002)"));
    }

    #[test]
    fn test_matcher_tolerance_is_inclusive() {
        let gallery = Gallery::from_identities(vec![identity(1, "R001", vec![0.5])]);
        let result = EuclideanMatcher.compare(&Encoding::new(vec![0.0]), &gallery, 0.5);
        assert!(result.matched);
    }

    #[test]
    fn test_matcher_no_candidate() {
        let gallery = Gallery::from_identities(vec![identity(1, "R001", vec![1.0, 1.0])]);
        let result = EuclideanMatcher.compare(&Encoding::new(vec![0.0, 0.0]), &gallery, 0.5);
        assert!(!result.matched);
        assert!(result.identity_id.is_none());
        assert!(result.distance.unwrap() > 0.5);
    }

    #[test]
    fn test_matcher_exact_tie_prefers_lowest_id() {
        // Id 7 is listed first but id 3 must win the tie.
        let gallery = Gallery::from_identities(vec![
            identity(7, "R007", vec![0.2, 0.0]),
            identity(3, "R003", vec![-0.2, 0.0]),
        ]);
        let result = EuclideanMatcher.compare(&Encoding::new(vec![0.0, 0.0]), &gallery, 0.5);
        assert_eq!(result.identity_id, Some(3));
    }

    #[test]
    fn test_matcher_skips_dimension_mismatch() {
        let gallery = Gallery::from_identities(vec![
            identity(1, "R001", vec![0.0, 0.0, 0.0]),
            identity(2, "R002", vec![0.3, 0.0]),
        ]);
        let result = EuclideanMatcher.compare(&Encoding::new(vec![0.0, 0.0]), &gallery, 0.5);
        assert_eq!(result.identity_id, Some(2));
    }

    #[test]
    fn test_matcher_empty_gallery() {
        let result = EuclideanMatcher.compare(&Encoding::new(vec![0.0]), &Gallery::default(), 0.5);
        assert!(!result.matched);
        assert!(result.distance.is_none());
    }

    #[test]
    fn test_rescale_box() {
        let b = BoundingBox { x: 10.0, y: 5.0, width: 20.0, height: 25.0 };
        let full = b.rescale(0.25);
        assert_eq!(full, BoundingBox { x: 40.0, y: 20.0, width: 80.0, height: 100.0 });
    }
}
