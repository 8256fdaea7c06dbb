//! Dominant-colour analysis.
//!
//! Pixels are clustered with k-means into at most `k` colours. Seeding is
//! deterministic (luminance quantiles over the distinct colours) so the same
//! image always yields the same artifact. Each cluster is reported with its
//! mean colour, pixel count and nearest palette name.

use super::{
    Artifact, ArtifactKind, IMAGE_CONTENT_TYPES, MetadataProcessor, ObjectDescriptor,
    ProcessorError, codec, palette,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CLUSTERS: usize = 3;
const MAX_ITERATIONS: usize = 32;
/// Images are downsampled to fit this box before clustering.
const SAMPLE_SIZE: u32 = 256;

/// One dominant colour, as written to `meta/color/<hash>.json`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ColorCluster {
    pub rgb: [u8; 3],
    pub count: usize,
    pub hex: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ColorProcessor {
    pub clusters: usize,
}

impl Default for ColorProcessor {
    fn default() -> Self {
        Self {
            clusters: DEFAULT_CLUSTERS,
        }
    }
}

impl MetadataProcessor for ColorProcessor {
    fn name(&self) -> &'static str {
        "color"
    }

    fn accepted_content_types(&self) -> &'static [&'static str] {
        IMAGE_CONTENT_TYPES
    }

    fn process(
        &self,
        object: &ObjectDescriptor,
        content: &[u8],
    ) -> Result<Vec<Artifact>, ProcessorError> {
        let img = codec::decode(content)?;
        let img = if img.width() > SAMPLE_SIZE || img.height() > SAMPLE_SIZE {
            img.thumbnail(SAMPLE_SIZE, SAMPLE_SIZE)
        } else {
            img
        };
        let pixels: Vec<[u8; 3]> = img.to_rgb8().pixels().map(|p| p.0).collect();

        let clusters = classify(&kmeans(&pixels, self.clusters));
        let body = serde_json::to_vec(&clusters)?;
        Ok(vec![Artifact::for_blob(object, ArtifactKind::Json, body)])
    }
}

/// Attach hex codes and palette names to raw `(colour, count)` clusters.
pub fn classify(clusters: &[([u8; 3], usize)]) -> Vec<ColorCluster> {
    clusters
        .iter()
        .map(|(rgb, count)| ColorCluster {
            rgb: *rgb,
            count: *count,
            hex: format!("#{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2]),
            name: palette::nearest(*rgb).0.name.to_string(),
        })
        .collect()
}

fn luminance(c: [u8; 3]) -> u32 {
    299 * u32::from(c[0]) + 587 * u32::from(c[1]) + 114 * u32::from(c[2])
}

fn squared_distance(a: [u8; 3], b: [f64; 3]) -> f64 {
    (0..3)
        .map(|i| {
            let d = f64::from(a[i]) - b[i];
            d * d
        })
        .sum()
}

/// Cluster `pixels` into at most `k` colours, largest cluster first.
pub fn kmeans(pixels: &[[u8; 3]], k: usize) -> Vec<([u8; 3], usize)> {
    if pixels.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut distinct: Vec<[u8; 3]> = pixels.to_vec();
    distinct.sort_unstable_by_key(|c| (luminance(*c), *c));
    distinct.dedup();

    let k = k.min(distinct.len());
    let mut centroids: Vec<[f64; 3]> = (0..k)
        .map(|i| {
            let c = distinct[(2 * i + 1) * distinct.len() / (2 * k)];
            [f64::from(c[0]), f64::from(c[1]), f64::from(c[2])]
        })
        .collect();

    let mut assignments = vec![usize::MAX; pixels.len()];
    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (pixel, assigned) in pixels.iter().zip(assignments.iter_mut()) {
            let mut best = 0;
            let mut best_distance = f64::MAX;
            for (i, centroid) in centroids.iter().enumerate() {
                let d = squared_distance(*pixel, *centroid);
                if d < best_distance {
                    best = i;
                    best_distance = d;
                }
            }
            if *assigned != best {
                *assigned = best;
                changed = true;
            }
        }

        let mut sums = vec![[0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (pixel, cluster) in pixels.iter().zip(assignments.iter()) {
            counts[*cluster] += 1;
            for channel in 0..3 {
                sums[*cluster][channel] += f64::from(pixel[channel]);
            }
        }
        for i in 0..k {
            if counts[i] > 0 {
                let n = counts[i] as f64;
                centroids[i] = [sums[i][0] / n, sums[i][1] / n, sums[i][2] / n];
            }
        }

        if !changed {
            break;
        }
    }

    let mut counts = vec![0usize; k];
    for cluster in &assignments {
        counts[*cluster] += 1;
    }

    let mut result: Vec<([u8; 3], usize)> = centroids
        .iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(c, count)| {
            let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
            ([channel(c[0]), channel(c[1]), channel(c[2])], count)
        })
        .collect();
    result.sort_by(|a, b| b.1.cmp(&a.1));
    result
}
