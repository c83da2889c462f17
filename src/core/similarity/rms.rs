//! RMS pixel distance, serial and row-sharded.

use super::{default_shard_count, NEAR_DUPLICATE_THRESHOLD};
use crate::error::MetricError;
use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How the blue channel contributes to the accumulated squares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceFormula {
    /// Plain RMS over red, green and blue differences
    #[default]
    Rms,
    /// Bit-for-bit reproduction of corpora curated with the old tool, whose
    /// blue term was `green_diff * blue_diff`. The accumulator can go
    /// negative, giving a NaN distance that never counts as a near-duplicate.
    LegacyGreenBlue,
}

impl std::fmt::Display for DistanceFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceFormula::Rms => write!(f, "rms"),
            DistanceFormula::LegacyGreenBlue => write!(f, "legacy_green_blue"),
        }
    }
}

/// Computes distances between sample bitmaps and applies the
/// near-duplicate threshold.
#[derive(Debug, Clone)]
pub struct SimilarityMetric {
    formula: DistanceFormula,
    threshold: f64,
    shards: usize,
}

impl Default for SimilarityMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityMetric {
    /// RMS metric with the standard threshold of 10
    pub fn new() -> Self {
        Self {
            formula: DistanceFormula::Rms,
            threshold: NEAR_DUPLICATE_THRESHOLD,
            shards: default_shard_count(),
        }
    }

    /// Select the blue-channel formula
    pub fn with_formula(mut self, formula: DistanceFormula) -> Self {
        self.formula = formula;
        self
    }

    /// Override the near-duplicate threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Override the shard count of the parallel variant
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards.max(1);
        self
    }

    pub fn formula(&self) -> DistanceFormula {
        self.formula
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn shards(&self) -> usize {
        self.shards
    }

    /// Distance is only defined for bitmaps of identical dimensions
    pub fn check_dimensions(a: &RgbaImage, b: &RgbaImage) -> Result<(), MetricError> {
        if a.dimensions() == b.dimensions() {
            Ok(())
        } else {
            Err(MetricError::DimensionMismatch {
                left: a.dimensions(),
                right: b.dimensions(),
            })
        }
    }

    /// Single-threaded distance
    pub fn distance(&self, a: &RgbaImage, b: &RgbaImage) -> Result<f64, MetricError> {
        Self::check_dimensions(a, b)?;
        let acc = sum_of_squares(self.formula, a.as_raw(), b.as_raw());
        Ok(finish(acc, pixel_count(a)))
    }

    /// Distance with image rows split across `shards` parallel tasks
    pub fn distance_parallel(&self, a: &RgbaImage, b: &RgbaImage) -> Result<f64, MetricError> {
        Self::check_dimensions(a, b)?;

        let (width, height) = a.dimensions();
        let row_bytes = width as usize * 4;
        if row_bytes == 0 || height == 0 {
            return Ok(0.0);
        }

        let rows_per_shard = (height as usize).div_ceil(self.shards).max(1);
        let shard_bytes = row_bytes * rows_per_shard;
        let formula = self.formula;

        let acc: i64 = a
            .as_raw()
            .par_chunks(shard_bytes)
            .zip(b.as_raw().par_chunks(shard_bytes))
            .map(|(left, right)| sum_of_squares(formula, left, right))
            .sum();

        Ok(finish(acc, pixel_count(a)))
    }

    /// Whether a computed distance marks two samples as near-duplicates
    pub fn is_near_duplicate(&self, distance: f64) -> bool {
        distance < self.threshold
    }
}

fn pixel_count(image: &RgbaImage) -> u64 {
    u64::from(image.width()) * u64::from(image.height())
}

fn sum_of_squares(formula: DistanceFormula, left: &[u8], right: &[u8]) -> i64 {
    left.chunks_exact(4)
        .zip(right.chunks_exact(4))
        .map(|(p, q)| {
            let dr = i64::from(p[0]) - i64::from(q[0]);
            let dg = i64::from(p[1]) - i64::from(q[1]);
            let db = i64::from(p[2]) - i64::from(q[2]);
            let blue = match formula {
                DistanceFormula::Rms => db * db,
                DistanceFormula::LegacyGreenBlue => dg * db,
            };
            dr * dr + dg * dg + blue
        })
        .sum()
}

fn finish(acc: i64, pixels: u64) -> f64 {
    if pixels == 0 {
        return 0.0;
    }
    (acc as f64 / (pixels * 3) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    fn noisy(width: u32, height: u32, seed: u32) -> RgbaImage {
        let mut state = seed;
        RgbaImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let bytes = state.to_le_bytes();
            Rgba([bytes[0], bytes[1], bytes[2], bytes[3]])
        })
    }

    #[test]
    fn distance_to_self_is_zero() {
        let metric = SimilarityMetric::new();
        let image = noisy(17, 9, 3);
        assert_eq!(metric.distance(&image, &image).unwrap(), 0.0);
        assert_eq!(metric.distance_parallel(&image, &image).unwrap(), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        for formula in [DistanceFormula::Rms, DistanceFormula::LegacyGreenBlue] {
            let metric = SimilarityMetric::new().with_formula(formula);
            let a = noisy(12, 7, 1);
            let b = noisy(12, 7, 2);
            let ab = metric.distance(&a, &b).unwrap();
            let ba = metric.distance(&b, &a).unwrap();
            assert!(ab == ba || (ab.is_nan() && ba.is_nan()));
        }
    }

    #[test]
    fn uniform_red_shift_has_known_distance() {
        let metric = SimilarityMetric::new();
        let a = solid(4, 4, [100, 50, 50]);
        let b = solid(4, 4, [130, 50, 50]);

        let distance = metric.distance(&a, &b).unwrap();

        assert!((distance - 300f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn alpha_is_ignored() {
        let metric = SimilarityMetric::new();
        let a = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 0]));
        let b = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 255]));
        assert_eq!(metric.distance(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn parallel_matches_serial() {
        for shards in [1, 3, 8, 64] {
            let metric = SimilarityMetric::new().with_shards(shards);
            let a = noisy(31, 19, 11);
            let b = noisy(31, 19, 12);

            let serial = metric.distance(&a, &b).unwrap();
            let parallel = metric.distance_parallel(&a, &b).unwrap();

            assert!((serial - parallel).abs() < 1e-9, "shards = {shards}");
        }
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let metric = SimilarityMetric::new();
        let a = solid(4, 4, [0, 0, 0]);
        let b = solid(4, 5, [0, 0, 0]);

        let err = metric.distance(&a, &b).unwrap_err();
        assert_eq!(
            err,
            MetricError::DimensionMismatch {
                left: (4, 4),
                right: (4, 5)
            }
        );
        assert!(metric.distance_parallel(&a, &b).is_err());
    }

    #[test]
    fn threshold_is_exclusive() {
        let metric = SimilarityMetric::new();
        assert!(metric.is_near_duplicate(9.999));
        assert!(!metric.is_near_duplicate(10.0));
        assert!(!metric.is_near_duplicate(f64::NAN));
    }

    #[test]
    fn legacy_formula_can_go_negative() {
        let a = solid(2, 2, [0, 1, 0]);
        let b = solid(2, 2, [0, 0, 10]);

        let rms = SimilarityMetric::new().distance(&a, &b).unwrap();
        let legacy = SimilarityMetric::new()
            .with_formula(DistanceFormula::LegacyGreenBlue)
            .distance(&a, &b)
            .unwrap();

        assert!((rms - (101f64 / 3.0).sqrt()).abs() < 1e-9);
        assert!(legacy.is_nan());
    }

    #[test]
    fn empty_images_are_identical() {
        let metric = SimilarityMetric::new();
        let a = RgbaImage::new(0, 0);
        assert_eq!(metric.distance(&a, &a).unwrap(), 0.0);
        assert_eq!(metric.distance_parallel(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn formula_serializes_snake_case() {
        let json = serde_json::to_string(&DistanceFormula::LegacyGreenBlue).unwrap();
        assert_eq!(json, "\"legacy_green_blue\"");
    }

    #[test]
    fn formula_display_matches_config_spelling() {
        for formula in [DistanceFormula::Rms, DistanceFormula::LegacyGreenBlue] {
            let json = serde_json::to_string(&formula).unwrap();
            assert_eq!(json, format!("\"{formula}\""));
        }
    }
}
