//! Decibel conversion and mapping between dB and the bounded storage range.

use ndarray::{Array2, ArrayView2};
use std::fmt;

use crate::config::AudioParams;

/// Normalized values that fell outside the configured bounds while clipping was off.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeAnomaly {
    pub count: usize,
    pub min: f32,
    pub max: f32,
    pub lower: f32,
    pub upper: f32,
}

impl fmt::Display for RangeAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} normalized value(s) outside [{}, {}] (observed {:.3}..{:.3})",
            self.count, self.lower, self.upper, self.min, self.max
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    min_level_db: f32,
    ref_level_db: f32,
    max_abs_value: f32,
    symmetric: bool,
    allow_clipping: bool,
}

impl Normalizer {
    pub fn new(
        min_level_db: f32,
        ref_level_db: f32,
        max_abs_value: f32,
        symmetric: bool,
        allow_clipping: bool,
    ) -> Self {
        Self {
            min_level_db,
            ref_level_db,
            max_abs_value,
            symmetric,
            allow_clipping,
        }
    }

    pub fn from_params(params: &AudioParams) -> Self {
        Self::new(
            params.min_level_db,
            params.ref_level_db,
            params.max_abs_value,
            params.symmetric_mels,
            params.allow_clipping_in_normalization,
        )
    }

    /// Smallest magnitude distinguished by the dB conversion, `10^(min_level_db / 20)`.
    pub fn magnitude_floor(&self) -> f32 {
        10f32.powf(self.min_level_db / 20.0)
    }

    /// (lower, upper) bounds of the normalized range.
    pub fn bounds(&self) -> (f32, f32) {
        if self.symmetric {
            (-self.max_abs_value, self.max_abs_value)
        } else {
            (0.0, self.max_abs_value)
        }
    }

    /// Magnitude to dB relative to `ref_level_db`, never below `min_level_db`.
    pub fn amp_to_db(&self, amp: f32) -> f32 {
        let db = 20.0 * amp.max(self.magnitude_floor()).log10() - self.ref_level_db;
        db.max(self.min_level_db)
    }

    /// Inverse of [`Normalizer::amp_to_db`] above the floor.
    pub fn db_to_amp(&self, db: f32) -> f32 {
        10f32.powf((db + self.ref_level_db) * 0.05)
    }

    /// Unclipped affine map from dB into the storage range.
    pub fn scale(&self, db: f32) -> f32 {
        let unit = (db - self.min_level_db) / -self.min_level_db;
        if self.symmetric {
            2.0 * self.max_abs_value * unit - self.max_abs_value
        } else {
            self.max_abs_value * unit
        }
    }

    /// Exact algebraic inverse of [`Normalizer::scale`].
    pub fn unscale(&self, value: f32) -> f32 {
        if self.symmetric {
            (value + self.max_abs_value) * -self.min_level_db / (2.0 * self.max_abs_value)
                + self.min_level_db
        } else {
            value * -self.min_level_db / self.max_abs_value + self.min_level_db
        }
    }

    pub fn normalize_value(&self, db: f32) -> f32 {
        let value = self.scale(db);
        if self.allow_clipping {
            let (lower, upper) = self.bounds();
            value.clamp(lower, upper)
        } else {
            value
        }
    }

    pub fn denormalize_value(&self, value: f32) -> f32 {
        if self.allow_clipping {
            let (lower, upper) = self.bounds();
            self.unscale(value.clamp(lower, upper))
        } else {
            self.unscale(value)
        }
    }

    /// Normalizes dB values in place. Without clipping, out-of-range results
    /// are kept and reported instead of corrected.
    pub fn normalize(&self, db: &mut Array2<f32>) -> Option<RangeAnomaly> {
        db.mapv_inplace(|v| self.normalize_value(v));
        if self.allow_clipping {
            None
        } else {
            self.check_range(db.view())
        }
    }

    pub fn denormalize(&self, values: ArrayView2<'_, f32>) -> Array2<f32> {
        values.mapv(|v| self.denormalize_value(v))
    }

    /// Reports values outside [`Normalizer::bounds`], if any.
    pub fn check_range(&self, values: ArrayView2<'_, f32>) -> Option<RangeAnomaly> {
        let (lower, upper) = self.bounds();
        let mut anomaly = RangeAnomaly {
            count: 0,
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            lower,
            upper,
        };
        for &v in values.iter() {
            anomaly.min = anomaly.min.min(v);
            anomaly.max = anomaly.max.max(v);
            if v < lower || v > upper {
                anomaly.count += 1;
            }
        }
        (anomaly.count > 0).then_some(anomaly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn normalizer(symmetric: bool, allow_clipping: bool) -> Normalizer {
        Normalizer::new(-100.0, 20.0, 4.0, symmetric, allow_clipping)
    }

    #[test]
    fn roundtrip_in_both_modes() {
        for symmetric in [true, false] {
            for clip in [true, false] {
                let n = normalizer(symmetric, clip);
                for i in 0..=100 {
                    let db = -(i as f32);
                    let back = n.denormalize_value(n.normalize_value(db));
                    assert!((back - db).abs() < 1e-4, "{} -> {} (symmetric={})", db, back, symmetric);
                }
            }
        }
    }

    #[test]
    fn bounds_map_to_range_ends() {
        let n = normalizer(true, true);
        assert_eq!(n.normalize_value(-100.0), -4.0);
        assert_eq!(n.normalize_value(0.0), 4.0);
        assert!((n.normalize_value(-50.0)).abs() < 1e-6);

        let n = normalizer(false, true);
        assert_eq!(n.normalize_value(-100.0), 0.0);
        assert_eq!(n.normalize_value(0.0), 4.0);
    }

    #[test]
    fn clipping_pins_values_below_the_floor() {
        assert_eq!(normalizer(true, true).normalize_value(-150.0), -4.0);
        assert_eq!(normalizer(false, true).normalize_value(-150.0), 0.0);
        assert_eq!(normalizer(true, true).normalize_value(30.0), 4.0);
    }

    #[test]
    fn unclipped_values_are_reported() {
        let n = normalizer(true, false);
        let mut db = array![[-50.0, 10.0], [-100.0, 0.0]];
        let anomaly = n.normalize(&mut db).expect("10 dB is above the ceiling");
        assert_eq!(anomaly.count, 1);
        assert!((anomaly.max - 4.8).abs() < 1e-5);
        assert!((db[[0, 1]] - 4.8).abs() < 1e-5);

        let mut db = array![[-50.0, -10.0]];
        assert!(n.normalize(&mut db).is_none());
    }

    #[test]
    fn clipped_normalize_never_reports() {
        let n = normalizer(false, true);
        let mut db = array![[25.0, -120.0]];
        assert!(n.normalize(&mut db).is_none());
        assert_eq!(db, array![[4.0, 0.0]]);
    }

    #[test]
    fn db_conversion_floors_silence() {
        let n = normalizer(true, true);
        assert_eq!(n.amp_to_db(0.0), -100.0);
        assert!(n.amp_to_db(0.0).is_finite());
        // 10^((20 + 20) / 20) = 100
        assert!((n.amp_to_db(100.0) - 20.0).abs() < 1e-4);
        assert!((n.db_to_amp(20.0) - 100.0).abs() < 1e-2);
        assert!((n.db_to_amp(n.amp_to_db(0.37)) - 0.37).abs() < 1e-5);
    }

    #[test]
    fn denormalize_clips_when_enabled() {
        let n = normalizer(true, true);
        let out = n.denormalize(array![[9.0, -9.0]].view());
        assert!((out[[0, 0]] - 0.0).abs() < 1e-5);
        assert!((out[[0, 1]] + 100.0).abs() < 1e-5);

        let n = normalizer(true, false);
        let out = n.denormalize(array![[4.8]].view());
        assert!((out[[0, 0]] - 10.0).abs() < 1e-4);
    }
}
