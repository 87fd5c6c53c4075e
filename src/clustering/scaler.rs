//! Per-column min-max scaling.

use ndarray::Array2;

/// Maps every column linearly onto `[0, 1]`.
///
/// Constant columns map to 0. Nothing is retained between calls, so each run
/// scales against its own scope.
pub fn min_max_scale(matrix: &Array2<f64>) -> Array2<f64> {
    let mut scaled = matrix.clone();
    for mut column in scaled.columns_mut() {
        let (min, max) = column
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;
        if !range.is_finite() || range.abs() < f64::EPSILON {
            column.fill(0.0);
        } else {
            column.mapv_inplace(|v| ((v - min) / range).clamp(0.0, 1.0));
        }
    }
    scaled
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_bounds_and_extremes() {
        let m = array![[2.0, 10.0], [4.0, 30.0], [6.0, 20.0]];
        let s = min_max_scale(&m);

        assert!(s.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(s[[0, 0]], 0.0);
        assert_eq!(s[[2, 0]], 1.0);
        assert_eq!(s[[0, 1]], 0.0);
        assert_eq!(s[[1, 1]], 1.0);
        assert_eq!(s[[2, 1]], 0.5);
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let m = array![[7.0, 1.0], [7.0, 2.0]];
        let s = min_max_scale(&m);
        assert_eq!(s[[0, 0]], 0.0);
        assert_eq!(s[[1, 0]], 0.0);
        assert!(s.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_deterministic() {
        let m = array![[1.0, 5.0], [3.0, 2.0], [2.0, 9.0]];
        assert_eq!(min_max_scale(&m), min_max_scale(&m));
    }
}
