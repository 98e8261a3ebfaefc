//! Cross-sectional statistics for factor standardization.
//!
//! Z-scores are always computed over the current universe only, never
//! pooled across dates. Non-finite inputs are excluded from the moment
//! estimates and map to a neutral score of zero.

use ndarray::Array1;

/// Minimum threshold for standard deviation to avoid division by zero.
/// Below this the cross-section carries no information and every score
/// collapses to zero.
pub const MIN_STD_THRESHOLD: f64 = 1e-10;

/// Cross-sectional moments used for standardization, retained for audit.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UniverseStats {
    /// Mean over finite values.
    pub mean: f64,
    /// Population standard deviation over finite values.
    pub std: f64,
    /// Number of finite values.
    pub count: usize,
}

impl UniverseStats {
    /// Moments of an empty or all-NaN cross-section.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            mean: f64::NAN,
            std: f64::NAN,
            count: 0,
        }
    }
}

/// Compute cross-sectional mean and population standard deviation over the
/// finite values of a slice.
#[must_use]
pub fn universe_stats(values: &[f64]) -> UniverseStats {
    let finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.is_empty() {
        return UniverseStats::empty();
    }

    let n = finite.len();
    let mean = finite.iter().sum::<f64>() / n as f64;
    let variance = finite.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;

    UniverseStats {
        mean,
        std: variance.sqrt(),
        count: n,
    }
}

/// Standardize a cross-section to winsorized z-scores.
///
/// Each finite value maps to `clamp((x − μ) / σ, −limit, +limit)`; non-finite
/// values map to the neutral score 0. When the cross-section is degenerate
/// (fewer than two finite values, or σ below [`MIN_STD_THRESHOLD`]), every
/// score is 0.
///
/// # Examples
///
/// ```
/// use dakhla_traits::stats::zscore;
///
/// let (z, stats) = zscore(&[0.05, 0.03, 0.01], 3.0);
/// assert_eq!(stats.count, 3);
/// assert!((z[0] - 1.2247).abs() < 1e-3);
/// assert!(z[1].abs() < 1e-12);
/// assert!((z[2] + 1.2247).abs() < 1e-3);
/// ```
#[must_use]
pub fn zscore(values: &[f64], limit: f64) -> (Vec<f64>, UniverseStats) {
    let stats = universe_stats(values);

    if stats.count < 2 || !(stats.std > MIN_STD_THRESHOLD) {
        return (vec![0.0; values.len()], stats);
    }

    let scores = values
        .iter()
        .map(|x| {
            if x.is_finite() {
                ((x - stats.mean) / stats.std).clamp(-limit, limit)
            } else {
                0.0
            }
        })
        .collect();

    (scores, stats)
}

/// Standardize an ndarray cross-section; see [`zscore`].
#[must_use]
pub fn zscore_array(values: &Array1<f64>, limit: f64) -> (Array1<f64>, UniverseStats) {
    let (scores, stats) = zscore(values.as_slice().unwrap_or(&[]), limit);
    (Array1::from_vec(scores), stats)
}

/// Population standard deviation of a slice; NaN on an empty input.
#[must_use]
pub fn population_std(values: &[f64]) -> f64 {
    universe_stats(values).std
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zscore_basic() {
        let (z, stats) = zscore(&[1.0, 2.0, 3.0, 4.0, 5.0], 3.0);

        assert_relative_eq!(stats.mean, 3.0);
        assert_eq!(stats.count, 5);

        let z_mean = z.iter().sum::<f64>() / z.len() as f64;
        assert!(z_mean.abs() < 1e-12);

        let z_var = z.iter().map(|x| x.powi(2)).sum::<f64>() / z.len() as f64;
        assert_relative_eq!(z_var.sqrt(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zscore_empty() {
        let (z, stats) = zscore(&[], 3.0);
        assert!(z.is_empty());
        assert_eq!(stats.count, 0);
        assert!(stats.mean.is_nan());
    }

    #[test]
    fn test_zscore_single_value() {
        let (z, stats) = zscore(&[42.0], 3.0);
        assert_eq!(z, vec![0.0]);
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn test_zscore_constant_values() {
        let (z, _) = zscore(&[5.0, 5.0, 5.0, 5.0], 3.0);
        assert!(z.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_nan_maps_to_neutral() {
        let (z, stats) = zscore(&[1.0, f64::NAN, 3.0, 5.0], 3.0);

        // Moments come from finite values only
        assert_eq!(stats.count, 3);
        assert_relative_eq!(stats.mean, 3.0);
        // The NaN input receives the neutral score, not NaN
        assert_eq!(z[1], 0.0);
        assert!(z[0] < 0.0);
        assert!(z[3] > 0.0);
    }

    #[test]
    fn test_all_nan_neutral() {
        let (z, stats) = zscore(&[f64::NAN, f64::NAN], 3.0);
        assert_eq!(z, vec![0.0, 0.0]);
        assert_eq!(stats.count, 0);
    }

    #[test]
    fn test_winsorization_clamps_outliers() {
        // One extreme outlier against a tight cluster
        let mut values = vec![0.0; 20];
        values.push(1000.0);
        let (z, _) = zscore(&values, 3.0);

        assert!(z.iter().all(|&x| x.abs() <= 3.0));
        assert_relative_eq!(z[20], 3.0);
    }

    #[test]
    fn test_population_convention() {
        // Matches the documented 3-ticker example: z ≈ ±1.2247
        let (z, _) = zscore(&[0.05, 0.03, 0.01], 3.0);
        assert_relative_eq!(z[0], 1.224744871391589, epsilon = 1e-9);
        assert_relative_eq!(z[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(z[2], -1.224744871391589, epsilon = 1e-9);
    }

    #[test]
    fn test_zscore_array() {
        let arr = Array1::from_vec(vec![1.0, 2.0, 3.0]);
        let (z, stats) = zscore_array(&arr, 3.0);
        assert_eq!(z.len(), 3);
        assert_eq!(stats.count, 3);
        assert!(z[0] < 0.0 && z[2] > 0.0);
    }

    #[test]
    fn test_low_variance_threshold() {
        let values = vec![1.0, 1.0 + 1e-12, 1.0 - 1e-12];
        let (z, _) = zscore(&values, 3.0);
        assert!(z.iter().all(|&x| x == 0.0));
    }
}
