//! Ordinary least squares on paired samples
//!
//! Closed-form slope and intercept, with goodness of fit and a slope
//! significance test via the statrs Student's t-distribution.

use statrs::distribution::{ContinuousCDF, StudentsT};

/// Result of fitting `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination (1.0 for a perfect line)
    pub r_squared: f64,
    /// Two-tailed p-value for slope != 0; None with fewer than 3 points
    pub p_value: Option<f64>,
    pub sample_count: usize,
}

/// Fit a least-squares line through `(x[i], y[i])`.
///
/// Returns None when fewer than 2 pairs are given, lengths differ, or all
/// x values coincide (vertical line, slope undefined).
///
/// Formula:
/// slope = Σ(xi - x̄)(yi - ȳ) / Σ(xi - x̄)²
/// intercept = ȳ - slope × x̄
pub fn least_squares(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len();
    if n < 2 || n != y.len() {
        return None;
    }

    let n_f = n as f64;
    let mean_x = x.iter().sum::<f64>() / n_f;
    let mean_y = y.iter().sum::<f64>() / n_f;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    // Spread below rounding noise of the x magnitudes means a vertical line
    let sum_sq_x: f64 = x.iter().map(|v| v * v).sum();
    if sxx <= f64::EPSILON * sum_sq_x {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let r_squared = if syy == 0.0 {
        // Flat y: the horizontal line explains everything there is
        1.0
    } else {
        (sxy * sxy) / (sxx * syy)
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
        p_value: slope_p_value(r_squared, n),
        sample_count: n,
    })
}

/// Two-tailed p-value for the slope using t = r√(n-2) / √(1-r²).
fn slope_p_value(r_squared: f64, n: usize) -> Option<f64> {
    if n < 3 {
        return None;
    }

    // Perfect or near-perfect fit is highly significant
    if r_squared >= 0.9999 {
        return Some(0.0);
    }

    let df = (n - 2) as f64;
    let t_stat = (r_squared * df / (1.0 - r_squared)).sqrt();

    match StudentsT::new(0.0, 1.0, df) {
        Ok(t_dist) => Some(2.0 * (1.0 - t_dist.cdf(t_stat))),
        Err(_) => None,
    }
}
