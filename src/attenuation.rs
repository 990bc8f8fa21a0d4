//! Scaled-distance attenuation law
//!
//! Ground vibration from blasting decays with square-root scaled distance:
//!
//! ```text
//! V  = K * SD^(-alpha)
//! SD = D / sqrt(Q)
//! ```
//!
//! Where:
//! - V = peak particle velocity (mm/s)
//! - D = distance from blast to measurement point (m)
//! - Q = maximum charge per delay (kg)
//! - K, alpha = site constants fitted per lithology
//!
//! Taking log10 of both sides gives a straight line,
//! `log10(V) = log10(K) - alpha * log10(SD)`, which is what the fitter regresses.

/// Square-root scaled distance `D / sqrt(Q)` (m/kg^0.5).
///
/// Returns NaN for non-positive charge so callers can reject the result.
pub fn scaled_distance(distance: f64, charge: f64) -> f64 {
    if charge <= 0.0 {
        return f64::NAN;
    }
    distance / charge.sqrt()
}

/// Forward attenuation law: `K / SD^alpha`.
pub fn peak_particle_velocity(k: f64, alpha: f64, scaled_distance: f64) -> f64 {
    k / scaled_distance.powf(alpha)
}

/// Log-linear regression coordinates `(log10 SD, log10 V)`.
///
/// None when vibration is not strictly positive, since log10 is undefined.
pub fn log_coordinates(distance: f64, charge: f64, vibration: f64) -> Option<(f64, f64)> {
    if vibration <= 0.0 || !vibration.is_finite() {
        return None;
    }
    let sd = scaled_distance(distance, charge);
    if !sd.is_finite() || sd <= 0.0 {
        return None;
    }
    Some((sd.log10(), vibration.log10()))
}

/// Recover (K, alpha) from the regression line `Y = slope * X + intercept`.
pub fn coefficients_from_line(slope: f64, intercept: f64) -> (f64, f64) {
    (10f64.powf(intercept), -slope)
}
