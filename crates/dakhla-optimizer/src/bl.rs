//! The Black-Litterman prior and posterior.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use dakhla_traits::{DakhlaError, Result};

use crate::views::{omega, picking_matrix, ViewSpec};

/// Equilibrium excess returns from reverse optimization:
/// `π = δ · Σ · w_mkt`.
#[must_use]
pub fn equilibrium_returns(
    sigma: &DMatrix<f64>,
    market_weights: &DVector<f64>,
    risk_aversion: f64,
) -> DVector<f64> {
    sigma * market_weights * risk_aversion
}

/// The standard Black-Litterman posterior:
///
/// `μ_bl = [(τΣ)⁻¹ + PᵀΩ⁻¹P]⁻¹ · [(τΣ)⁻¹π + PᵀΩ⁻¹Q]`
///
/// With no views the posterior equals the prior.
///
/// # Errors
///
/// Returns [`DakhlaError::SingularCovariance`] when `τΣ` or the combined
/// precision matrix cannot be inverted.
pub fn posterior_returns(
    sigma: &DMatrix<f64>,
    tau: f64,
    prior: &DVector<f64>,
    views: &[ViewSpec],
) -> Result<DVector<f64>> {
    if views.is_empty() {
        return Ok(prior.clone());
    }

    let n = sigma.nrows();
    let tau_sigma = sigma * tau;
    let tau_sigma_inv = tau_sigma
        .try_inverse()
        .ok_or(DakhlaError::SingularCovariance)?;

    let p = picking_matrix(views, n);
    let q = DVector::from_iterator(views.len(), views.iter().map(|v| v.implied_excess_return));
    let omega = omega(views, sigma, tau);
    let omega_inv = omega
        .try_inverse()
        .ok_or(DakhlaError::SingularCovariance)?;

    let pt_omega_inv = p.transpose() * omega_inv;
    let precision = &tau_sigma_inv + &pt_omega_inv * &p;
    let precision_inv = precision
        .try_inverse()
        .ok_or(DakhlaError::SingularCovariance)?;

    let posterior = precision_inv * (&tau_sigma_inv * prior + pt_omega_inv * q);
    debug!(views = views.len(), assets = n, "posterior returns computed");
    Ok(posterior)
}
