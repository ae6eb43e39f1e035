//! Radial binning primitives for the profile engine.

use crate::error::SphError;
use std::str::FromStr;

/// Bin-spacing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinSpacing {
    /// Equal-width bins.
    Lin,
    /// Equal-width bins in log10 radius.
    Log,
    /// Bins holding approximately equal particle counts.
    EqualN,
}

impl FromStr for BinSpacing {
    type Err = SphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lin" => Ok(BinSpacing::Lin),
            "log" => Ok(BinSpacing::Log),
            "equaln" => Ok(BinSpacing::EqualN),
            other => Err(SphError::Precondition(format!(
                "unknown bin spacing '{other}' (expected lin, log or equaln)"
            ))),
        }
    }
}

/// Computes `nbins + 1` bin edges over `radii` with the given policy.
///
/// `rmin`/`rmax` default to the data range; for log spacing a zero or
/// negative lower bound is raised to the smallest strictly-positive radius.
pub fn bin_edges(
    radii: &[f64],
    nbins: usize,
    spacing: BinSpacing,
    rmin: Option<f64>,
    rmax: Option<f64>,
) -> Result<Vec<f64>, SphError> {
    if nbins == 0 {
        return Err(SphError::Precondition("nbins must be positive".into()));
    }
    if radii.is_empty() {
        return Err(SphError::Precondition(
            "cannot bin an empty set of radii".into(),
        ));
    }
    let data_min = radii.iter().cloned().fold(f64::INFINITY, f64::min);
    let data_max = radii.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let lo = rmin.unwrap_or(data_min);
    let hi = rmax.unwrap_or(data_max);
    if hi <= lo {
        return Err(SphError::Precondition(format!(
            "empty radial range [{lo}, {hi}]"
        )));
    }

    let edges = match spacing {
        BinSpacing::Lin => {
            let dr = (hi - lo) / nbins as f64;
            (0..=nbins).map(|i| lo + i as f64 * dr).collect()
        }
        BinSpacing::Log => {
            let lo = if lo > 0.0 {
                lo
            } else {
                // Clamp to the smallest strictly-positive radius.
                radii
                    .iter()
                    .cloned()
                    .filter(|&r| r > 0.0)
                    .fold(f64::INFINITY, f64::min)
            };
            if !lo.is_finite() || hi <= lo {
                return Err(SphError::Precondition(
                    "log binning needs at least one positive radius".into(),
                ));
            }
            let llo = lo.log10();
            let lhi = hi.log10();
            let dl = (lhi - llo) / nbins as f64;
            (0..=nbins)
                .map(|i| 10f64.powf(llo + i as f64 * dl))
                .collect()
        }
        BinSpacing::EqualN => {
            let mut inside: Vec<f64> = radii
                .iter()
                .cloned()
                .filter(|&r| r >= lo && r <= hi)
                .collect();
            if inside.len() < nbins {
                return Err(SphError::Precondition(format!(
                    "equaln binning needs at least {nbins} particles in range, found {}",
                    inside.len()
                )));
            }
            inside.sort_by(f64::total_cmp);
            let mut edges = Vec::with_capacity(nbins + 1);
            edges.push(lo);
            for i in 1..nbins {
                let idx = i * inside.len() / nbins;
                edges.push(inside[idx]);
            }
            edges.push(hi);
            edges
        }
    };
    Ok(edges)
}

/// Centers of the bins described by `edges`: arithmetic midpoints for
/// linear spacing, geometric means for log spacing.
pub fn bin_centers(edges: &[f64], spacing: BinSpacing) -> Vec<f64> {
    edges
        .windows(2)
        .map(|w| match spacing {
            BinSpacing::Log => (w[0] * w[1]).sqrt(),
            _ => 0.5 * (w[0] + w[1]),
        })
        .collect()
}

/// A binned radial curve.
#[derive(Debug, Clone)]
pub struct BinnedProfile {
    pub centers: Vec<f64>,
    pub values: Vec<f64>,
    pub counts: Vec<usize>,
}

/// Finds the bin index for `r`, or None outside the edge range.
#[inline]
fn bin_index(edges: &[f64], r: f64) -> Option<usize> {
    if r < edges[0] || r > edges[edges.len() - 1] {
        return None;
    }
    // Binary search on the edge array; the last edge is inclusive.
    match edges.binary_search_by(|e| e.total_cmp(&r)) {
        Ok(i) => Some(i.min(edges.len() - 2)),
        Err(i) => Some(i - 1),
    }
}

/// Mass-weighted mean of `values` per radial bin.
pub fn weighted_profile(
    radii: &[f64],
    mass: &[f64],
    values: &[f64],
    edges: &[f64],
    spacing: BinSpacing,
) -> BinnedProfile {
    let nbins = edges.len() - 1;
    let mut acc = vec![0.0f64; nbins];
    let mut wsum = vec![0.0f64; nbins];
    let mut counts = vec![0usize; nbins];
    for ((&r, &m), &v) in radii.iter().zip(mass.iter()).zip(values.iter()) {
        if let Some(i) = bin_index(edges, r) {
            acc[i] += m * v;
            wsum[i] += m;
            counts[i] += 1;
        }
    }
    let values = acc
        .iter()
        .zip(wsum.iter())
        .map(|(&a, &w)| if w > 0.0 { a / w } else { 0.0 })
        .collect();
    BinnedProfile {
        centers: bin_centers(edges, spacing),
        values,
        counts,
    }
}

/// Mass per shell measure: the density profile. `ndim = 3` divides by the
/// spherical shell volume, `ndim = 2` by the annulus area.
pub fn density_profile(
    radii: &[f64],
    mass: &[f64],
    edges: &[f64],
    spacing: BinSpacing,
    ndim: usize,
) -> Result<BinnedProfile, SphError> {
    if ndim != 2 && ndim != 3 {
        return Err(SphError::Precondition(format!(
            "profile ndim must be 2 or 3, got {ndim}"
        )));
    }
    let nbins = edges.len() - 1;
    let mut msum = vec![0.0f64; nbins];
    let mut counts = vec![0usize; nbins];
    for (&r, &m) in radii.iter().zip(mass.iter()) {
        if let Some(i) = bin_index(edges, r) {
            msum[i] += m;
            counts[i] += 1;
        }
    }
    let values = edges
        .windows(2)
        .zip(msum.iter())
        .map(|(w, &m)| {
            let measure = if ndim == 3 {
                4.0 / 3.0 * std::f64::consts::PI * (w[1].powi(3) - w[0].powi(3))
            } else {
                std::f64::consts::PI * (w[1] * w[1] - w[0] * w[0])
            };
            if measure > 0.0 {
                m / measure
            } else {
                0.0
            }
        })
        .collect();
    Ok(BinnedProfile {
        centers: bin_centers(edges, spacing),
        values,
        counts,
    })
}

/// Cumulative mass inside each bin's outer edge.
pub fn enclosed_mass(radii: &[f64], mass: &[f64], edges: &[f64]) -> Vec<f64> {
    let nbins = edges.len() - 1;
    let mut per_bin = vec![0.0f64; nbins];
    let mut below = 0.0f64;
    for (&r, &m) in radii.iter().zip(mass.iter()) {
        if r < edges[0] {
            below += m;
        } else if let Some(i) = bin_index(edges, r) {
            per_bin[i] += m;
        }
    }
    let mut out = Vec::with_capacity(nbins);
    let mut running = below;
    for m in per_bin {
        running += m;
        out.push(running);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lin_edges_are_uniform() {
        let radii = [0.0, 10.0];
        let edges = bin_edges(&radii, 5, BinSpacing::Lin, None, None).unwrap();
        assert_eq!(edges.len(), 6);
        for w in edges.windows(2) {
            assert!((w[1] - w[0] - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn log_edges_clamp_nonpositive_lower_bound() {
        let radii = [0.0, 0.5, 1.0, 10.0];
        let edges = bin_edges(&radii, 4, BinSpacing::Log, None, None).unwrap();
        assert!((edges[0] - 0.5).abs() < 1e-12);
        assert!((edges[4] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn equaln_bins_hold_equal_counts() {
        let radii: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let mass = vec![1.0; 100];
        let edges = bin_edges(&radii, 4, BinSpacing::EqualN, None, None).unwrap();
        let prof = weighted_profile(&radii, &mass, &mass, &edges, BinSpacing::EqualN);
        for &c in &prof.counts {
            assert!((c as i64 - 25).abs() <= 1, "bin count {c}");
        }
    }

    #[test]
    fn density_profile_recovers_uniform_density() {
        // Uniform sphere sampled on a fine shell lattice.
        let mut radii = Vec::new();
        let mut mass = Vec::new();
        let rho = 3.0;
        let n = 2000;
        let rmax = 1.0;
        for i in 0..n {
            let r0 = rmax * i as f64 / n as f64;
            let r1 = rmax * (i + 1) as f64 / n as f64;
            let shell = 4.0 / 3.0 * std::f64::consts::PI * (r1.powi(3) - r0.powi(3));
            radii.push(0.5 * (r0 + r1));
            mass.push(rho * shell);
        }
        let edges = bin_edges(&radii, 8, BinSpacing::Lin, Some(0.0), Some(rmax)).unwrap();
        let prof = density_profile(&radii, &mass, &edges, BinSpacing::Lin, 3).unwrap();
        for &v in &prof.values {
            assert!((v - rho).abs() / rho < 0.02, "rho bin = {v}");
        }
    }

    #[test]
    fn enclosed_mass_is_monotonic() {
        let radii = [0.1, 0.4, 0.9, 1.5, 3.0];
        let mass = [1.0, 2.0, 3.0, 4.0, 5.0];
        let edges = bin_edges(&radii, 3, BinSpacing::Lin, Some(0.0), Some(3.0)).unwrap();
        let m = enclosed_mass(&radii, &mass, &edges);
        assert_eq!(m.len(), 3);
        assert!(m.windows(2).all(|w| w[1] >= w[0]));
        assert!((m[2] - 15.0).abs() < 1e-12);
    }
}
