//! The Dehnen (1993) profile family: rho(r) ~ 1 / (r^gamma (r+a)^(4-gamma)).
//!
//! Used for IC-derived reference curves on profile figures and as the
//! analytic truth in the solver tests.

/// A Dehnen density profile of total mass `m`, scale radius `a` and inner
/// slope `gamma` in [0, 3).
#[derive(Debug, Clone, Copy)]
pub struct DehnenProfile {
    /// Total mass, Msol.
    pub m: f64,
    /// Scale radius, kpc.
    pub a: f64,
    pub gamma: f64,
}

impl DehnenProfile {
    pub fn new(m: f64, a: f64, gamma: f64) -> Self {
        debug_assert!(gamma >= 0.0 && gamma < 3.0);
        DehnenProfile { m, a, gamma }
    }

    /// Density at radius `r` (Msol / kpc^3).
    pub fn density(&self, r: f64) -> f64 {
        let g = self.gamma;
        (3.0 - g) * self.m / (4.0 * std::f64::consts::PI)
            * self.a
            / (r.powf(g) * (r + self.a).powf(4.0 - g))
    }

    /// Enclosed mass inside radius `r` (Msol): M (r / (r + a))^(3 - gamma).
    pub fn enclosed_mass(&self, r: f64) -> f64 {
        self.m * (r / (r + self.a)).powf(3.0 - self.gamma)
    }

    /// Radius containing half the total mass.
    pub fn half_mass_radius(&self) -> f64 {
        // From M(r) = M/2: r = a / (2^(1/(3-gamma)) - 1).
        self.a / (2f64.powf(1.0 / (3.0 - self.gamma)) - 1.0)
    }
}

/// Hydrostatic-mass estimator from gas density and temperature profiles:
/// M(<r) = -(k_B T r / (mu m_p G)) (dln rho / dln r + dln T / dln r),
/// with the logarithmic derivatives smoothed by a moving-average pass of
/// the given bandwidth (in bins).
pub fn hydrostatic_mass(
    r_kpc: &[f64],
    rho: &[f64],
    temp_k: &[f64],
    mu: f64,
    bandwidth: usize,
) -> Vec<f64> {
    use sph_kit::constants::{G, K_B, KPC, M_P, M_SOL};

    let n = r_kpc.len();
    if n < 3 {
        return vec![0.0; n];
    }
    let ln_r: Vec<f64> = r_kpc.iter().map(|&r| r.ln()).collect();
    let dln = |f: &[f64], i: usize| -> f64 {
        let (i0, i1) = if i == 0 {
            (0, 1)
        } else if i == n - 1 {
            (n - 2, n - 1)
        } else {
            (i - 1, i + 1)
        };
        if f[i0] <= 0.0 || f[i1] <= 0.0 {
            return 0.0;
        }
        (f[i1].ln() - f[i0].ln()) / (ln_r[i1] - ln_r[i0])
    };

    let mut slope: Vec<f64> = (0..n).map(|i| dln(rho, i) + dln(temp_k, i)).collect();
    slope = moving_average(&slope, bandwidth);

    (0..n)
        .map(|i| {
            let r_cm = r_kpc[i] * KPC;
            let m_g = -(K_B * temp_k[i] * r_cm / (mu * M_P * G)) * slope[i];
            m_g / M_SOL
        })
        .collect()
}

/// Centered moving average with edge clamping.
fn moving_average(values: &[f64], bandwidth: usize) -> Vec<f64> {
    if bandwidth <= 1 {
        return values.to_vec();
    }
    let n = values.len() as i64;
    let half = (bandwidth / 2) as i64;
    (0..n)
        .map(|i| {
            let lo = (i - half).max(0);
            let hi = (i + half).min(n - 1);
            let mut acc = 0.0;
            for j in lo..=hi {
                acc += values[j as usize];
            }
            acc / (hi - lo + 1) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_profile_matches_closed_form() {
        let p = DehnenProfile::new(1.0e14, 500.0, 1.0);
        // gamma = 1 is the Hernquist case: M(r) = M r^2 / (r + a)^2.
        for r in [10.0, 100.0, 500.0, 5000.0] {
            let expect = 1.0e14 * (r / (r + 500.0)).powi(2);
            let got = p.enclosed_mass(r);
            assert!((got - expect).abs() / expect < 1e-12, "M({r}) = {got:e}");
        }
    }

    #[test]
    fn density_integrates_back_to_the_mass_profile() {
        let p = DehnenProfile::new(2.0e14, 800.0, 1.5);
        // Fine log-spaced integration of 4 pi r^2 rho from the center.
        let n = 40_000;
        let r_lo: f64 = 1.0e-3;
        let r_hi: f64 = 8.0e4;
        let step = (r_hi / r_lo).powf(1.0 / n as f64);
        let mut acc = 0.0;
        let mut r = r_lo;
        let mut checked = 0;
        for _ in 0..n {
            let r_next = r * step;
            let mid = 0.5 * (r + r_next);
            acc += 4.0 * std::f64::consts::PI * mid * mid * p.density(mid) * (r_next - r);
            r = r_next;
            for probe in [100.0, 800.0, 10_000.0] {
                if r >= probe && r / step < probe {
                    let expect = p.enclosed_mass(probe);
                    assert!(
                        (acc - expect).abs() / expect < 0.01,
                        "M({probe}) integrated {acc:e}, closed form {expect:e}"
                    );
                    checked += 1;
                }
            }
        }
        assert_eq!(checked, 3);
    }

    #[test]
    fn half_mass_radius_bisects_the_mass() {
        let p = DehnenProfile::new(5.0e13, 300.0, 0.5);
        let rh = p.half_mass_radius();
        assert!((p.enclosed_mass(rh) / p.m - 0.5).abs() < 1e-10);
    }

    #[test]
    fn hydrostatic_mass_recovers_isothermal_sphere() {
        // Singular isothermal sphere: rho ~ r^-2, T constant, so
        // M(r) = 2 k_B T r / (mu m_p G).
        use sph_kit::constants::{G, K_B, KPC, M_P, M_SOL};
        let mu = 0.6;
        let t = 5.0e7;
        let r: Vec<f64> = (1..=60).map(|i| 10.0 * i as f64).collect();
        let rho: Vec<f64> = r.iter().map(|&ri| 1.0e-25 / (ri * ri)).collect();
        let temp = vec![t; r.len()];
        let m = hydrostatic_mass(&r, &rho, &temp, mu, 3);
        for (i, &ri) in r.iter().enumerate().skip(2).take(50) {
            let expect = 2.0 * K_B * t * (ri * KPC) / (mu * M_P * G) / M_SOL;
            assert!(
                (m[i] - expect).abs() / expect < 0.05,
                "M({ri}) = {:e}, expected {expect:e}",
                m[i]
            );
        }
    }
}
