//! Canonical derivations attached to the gas family.
//!
//! Every recipe is a pure function of the snapshot's gas fields and the
//! physical constants; the registry attaches the result under the
//! canonical tag. Inputs come in the canonical storage units (`rho` in
//! g/cm^3, `temp` in K, velocities in km/s).

use cluster_common::{config, ClusterError};
use sph_kit::constants;
use sph_kit::snapshot::{Family, Snapshot};

/// Frequency-integrated free-free emission constant (cgs), multiplying
/// g_B n_e n_i sqrt(T).
const FREE_FREE_C: f64 = 1.42e-27;

fn gas_field<'a>(snap: &'a Snapshot, name: &str) -> Result<&'a [f64], ClusterError> {
    snap.gas
        .require_field(name)
        .map_err(|e| ClusterError::Snapshot(format!("gas {e}")))
}

/// Electron number density per particle (cm^-3): n_e = rho / (f_e m_p)
/// with the electron factor from configuration.
fn electron_density(rho: &[f64]) -> Vec<f64> {
    let factor = config().numerics.electron_factor * constants::M_P;
    rho.iter().map(|&r| r / factor).collect()
}

/// S = k_B T n_e^(-2/3), in keV cm^2.
pub fn entropy(snap: &Snapshot) -> Result<Vec<f64>, ClusterError> {
    let temp = gas_field(snap, "temp")?;
    let rho = gas_field(snap, "rho")?;
    let n_e = electron_density(rho);
    Ok(temp
        .iter()
        .zip(n_e.iter())
        .map(|(&t, &ne)| constants::K_B_KEV * t * ne.powf(-2.0 / 3.0))
        .collect())
}

/// c_s = sqrt(gamma k_B T / (mu m_p)), in km/s.
pub fn sound_speed(snap: &Snapshot) -> Result<Vec<f64>, ClusterError> {
    let temp = gas_field(snap, "temp")?;
    let mu = config().numerics.mu;
    Ok(temp
        .iter()
        .map(|&t| {
            (constants::GAMMA * constants::K_B * t / (mu * constants::M_P)).sqrt() / constants::KM
        })
        .collect())
}

/// M = |v - <v>| / c_s, dimensionless. The bulk flow is the mass-weighted
/// mean gas velocity.
pub fn mach(snap: &Snapshot) -> Result<Vec<f64>, ClusterError> {
    let cs = sound_speed(snap)?;
    let mean = snap.mean_velocity(Family::Gas);
    Ok(snap
        .gas
        .vel
        .iter()
        .zip(cs.iter())
        .map(|(v, &c)| {
            let dv = [v[0] - mean[0], v[1] - mean[1], v[2] - mean[2]];
            let speed = (dv[0] * dv[0] + dv[1] * dv[1] + dv[2] * dv[2]).sqrt();
            if c > 0.0 {
                speed / c
            } else {
                0.0
            }
        })
        .collect())
}

/// Thermal bremsstrahlung emissivity, erg cm^-3 s^-1:
/// eps = C g_B n_e n_i sqrt(T). Ions are taken at the electron density;
/// the composition dependence is folded into the configured factors.
pub fn xray(snap: &Snapshot) -> Result<Vec<f64>, ClusterError> {
    let temp = gas_field(snap, "temp")?;
    let rho = gas_field(snap, "rho")?;
    let n_e = electron_density(rho);
    let gaunt = config().numerics.gaunt_factor;
    Ok(temp
        .iter()
        .zip(n_e.iter())
        .map(|(&t, &ne)| FREE_FREE_C * gaunt * ne * ne * t.sqrt())
        .collect())
}
