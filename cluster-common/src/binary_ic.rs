//! Reader for the `%INFO%` parameter file of a two-cluster collision IC,
//! and the derived collision geometry.
//!
//! The file is INI-shaped: a `[General]` section with the orbit, then one
//! section per cluster (`[1]`, `[2]`) whose dotted keys mirror the IC
//! builder's groups (`dark_matter.M_dm`, `gas.M_gas`,
//! `global.truncation_radius`, `tags.--no-dm`, `tags.--no-gas`). Masses
//! are stored in units of 1e10 Msol and scaled up on load.

use crate::error::ClusterError;
use std::collections::HashMap;
use std::path::Path;

/// Parameters of one cluster in a binary IC. Masses in Msol, radii kpc.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    pub m_dm: f64,
    pub m_gas: f64,
    pub truncation_radius: f64,
    pub no_dm: bool,
    pub no_gas: bool,
}

impl ClusterParams {
    /// Total mass contributing to the orbit, honoring the disable tags.
    pub fn active_mass(&self) -> f64 {
        let mut m = 0.0;
        if !self.no_dm {
            m += self.m_dm;
        }
        if !self.no_gas {
            m += self.m_gas;
        }
        m
    }
}

/// The collision setup declared by a `%INFO%` file.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryInfo {
    /// Perpendicular offset of the two orbits (kpc).
    pub impact_parameter: f64,
    /// Initial separation along the collision axis (kpc).
    pub initial_distance: f64,
    pub clusters: [ClusterParams; 2],
}

/// One cluster's placement: distance from the centre of mass and the
/// initial position (kpc).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub r: f64,
    pub position: [f64; 3],
}

fn parse_bool(s: &str) -> Result<bool, ClusterError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(ClusterError::ConfigFailure(format!(
            "expected a boolean, found '{other}'"
        ))),
    }
}

/// Splits INI text into section -> key -> value maps. Comments start with
/// `;` or `#`.
fn parse_sections(text: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current = String::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            current = line[1..line.len() - 1].trim().to_string();
            sections.entry(current.clone()).or_default();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    sections
}

impl BinaryInfo {
    /// Parses the text of a `%INFO%` parameter file.
    pub fn parse(text: &str) -> Result<Self, ClusterError> {
        let sections = parse_sections(text);
        let general = sections.get("General").ok_or_else(|| {
            ClusterError::ConfigFailure("info file lacks a [General] section".into())
        })?;
        let get_general = |key: &str| -> Result<f64, ClusterError> {
            general
                .get(key)
                .ok_or_else(|| {
                    ClusterError::ConfigFailure(format!("info file lacks 'General.{key}'"))
                })?
                .parse::<f64>()
                .map_err(|_| {
                    ClusterError::ConfigFailure(format!("'General.{key}' is not numeric"))
                })
        };
        let impact_parameter = get_general("Impact Parameter")?;
        let initial_distance = get_general("Initial Distance")?;
        if initial_distance <= 0.0 {
            return Err(ClusterError::ConfigFailure(
                "'General.Initial Distance' must be positive".into(),
            ));
        }

        let mut clusters = Vec::with_capacity(2);
        for idx in 1..=2 {
            let section = sections.get(&idx.to_string()).ok_or_else(|| {
                ClusterError::ConfigFailure(format!("info file lacks a [{idx}] section"))
            })?;
            let get = |key: &str| -> Result<&String, ClusterError> {
                section.get(key).ok_or_else(|| {
                    ClusterError::ConfigFailure(format!("info file lacks '{idx}.{key}'"))
                })
            };
            let get_f = |key: &str| -> Result<f64, ClusterError> {
                get(key)?.parse::<f64>().map_err(|_| {
                    ClusterError::ConfigFailure(format!("'{idx}.{key}' is not numeric"))
                })
            };
            clusters.push(ClusterParams {
                // Stored in units of 1e10 Msol.
                m_dm: get_f("dark_matter.M_dm")? * 1.0e10,
                m_gas: get_f("gas.M_gas")? * 1.0e10,
                truncation_radius: get_f("global.truncation_radius")?,
                no_dm: parse_bool(get("tags.--no-dm")?)?,
                no_gas: parse_bool(get("tags.--no-gas")?)?,
            });
        }
        let clusters: [ClusterParams; 2] = clusters.try_into().unwrap();
        Ok(BinaryInfo {
            impact_parameter,
            initial_distance,
            clusters,
        })
    }

    /// Reads and parses a `%INFO%` file from disk.
    pub fn read(path: &Path) -> Result<Self, ClusterError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ClusterError::ConfigFailure(format!("cannot read info file {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Separation along the collision axis corrected for the perpendicular
    /// impact offset.
    pub fn effective_distance(&self) -> f64 {
        let d = self.initial_distance;
        let b = self.impact_parameter;
        d + b * b / d
    }

    /// Places the two clusters around their common centre of mass:
    /// r_i is mass-weighted with the other cluster's active mass, cluster 1
    /// sits on the negative collision axis, and the impact offset is split
    /// evenly between the two.
    pub fn collision_geometry(&self) -> Result<[Placement; 2], ClusterError> {
        let m1 = self.clusters[0].active_mass();
        let m2 = self.clusters[1].active_mass();
        let mtot = m1 + m2;
        if mtot <= 0.0 {
            return Err(ClusterError::ConfigFailure(
                "both clusters are fully disabled; no orbit to place".into(),
            ));
        }
        let d_eff = self.effective_distance();
        let r1 = d_eff * m2 / mtot;
        let r2 = d_eff * m1 / mtot;
        let b_half = self.impact_parameter / 2.0;
        Ok([
            Placement {
                r: r1,
                position: [-r1, b_half, 0.0],
            },
            Placement {
                r: r2,
                position: [r2, -b_half, 0.0],
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_SAMPLE: &str = "\
[General]
Impact Parameter = 100.0
Initial Distance = 3000.0

[1]
dark_matter.M_dm = 10000.0
gas.M_gas = 1000.0
global.truncation_radius = 2000.0
tags.--no-dm = false
tags.--no-gas = false

[2]
dark_matter.M_dm = 10000.0
gas.M_gas = 1000.0
global.truncation_radius = 2000.0
tags.--no-dm = false
tags.--no-gas = false
";

    #[test]
    fn masses_are_scaled_on_load() {
        let info = BinaryInfo::parse(INFO_SAMPLE).unwrap();
        assert!((info.clusters[0].m_dm - 1.0e14).abs() / 1.0e14 < 1e-12);
        assert!((info.clusters[0].m_gas - 1.0e13).abs() / 1.0e13 < 1e-12);
        assert!((info.clusters[1].truncation_radius - 2000.0).abs() < 1e-12);
    }

    #[test]
    fn equal_mass_collision_geometry() {
        // Impact parameter 100 kpc over a 3000 kpc approach: the effective
        // separation is 3000 + 100^2/3000 and the equal masses split it in
        // half, 1501.67 kpc on each side of the centre of mass.
        let info = BinaryInfo::parse(INFO_SAMPLE).unwrap();
        let [p1, p2] = info.collision_geometry().unwrap();
        assert!((p1.r - 1501.67).abs() < 0.01, "r1 = {}", p1.r);
        assert!((p2.r - 1501.67).abs() < 0.01, "r2 = {}", p2.r);
        assert!(p1.position[0] < 0.0 && p2.position[0] > 0.0);
        assert!((p1.position[1] - 50.0).abs() < 1e-12);
        assert!((p2.position[1] + 50.0).abs() < 1e-12);
    }

    #[test]
    fn disabled_family_drops_out_of_the_mass_ratio() {
        let text = INFO_SAMPLE.replacen("tags.--no-gas = false", "tags.--no-gas = true", 1);
        let info = BinaryInfo::parse(&text).unwrap();
        // Cluster 1 now weighs 1e14, cluster 2 still 1.1e14: the lighter
        // cluster sits farther from the centre of mass.
        let [p1, p2] = info.collision_geometry().unwrap();
        assert!(p1.r > p2.r);
        let d_eff = info.effective_distance();
        assert!((p1.r + p2.r - d_eff).abs() / d_eff < 1e-12);
    }

    #[test]
    fn missing_section_is_config_failure() {
        let text = "[General]\nImpact Parameter = 1.0\nInitial Distance = 10.0\n";
        assert!(matches!(
            BinaryInfo::parse(text),
            Err(ClusterError::ConfigFailure(_))
        ));
    }
}
