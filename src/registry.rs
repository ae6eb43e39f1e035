//! The quantity registry: a closed enumeration of plottable quantities,
//! each with its unit, display label, eligible families, plot aesthetics
//! and, for derived quantities, a deterministic recipe.
//!
//! `ensure` is idempotent: a derivation runs once per snapshot and attaches
//! its result under the canonical tag; a second call finds the field
//! resident and returns immediately.

use crate::colormap::Colormap;
use crate::derive;
use cluster_common::ClusterError;
use sph_kit::snapshot::{Family, Snapshot};
use sph_kit::units::{convert_slice, Dimension, Unit};
use sph_kit::constants;
use std::str::FromStr;

/// Every quantity the image and profile engines can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Rho,
    Temp,
    Mass,
    Vel,
    Hsml,
    Entropy,
    Mach,
    Xray,
    SoundSpeed,
}

/// Static descriptor of one quantity.
#[derive(Debug, Clone, Copy)]
pub struct QuantityInfo {
    pub tag: &'static str,
    pub label: &'static str,
    /// Unit the field is stored in on the snapshot.
    pub storage_unit: Unit,
    /// Default display unit.
    pub default_unit: Unit,
    pub families: &'static [Family],
    pub colormap: Colormap,
    pub log_default: bool,
}

const GAS_ONLY: &[Family] = &[Family::Gas];
const ALL_FAMILIES: &[Family] = &[Family::Gas, Family::DarkMatter, Family::Stars];

impl Quantity {
    pub const ALL: [Quantity; 9] = [
        Quantity::Rho,
        Quantity::Temp,
        Quantity::Mass,
        Quantity::Vel,
        Quantity::Hsml,
        Quantity::Entropy,
        Quantity::Mach,
        Quantity::Xray,
        Quantity::SoundSpeed,
    ];

    pub fn info(self) -> &'static QuantityInfo {
        match self {
            Quantity::Rho => &QuantityInfo {
                tag: "rho",
                label: "density",
                storage_unit: Unit::GPerCm3,
                default_unit: Unit::GPerCm3,
                families: ALL_FAMILIES,
                colormap: Colormap::Viridis,
                log_default: true,
            },
            Quantity::Temp => &QuantityInfo {
                tag: "temp",
                label: "temperature",
                storage_unit: Unit::Kelvin,
                default_unit: Unit::Kev,
                families: GAS_ONLY,
                colormap: Colormap::Hot,
                log_default: true,
            },
            Quantity::Mass => &QuantityInfo {
                tag: "mass",
                label: "mass",
                storage_unit: Unit::Msol,
                default_unit: Unit::Msol,
                families: ALL_FAMILIES,
                colormap: Colormap::Viridis,
                log_default: true,
            },
            Quantity::Vel => &QuantityInfo {
                tag: "vel",
                label: "velocity",
                storage_unit: Unit::KmPerS,
                default_unit: Unit::KmPerS,
                families: ALL_FAMILIES,
                colormap: Colormap::Jet,
                log_default: false,
            },
            Quantity::Hsml => &QuantityInfo {
                tag: "hsml",
                label: "smoothing length",
                storage_unit: Unit::Kpc,
                default_unit: Unit::Kpc,
                families: GAS_ONLY,
                colormap: Colormap::Gray,
                log_default: true,
            },
            Quantity::Entropy => &QuantityInfo {
                tag: "entropy",
                label: "entropy",
                storage_unit: Unit::KevCm2,
                default_unit: Unit::KevCm2,
                families: GAS_ONLY,
                colormap: Colormap::Viridis,
                log_default: true,
            },
            Quantity::Mach => &QuantityInfo {
                tag: "mach",
                label: "Mach number",
                storage_unit: Unit::Dimensionless,
                default_unit: Unit::Dimensionless,
                families: GAS_ONLY,
                colormap: Colormap::Jet,
                log_default: false,
            },
            Quantity::Xray => &QuantityInfo {
                tag: "xray",
                label: "X-ray emissivity",
                storage_unit: Unit::ErgPerCm3PerS,
                default_unit: Unit::ErgPerCm3PerS,
                families: GAS_ONLY,
                colormap: Colormap::Inferno,
                log_default: true,
            },
            Quantity::SoundSpeed => &QuantityInfo {
                tag: "sound_speed",
                label: "sound speed",
                storage_unit: Unit::KmPerS,
                default_unit: Unit::KmPerS,
                families: GAS_ONLY,
                colormap: Colormap::Hot,
                log_default: false,
            },
        }
    }

    pub fn tag(self) -> &'static str {
        self.info().tag
    }

    /// Whether a derivation recipe exists for this tag.
    pub fn is_derived(self) -> bool {
        matches!(
            self,
            Quantity::Entropy | Quantity::Mach | Quantity::Xray | Quantity::SoundSpeed
        )
    }

    /// Runs the derivation if the canonical tag is not yet resident.
    /// Idempotent: repeated invocation leaves the arrays untouched.
    pub fn ensure(self, snap: &mut Snapshot) -> Result<(), ClusterError> {
        if !self.is_derived() {
            return Ok(());
        }
        if snap.gas.has_field(self.tag()) {
            return Ok(());
        }
        let field = match self {
            Quantity::Entropy => derive::entropy(snap)?,
            Quantity::Mach => derive::mach(snap)?,
            Quantity::Xray => derive::xray(snap)?,
            Quantity::SoundSpeed => derive::sound_speed(snap)?,
            _ => unreachable!(),
        };
        snap.gas
            .set_field(self.tag(), field)
            .map_err(|e| ClusterError::Snapshot(e.to_string()))
    }

    /// Materializes per-particle values of this quantity for one family,
    /// in the storage unit. Derived quantities must be `ensure`d first.
    pub fn values(self, snap: &Snapshot, family: Family) -> Result<Vec<f64>, ClusterError> {
        if !self.info().families.contains(&family) {
            return Err(ClusterError::Snapshot(format!(
                "quantity '{}' is not defined for family '{family}'",
                self.tag()
            )));
        }
        let fam = snap.family(family);
        let values = match self {
            Quantity::Mass => fam.mass.clone(),
            Quantity::Vel => fam
                .vel
                .iter()
                .map(|v| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt())
                .collect(),
            _ => fam
                .require_field(self.tag())
                .map_err(|e| ClusterError::Snapshot(e.to_string()))?
                .to_vec(),
        };
        Ok(values)
    }

    /// Converts values from the storage unit into `target`, preserving the
    /// temperature quirk: a temperature asked for in an energy unit is
    /// rendered in kelvin first, then multiplied by k_B expressed in that
    /// energy unit.
    pub fn fix_units(self, values: &mut [f64], target: Unit) -> Result<Unit, ClusterError> {
        let storage = self.info().storage_unit;
        if storage == target {
            return Ok(target);
        }
        if storage.dimension() == Dimension::Temperature
            && target.dimension() == Dimension::Energy
        {
            // k_B in the requested energy unit per kelvin.
            let kb = match target {
                Unit::Kev => constants::K_B_KEV,
                _ => constants::K_B / target.to_cgs(),
            };
            for v in values.iter_mut() {
                *v *= kb;
            }
            return Ok(target);
        }
        convert_slice(values, storage, target)
            .map_err(|e| ClusterError::Snapshot(e.to_string()))?;
        Ok(target)
    }
}

impl FromStr for Quantity {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::ALL
            .into_iter()
            .find(|q| q.tag() == s)
            .ok_or_else(|| ClusterError::Snapshot(format!("unknown quantity tag '{s}'")))
    }
}
