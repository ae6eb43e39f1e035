//! A closed table of the units the toolkit deals in, with exact CGS
//! conversion factors.
//!
//! Conversions are only defined within a dimension; asking for a
//! cross-dimension conversion is a caller error and is reported as such
//! (the temperature-to-energy coercion is handled one level up, in the
//! quantity registry, and deliberately does not go through [`convert`]).

use crate::constants;
use crate::error::SphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical dimension of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Length,
    Velocity,
    Mass,
    Time,
    Temperature,
    Energy,
    MassDensity,
    Entropy,
    Emissivity,
    Dimensionless,
}

/// The units recognized by the toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Cm,
    Km,
    Kpc,
    Mpc,
    CmPerS,
    KmPerS,
    Gram,
    Msol,
    Second,
    Myr,
    Gyr,
    Kelvin,
    Erg,
    Kev,
    GPerCm3,
    MsolPerKpc3,
    KevCm2,
    ErgPerCm3PerS,
    Dimensionless,
}

impl Unit {
    /// The dimension this unit measures.
    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Cm | Unit::Km | Unit::Kpc | Unit::Mpc => Dimension::Length,
            Unit::CmPerS | Unit::KmPerS => Dimension::Velocity,
            Unit::Gram | Unit::Msol => Dimension::Mass,
            Unit::Second | Unit::Myr | Unit::Gyr => Dimension::Time,
            Unit::Kelvin => Dimension::Temperature,
            Unit::Erg | Unit::Kev => Dimension::Energy,
            Unit::GPerCm3 | Unit::MsolPerKpc3 => Dimension::MassDensity,
            Unit::KevCm2 => Dimension::Entropy,
            Unit::ErgPerCm3PerS => Dimension::Emissivity,
            Unit::Dimensionless => Dimension::Dimensionless,
        }
    }

    /// Multiplicative factor taking a value in this unit to CGS.
    pub fn to_cgs(self) -> f64 {
        match self {
            Unit::Cm | Unit::CmPerS | Unit::Gram | Unit::Second | Unit::Kelvin => 1.0,
            Unit::Km | Unit::KmPerS => constants::KM,
            Unit::Kpc => constants::KPC,
            Unit::Mpc => 1.0e3 * constants::KPC,
            Unit::Msol => constants::M_SOL,
            Unit::Myr => 1.0e-3 * constants::GYR,
            Unit::Gyr => constants::GYR,
            Unit::Erg => 1.0,
            Unit::Kev => constants::KEV,
            Unit::GPerCm3 => 1.0,
            Unit::MsolPerKpc3 => constants::M_SOL / constants::KPC.powi(3),
            // Composite units are their own CGS-adjacent base; keV cm^2 is
            // conventionally left unconverted in the literature.
            Unit::KevCm2 => 1.0,
            Unit::ErgPerCm3PerS => 1.0,
            Unit::Dimensionless => 1.0,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Unit::Cm => "cm",
            Unit::Km => "km",
            Unit::Kpc => "kpc",
            Unit::Mpc => "Mpc",
            Unit::CmPerS => "cm s^-1",
            Unit::KmPerS => "km s^-1",
            Unit::Gram => "g",
            Unit::Msol => "Msol",
            Unit::Second => "s",
            Unit::Myr => "Myr",
            Unit::Gyr => "Gyr",
            Unit::Kelvin => "K",
            Unit::Erg => "erg",
            Unit::Kev => "keV",
            Unit::GPerCm3 => "g cm^-3",
            Unit::MsolPerKpc3 => "Msol kpc^-3",
            Unit::KevCm2 => "keV cm^2",
            Unit::ErgPerCm3PerS => "erg cm^-3 s^-1",
            Unit::Dimensionless => "",
        };
        f.write_str(s)
    }
}

impl FromStr for Unit {
    type Err = SphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim();
        let unit = match norm {
            "cm" => Unit::Cm,
            "km" => Unit::Km,
            "kpc" => Unit::Kpc,
            "Mpc" | "mpc" => Unit::Mpc,
            "cm s^-1" | "cm/s" => Unit::CmPerS,
            "km s^-1" | "km/s" => Unit::KmPerS,
            "g" => Unit::Gram,
            "Msol" | "msol" | "Msun" => Unit::Msol,
            "s" => Unit::Second,
            "Myr" | "myr" => Unit::Myr,
            "Gyr" | "gyr" => Unit::Gyr,
            "K" => Unit::Kelvin,
            "erg" => Unit::Erg,
            "keV" | "kev" => Unit::Kev,
            "g cm^-3" | "g/cm^3" => Unit::GPerCm3,
            "Msol kpc^-3" | "Msol/kpc^3" => Unit::MsolPerKpc3,
            "keV cm^2" => Unit::KevCm2,
            "erg cm^-3 s^-1" => Unit::ErgPerCm3PerS,
            "" => Unit::Dimensionless,
            other => return Err(SphError::UnknownUnit(other.to_string())),
        };
        Ok(unit)
    }
}

/// Converts `value` from `from` to `to`.
///
/// Fails when the two units do not share a dimension.
pub fn convert(value: f64, from: Unit, to: Unit) -> Result<f64, SphError> {
    if from.dimension() != to.dimension() {
        return Err(SphError::UnitMismatch { from, to });
    }
    Ok(value * from.to_cgs() / to.to_cgs())
}

/// Converts a whole slice in place, returning the scale that was applied.
pub fn convert_slice(values: &mut [f64], from: Unit, to: Unit) -> Result<f64, SphError> {
    if from.dimension() != to.dimension() {
        return Err(SphError::UnitMismatch { from, to });
    }
    let scale = from.to_cgs() / to.to_cgs();
    if scale != 1.0 {
        for v in values.iter_mut() {
            *v *= scale;
        }
    }
    Ok(scale)
}
