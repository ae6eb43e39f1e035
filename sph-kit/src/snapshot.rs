//! The in-memory particle snapshot model.
//!
//! A snapshot holds up to three particle families (gas, dark matter, stars).
//! Every family carries positions, velocities and masses; gas additionally
//! carries whatever loadable fields the on-disk format provided (density,
//! temperature, smoothing length). Derived quantities computed downstream
//! are attached as named fields next to the loadable ones.
//!
//! Canonical storage units after loading:
//! positions kpc, velocities km/s, masses Msol, `rho` g/cm^3, `temp` K,
//! `hsml` kpc. Time is Gyr, boxsize kpc.

use crate::error::SphError;
use std::collections::HashMap;
use std::fmt;

/// A particle species within a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Gas,
    DarkMatter,
    Stars,
}

impl Family {
    /// All families, in canonical order.
    pub const ALL: [Family; 3] = [Family::Gas, Family::DarkMatter, Family::Stars];

    /// Short tag used in file names and CLI flags.
    pub fn tag(self) -> &'static str {
        match self {
            Family::Gas => "gas",
            Family::DarkMatter => "dm",
            Family::Stars => "stars",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for Family {
    type Err = SphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gas" | "g" => Ok(Family::Gas),
            "dm" | "dark_matter" | "d" => Ok(Family::DarkMatter),
            "stars" | "star" | "s" => Ok(Family::Stars),
            other => Err(SphError::Precondition(format!(
                "unknown particle family '{other}'"
            ))),
        }
    }
}

/// Particle arrays of one family.
#[derive(Debug, Clone, Default)]
pub struct FamilyData {
    /// Positions, canonical kpc.
    pub pos: Vec<[f64; 3]>,
    /// Velocities, canonical km/s.
    pub vel: Vec<[f64; 3]>,
    /// Masses, canonical Msol.
    pub mass: Vec<f64>,
    /// Named loadable and derived fields.
    fields: HashMap<String, Vec<f64>>,
}

impl FamilyData {
    /// Number of particles in the family.
    pub fn len(&self) -> usize {
        self.pos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    /// Returns the named field, if resident.
    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// Returns the named field or a [`SphError::MissingField`].
    pub fn require_field(&self, name: &str) -> Result<&[f64], SphError> {
        self.field(name)
            .ok_or_else(|| SphError::MissingField(format!("field '{name}'")))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Attaches a named field. The length must match the particle count.
    pub fn set_field(&mut self, name: &str, data: Vec<f64>) -> Result<(), SphError> {
        if data.len() != self.len() {
            return Err(SphError::LengthMismatch {
                name: name.to_string(),
                got: data.len(),
                expected: self.len(),
            });
        }
        self.fields.insert(name.to_string(), data);
        Ok(())
    }

    /// Removes a named field, returning it if it was resident.
    pub fn remove_field(&mut self, name: &str) -> Option<Vec<f64>> {
        self.fields.remove(name)
    }

    /// Names of all resident fields (unordered).
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// On-disk layout the snapshot was read from. RAMSES outputs carry a
/// box size; GADGET collision snapshots are centered on the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapLayout {
    Ramses,
    Gadget,
}

/// Scalar properties attached to a snapshot.
#[derive(Debug, Clone)]
pub struct SnapProperties {
    /// Box side length in kpc. Present for RAMSES outputs only.
    pub boxsize: Option<f64>,
    /// Simulation time in Gyr.
    pub time: f64,
}

/// An immutable particle dump at one simulated instant.
///
/// Exclusive ownership is the concurrency model: whichever worker loaded a
/// snapshot holds the only handle, and dropping it releases the arrays.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub gas: FamilyData,
    pub dm: FamilyData,
    pub stars: FamilyData,
    pub properties: SnapProperties,
    pub layout: SnapLayout,
}

impl Snapshot {
    /// Creates an empty snapshot with the given layout and properties.
    pub fn new(layout: SnapLayout, properties: SnapProperties) -> Self {
        Snapshot {
            gas: FamilyData::default(),
            dm: FamilyData::default(),
            stars: FamilyData::default(),
            properties,
            layout,
        }
    }

    pub fn family(&self, family: Family) -> &FamilyData {
        match family {
            Family::Gas => &self.gas,
            Family::DarkMatter => &self.dm,
            Family::Stars => &self.stars,
        }
    }

    pub fn family_mut(&mut self, family: Family) -> &mut FamilyData {
        match family {
            Family::Gas => &mut self.gas,
            Family::DarkMatter => &mut self.dm,
            Family::Stars => &mut self.stars,
        }
    }

    /// Families that actually contain particles.
    pub fn present_families(&self) -> Vec<Family> {
        Family::ALL
            .into_iter()
            .filter(|f| !self.family(*f).is_empty())
            .collect()
    }

    /// Total particle count over all families.
    pub fn total_len(&self) -> usize {
        self.gas.len() + self.dm.len() + self.stars.len()
    }

    /// Mass-weighted mean velocity of one family (km/s).
    pub fn mean_velocity(&self, family: Family) -> [f64; 3] {
        let fam = self.family(family);
        let mut sum = [0.0f64; 3];
        let mut mtot = 0.0;
        for (v, &m) in fam.vel.iter().zip(fam.mass.iter()) {
            sum[0] += v[0] * m;
            sum[1] += v[1] * m;
            sum[2] += v[2] * m;
            mtot += m;
        }
        if mtot > 0.0 {
            [sum[0] / mtot, sum[1] / mtot, sum[2] / mtot]
        } else {
            [0.0; 3]
        }
    }
}
