//! RAMSES `output_NNNNN` directory reader.
//!
//! An output directory holds an `info_NNNNN.txt` key/value file with the
//! unit scales, per-cpu particle files (`part_NNNNN.outNNNNN`) and, for
//! hydro runs, the AMR tree (`amr_...`) plus cell variables (`hydro_...`).
//! Dark matter and stars come from the particle files (split on the birth
//! epoch); gas is reconstructed from the leaf cells of the AMR tree as
//! pseudo-particles with one smoothing length per cell.
//!
//! Everything is converted to the canonical snapshot units on load using
//! `unit_l`, `unit_d`, `unit_t` from the info file.

use crate::constants;
use crate::error::SphError;
use crate::fortran::{
    as_f64s, as_i32s, read_f64_scalar, read_i32_scalar, read_record, skip_record,
};
use crate::snapshot::{SnapLayout, SnapProperties, Snapshot};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Parsed `info_NNNNN.txt` contents.
#[derive(Debug, Clone)]
pub struct RamsesInfo {
    pub ncpu: usize,
    pub ndim: usize,
    pub levelmin: usize,
    pub levelmax: usize,
    pub boxlen: f64,
    pub time: f64,
    /// Length unit in cm per code unit.
    pub unit_l: f64,
    /// Density unit in g/cm^3 per code unit.
    pub unit_d: f64,
    /// Time unit in s per code unit.
    pub unit_t: f64,
}

impl RamsesInfo {
    /// Parses the `key = value` lines of an info file.
    pub fn parse(text: &str) -> Result<Self, SphError> {
        let mut map = HashMap::new();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        let get_f = |key: &str| -> Result<f64, SphError> {
            map.get(key)
                .ok_or_else(|| SphError::Format(format!("info file lacks '{key}'")))?
                .parse::<f64>()
                .map_err(|_| SphError::Format(format!("info file value for '{key}' not numeric")))
        };
        Ok(RamsesInfo {
            ncpu: get_f("ncpu")? as usize,
            ndim: get_f("ndim")? as usize,
            levelmin: get_f("levelmin")? as usize,
            levelmax: get_f("levelmax")? as usize,
            boxlen: get_f("boxlen")?,
            time: get_f("time")?,
            unit_l: get_f("unit_l")?,
            unit_d: get_f("unit_d")?,
            unit_t: get_f("unit_t")?,
        })
    }

    /// Velocity unit in cm/s per code unit.
    pub fn unit_v(&self) -> f64 {
        self.unit_l / self.unit_t
    }

    /// Mass unit in g per code unit.
    pub fn unit_m(&self) -> f64 {
        self.unit_d * self.unit_l.powi(3)
    }

    /// Box side length in kpc.
    pub fn boxsize_kpc(&self) -> f64 {
        self.boxlen * self.unit_l / constants::KPC
    }
}

/// Extracts the five-digit output number from a directory name like
/// `output_00042`.
pub fn output_number(dir: &Path) -> Result<u32, SphError> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SphError::Format(format!("bad output directory {}", dir.display())))?;
    name.strip_prefix("output_")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            SphError::Format(format!(
                "'{name}' does not look like a RAMSES output directory"
            ))
        })
}

fn info_path(dir: &Path, num: u32) -> PathBuf {
    dir.join(format!("info_{num:05}.txt"))
}

fn cpu_file(dir: &Path, kind: &str, num: u32, icpu: usize) -> PathBuf {
    dir.join(format!("{kind}_{num:05}.out{icpu:05}"))
}

/// Reads the info file of an output directory.
pub fn read_info(dir: &Path) -> Result<RamsesInfo, SphError> {
    let num = output_number(dir)?;
    let text = std::fs::read_to_string(info_path(dir, num))?;
    RamsesInfo::parse(&text)
}

/// Reads one particle file into (pos, vel, mass, birth) code-unit arrays.
fn read_part_file(
    path: &Path,
    info: &RamsesInfo,
) -> Result<(Vec<[f64; 3]>, Vec<[f64; 3]>, Vec<f64>, Option<Vec<f64>>), SphError> {
    let file = File::open(path)?;
    let mut r = BufReader::new(file);

    let _ncpu = read_i32_scalar(&mut r)?;
    let ndim = read_i32_scalar(&mut r)? as usize;
    if ndim != info.ndim {
        return Err(SphError::Format(format!(
            "particle file ndim {ndim} disagrees with info ndim {}",
            info.ndim
        )));
    }
    let npart = read_i32_scalar(&mut r)? as usize;
    skip_record(&mut r)?; // localseed
    let _nstar_tot = read_i32_scalar(&mut r)?;
    let _mstar_tot = read_f64_scalar(&mut r)?;
    let _mstar_lost = read_f64_scalar(&mut r)?;
    let _nsink = read_i32_scalar(&mut r)?;

    let mut axes = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        let x = as_f64s(&read_record(&mut r)?);
        if x.len() != npart {
            return Err(SphError::Format("position record length mismatch".into()));
        }
        axes.push(x);
    }
    let mut vaxes = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        vaxes.push(as_f64s(&read_record(&mut r)?));
    }
    let mass = as_f64s(&read_record(&mut r)?);
    if mass.len() != npart {
        return Err(SphError::Format("mass record length mismatch".into()));
    }
    skip_record(&mut r)?; // id
    skip_record(&mut r)?; // level

    // Star-forming runs append birth epochs (and metallicities).
    let birth = match read_record(&mut r) {
        Ok(rec) => {
            let b = as_f64s(&rec);
            if b.len() == npart {
                Some(b)
            } else {
                None
            }
        }
        Err(SphError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => None,
        Err(e) => return Err(e),
    };

    let mut pos = Vec::with_capacity(npart);
    let mut vel = Vec::with_capacity(npart);
    for i in 0..npart {
        let at = |ax: &Vec<Vec<f64>>, k: usize| if k < ndim { ax[k][i] } else { 0.0 };
        pos.push([at(&axes, 0), at(&axes, 1), at(&axes, 2)]);
        vel.push([at(&vaxes, 0), at(&vaxes, 1), at(&vaxes, 2)]);
    }
    Ok((pos, vel, mass, birth))
}

/// One leaf cell lifted out of the AMR tree, code units.
struct GasCell {
    pos: [f64; 3],
    vel: [f64; 3],
    rho: f64,
    pressure: f64,
    /// Cell side length in code units.
    dx: f64,
}

/// Walks one cpu's amr + hydro file pair and collects leaf cells owned by
/// that cpu.
fn read_gas_cells(
    amr_path: &Path,
    hydro_path: &Path,
    icpu: usize,
) -> Result<Vec<GasCell>, SphError> {
    let mut amr = BufReader::new(File::open(amr_path)?);
    let mut hydro = BufReader::new(File::open(hydro_path)?);

    // --- AMR header ---
    let ncpu = read_i32_scalar(&mut amr)? as usize;
    let ndim = read_i32_scalar(&mut amr)? as usize;
    if ndim != 3 {
        return Err(SphError::Format(format!(
            "only 3-D AMR outputs are supported, found ndim {ndim}"
        )));
    }
    skip_record(&mut amr)?; // nx, ny, nz
    let nlevelmax = read_i32_scalar(&mut amr)? as usize;
    skip_record(&mut amr)?; // ngridmax
    let nboundary = read_i32_scalar(&mut amr)? as usize;
    skip_record(&mut amr)?; // ngrid_current
    let _boxlen = read_f64_scalar(&mut amr)?;
    for _ in 0..5 {
        // noutput triple, tout, aout, t, dtold
        skip_record(&mut amr)?;
    }
    for _ in 0..5 {
        // dtnew, nstep pair, einit triple, omega block, aexp block
        skip_record(&mut amr)?;
    }
    skip_record(&mut amr)?; // mass_sph
    skip_record(&mut amr)?; // headl
    skip_record(&mut amr)?; // taill
    let numbl = as_i32s(&read_record(&mut amr)?);
    skip_record(&mut amr)?; // numbtot
    if nboundary > 0 {
        for _ in 0..3 {
            skip_record(&mut amr)?; // headb, tailb, numbb
        }
    }
    skip_record(&mut amr)?; // free-memory bookkeeping
    let ordering_rec = read_record(&mut amr)?;
    let ordering = String::from_utf8_lossy(&ordering_rec).trim().to_string();
    if ordering.starts_with("bisection") {
        for _ in 0..5 {
            skip_record(&mut amr)?;
        }
    } else {
        skip_record(&mut amr)?; // bound_key
    }
    for _ in 0..3 {
        skip_record(&mut amr)?; // coarse son, flag, cpu_map
    }

    // --- hydro header ---
    let h_ncpu = read_i32_scalar(&mut hydro)? as usize;
    let nvar = read_i32_scalar(&mut hydro)? as usize;
    skip_record(&mut hydro)?; // ndim
    let h_nlevelmax = read_i32_scalar(&mut hydro)? as usize;
    let h_nboundary = read_i32_scalar(&mut hydro)? as usize;
    let _gamma = read_f64_scalar(&mut hydro)?;
    if h_ncpu != ncpu || h_nlevelmax != nlevelmax || h_nboundary != nboundary {
        return Err(SphError::Format(
            "amr and hydro headers disagree on tree shape".into(),
        ));
    }
    if nvar < 5 {
        return Err(SphError::Format(format!(
            "hydro file carries {nvar} variables, need at least rho, v, P"
        )));
    }

    let twotondim = 1usize << ndim;
    let nbound_tot = ncpu + nboundary;
    let mut cells = Vec::new();

    for ilevel in 0..nlevelmax {
        let dx = 0.5f64.powi(ilevel as i32 + 1);
        for ibound in 0..nbound_tot {
            // hydro always writes the level/count pair, even when empty.
            let h_level = read_i32_scalar(&mut hydro)? as usize;
            let ncache = read_i32_scalar(&mut hydro)? as usize;
            if h_level != ilevel + 1 {
                return Err(SphError::Format(format!(
                    "hydro level marker {h_level} at level {}",
                    ilevel + 1
                )));
            }
            let n_amr = if ibound < ncpu {
                numbl.get(ilevel * ncpu + ibound).copied().unwrap_or(0) as usize
            } else {
                ncache
            };
            if ncache == 0 {
                continue;
            }
            if n_amr != ncache {
                return Err(SphError::Format(
                    "amr grid count disagrees with hydro cache".into(),
                ));
            }

            // AMR grid block for this (level, domain).
            skip_record(&mut amr)?; // grid index
            skip_record(&mut amr)?; // next
            skip_record(&mut amr)?; // prev
            let mut xg = Vec::with_capacity(ndim);
            for _ in 0..ndim {
                xg.push(as_f64s(&read_record(&mut amr)?));
            }
            skip_record(&mut amr)?; // father
            for _ in 0..2 * ndim {
                skip_record(&mut amr)?; // neighbours
            }
            let mut son = Vec::with_capacity(twotondim);
            for _ in 0..twotondim {
                son.push(as_i32s(&read_record(&mut amr)?));
            }
            let mut cpu_map = Vec::with_capacity(twotondim);
            for _ in 0..twotondim {
                cpu_map.push(as_i32s(&read_record(&mut amr)?));
            }
            for _ in 0..twotondim {
                skip_record(&mut amr)?; // refinement flags
            }

            // Hydro variables: per child cell, per variable.
            let mut var = vec![vec![Vec::new(); nvar]; twotondim];
            for (ind, slot) in var.iter_mut().enumerate() {
                for ivar in 0..nvar {
                    let rec = as_f64s(&read_record(&mut hydro)?);
                    if rec.len() != ncache {
                        return Err(SphError::Format(format!(
                            "hydro record length mismatch at ind {ind} var {ivar}"
                        )));
                    }
                    slot[ivar] = rec;
                }
            }

            for ind in 0..twotondim {
                let ox = if ind & 1 == 0 { -0.5 } else { 0.5 };
                let oy = if ind & 2 == 0 { -0.5 } else { 0.5 };
                let oz = if ind & 4 == 0 { -0.5 } else { 0.5 };
                for i in 0..ncache {
                    // Leaf cells owned by this cpu only; refined or foreign
                    // cells are covered elsewhere.
                    if son[ind][i] != 0 || cpu_map[ind][i] as usize != icpu {
                        continue;
                    }
                    cells.push(GasCell {
                        pos: [
                            xg[0][i] + ox * dx,
                            xg[1][i] + oy * dx,
                            xg[2][i] + oz * dx,
                        ],
                        vel: [var[ind][1][i], var[ind][2][i], var[ind][3][i]],
                        rho: var[ind][0][i],
                        pressure: var[ind][4][i],
                        dx,
                    });
                }
            }
        }
    }
    Ok(cells)
}

/// Loads a full RAMSES output directory into the canonical snapshot model.
///
/// `mu` is the mean molecular weight used for the pressure-to-temperature
/// conversion of gas cells.
pub fn read_ramses(dir: &Path, mu: f64) -> Result<Snapshot, SphError> {
    let num = output_number(dir)?;
    let info = read_info(dir)?;

    let kpc_per_code = info.unit_l / constants::KPC;
    let kms_per_code = info.unit_v() / constants::KM;
    let msol_per_code = info.unit_m() / constants::M_SOL;
    let time_gyr = info.time * info.unit_t / constants::GYR;

    let mut snap = Snapshot::new(
        SnapLayout::Ramses,
        SnapProperties {
            boxsize: Some(info.boxsize_kpc()),
            time: time_gyr,
        },
    );

    // --- collisionless particles ---
    for icpu in 1..=info.ncpu {
        let path = cpu_file(dir, "part", num, icpu);
        if !path.exists() {
            if icpu == 1 {
                log::warn!("no particle files in {}", dir.display());
            }
            break;
        }
        let (pos, vel, mass, birth) = read_part_file(&path, &info)?;
        for i in 0..pos.len() {
            let is_star = birth.as_ref().map(|b| b[i] != 0.0).unwrap_or(false);
            let fam = if is_star { &mut snap.stars } else { &mut snap.dm };
            fam.pos.push([
                pos[i][0] * kpc_per_code,
                pos[i][1] * kpc_per_code,
                pos[i][2] * kpc_per_code,
            ]);
            fam.vel.push([
                vel[i][0] * kms_per_code,
                vel[i][1] * kms_per_code,
                vel[i][2] * kms_per_code,
            ]);
            fam.mass.push(mass[i] * msol_per_code);
        }
    }

    // --- gas from the AMR tree ---
    let have_hydro = cpu_file(dir, "hydro", num, 1).exists();
    if have_hydro {
        let mut rho_f = Vec::new();
        let mut temp_f = Vec::new();
        let mut hsml_f = Vec::new();
        for icpu in 1..=info.ncpu {
            let amr_path = cpu_file(dir, "amr", num, icpu);
            let hydro_path = cpu_file(dir, "hydro", num, icpu);
            let cells = read_gas_cells(&amr_path, &hydro_path, icpu)?;
            for c in cells {
                snap.gas.pos.push([
                    c.pos[0] * kpc_per_code,
                    c.pos[1] * kpc_per_code,
                    c.pos[2] * kpc_per_code,
                ]);
                snap.gas.vel.push([
                    c.vel[0] * kms_per_code,
                    c.vel[1] * kms_per_code,
                    c.vel[2] * kms_per_code,
                ]);
                // Cell mass in Msol; densities to g/cm^3.
                snap.gas.mass.push(c.rho * c.dx.powi(3) * msol_per_code);
                let rho_cgs = c.rho * info.unit_d;
                rho_f.push(rho_cgs);
                // T = (P / rho) mu m_p / k_B, with P/rho in (cm/s)^2.
                let p_over_rho = (c.pressure / c.rho) * info.unit_v().powi(2);
                temp_f.push(p_over_rho * mu * constants::M_P / constants::K_B);
                hsml_f.push(c.dx * kpc_per_code);
            }
        }
        snap.gas.set_field("rho", rho_f)?;
        snap.gas.set_field("temp", temp_f)?;
        snap.gas.set_field("hsml", hsml_f)?;
    }

    Ok(snap)
}
