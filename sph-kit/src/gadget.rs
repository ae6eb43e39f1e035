//! GADGET-2 binary snapshot reader and writer.
//!
//! Supports SnapFormat = 2 (each payload preceded by a 4-character
//! block-name record) and falls back to the fixed block order of
//! SnapFormat = 1. All records carry the Fortran length prefix and suffix;
//! byte order is little-endian.
//!
//! Code units follow the collision-IC convention: lengths kpc, velocities
//! km/s, masses 1e10 Msol, internal energies (km/s)^2. The loader converts
//! to the canonical snapshot units on the way in.

use crate::constants;
use crate::error::SphError;
use crate::fortran::{read_record, read_u32, write_record};
use crate::snapshot::{SnapLayout, SnapProperties, Snapshot};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Number of particle type slots in a GADGET header.
const NTYPES: usize = 6;
/// Header payload size in bytes.
const HEADER_LEN: u32 = 256;

/// The 256-byte GADGET-2 header.
#[derive(Debug, Clone, Default)]
pub struct GadgetHeader {
    pub npart: [u32; NTYPES],
    pub massarr: [f64; NTYPES],
    pub time: f64,
    pub redshift: f64,
    pub flag_sfr: i32,
    pub flag_feedback: i32,
    pub npart_total: [u32; NTYPES],
    pub flag_cooling: i32,
    pub num_files: i32,
    pub boxsize: f64,
}

impl GadgetHeader {
    fn from_bytes(buf: &[u8]) -> Result<Self, SphError> {
        if buf.len() != HEADER_LEN as usize {
            return Err(SphError::Format(format!(
                "GADGET header payload is {} bytes, expected {HEADER_LEN}",
                buf.len()
            )));
        }
        fn take_u32(buf: &[u8], off: &mut usize) -> u32 {
            let v = u32::from_le_bytes(buf[*off..*off + 4].try_into().unwrap());
            *off += 4;
            v
        }
        fn take_i32(buf: &[u8], off: &mut usize) -> i32 {
            let v = i32::from_le_bytes(buf[*off..*off + 4].try_into().unwrap());
            *off += 4;
            v
        }
        fn take_f64(buf: &[u8], off: &mut usize) -> f64 {
            let v = f64::from_le_bytes(buf[*off..*off + 8].try_into().unwrap());
            *off += 8;
            v
        }

        let mut off = 0usize;
        let mut hdr = GadgetHeader::default();
        for i in 0..NTYPES {
            hdr.npart[i] = take_u32(buf, &mut off);
        }
        for i in 0..NTYPES {
            hdr.massarr[i] = take_f64(buf, &mut off);
        }
        hdr.time = take_f64(buf, &mut off);
        hdr.redshift = take_f64(buf, &mut off);
        hdr.flag_sfr = take_i32(buf, &mut off);
        hdr.flag_feedback = take_i32(buf, &mut off);
        for i in 0..NTYPES {
            hdr.npart_total[i] = take_u32(buf, &mut off);
        }
        hdr.flag_cooling = take_i32(buf, &mut off);
        hdr.num_files = take_i32(buf, &mut off);
        hdr.boxsize = take_f64(buf, &mut off);
        // The remainder of the 256 bytes is cosmology and padding we do not use.
        Ok(hdr)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN as usize);
        for v in self.npart {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        for v in self.massarr {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.extend_from_slice(&self.redshift.to_le_bytes());
        buf.extend_from_slice(&self.flag_sfr.to_le_bytes());
        buf.extend_from_slice(&self.flag_feedback.to_le_bytes());
        for v in self.npart_total {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf.extend_from_slice(&self.flag_cooling.to_le_bytes());
        buf.extend_from_slice(&self.num_files.to_le_bytes());
        buf.extend_from_slice(&self.boxsize.to_le_bytes());
        buf.resize(HEADER_LEN as usize, 0u8);
        buf
    }

    fn total_particles(&self) -> usize {
        self.npart.iter().map(|&n| n as usize).sum()
    }

    /// Count of particles whose mass comes from the MASS block rather than
    /// the header mass table.
    fn variable_mass_count(&self) -> usize {
        (0..NTYPES)
            .filter(|&i| self.npart[i] > 0 && self.massarr[i] == 0.0)
            .map(|i| self.npart[i] as usize)
            .sum()
    }
}

/// Writes the SnapFormat = 2 block-name record followed by the payload.
fn write_named_block<W: Write>(w: &mut W, name: &str, payload: &[u8]) -> Result<(), SphError> {
    debug_assert_eq!(name.len(), 4);
    let mut head = [0u8; 8];
    head[..4].copy_from_slice(name.as_bytes());
    head[4..].copy_from_slice(&((payload.len() + 8) as u32).to_le_bytes());
    write_record(w, &head)?;
    write_record(w, payload)
}

fn f32s(buf: &[u8]) -> Vec<f64> {
    buf.chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()) as f64)
        .collect()
}

/// One parsed block: its 4-character name and payload.
struct Block {
    name: String,
    payload: Vec<u8>,
}

/// Reads all blocks of a GADGET file, synthesizing names for SnapFormat = 1.
fn read_blocks(path: &Path) -> Result<Vec<Block>, SphError> {
    let file = File::open(path)?;
    let mut r = BufReader::new(file);
    let first = read_u32(&mut r)?;

    let mut blocks = Vec::new();
    if first == 8 {
        // SnapFormat 2: every payload is preceded by a name record.
        let mut name_buf = vec![0u8; 8];
        r.read_exact(&mut name_buf)?;
        let tail = read_u32(&mut r)?;
        if tail != 8 {
            return Err(SphError::Format("bad block-name record framing".into()));
        }
        loop {
            let name = String::from_utf8_lossy(&name_buf[..4]).trim_end().to_string();
            let payload = read_record(&mut r)?;
            blocks.push(Block { name, payload });
            // Next name record, or EOF.
            match read_u32(&mut r) {
                Ok(8) => {
                    r.read_exact(&mut name_buf)?;
                    let tail = read_u32(&mut r)?;
                    if tail != 8 {
                        return Err(SphError::Format("bad block-name record framing".into()));
                    }
                }
                Ok(other) => {
                    return Err(SphError::Format(format!(
                        "expected block-name record, found length {other}"
                    )))
                }
                Err(SphError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }
    } else if first == HEADER_LEN {
        // SnapFormat 1: fixed order, no names. Re-read from the top.
        drop(r);
        let file = File::open(path)?;
        let mut r = BufReader::new(file);
        const ORDER: [&str; 8] = ["HEAD", "POS", "VEL", "ID", "MASS", "U", "RHO", "HSML"];
        let mut idx = 0;
        loop {
            match read_record(&mut r) {
                Ok(payload) => {
                    let name = ORDER.get(idx).copied().unwrap_or("UNKN").to_string();
                    blocks.push(Block { name, payload });
                    idx += 1;
                }
                Err(SphError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }
    } else {
        return Err(SphError::Format(format!(
            "not a GADGET-2 snapshot (leading record length {first})"
        )));
    }
    Ok(blocks)
}

/// Reads a single-file GADGET-2 snapshot into the canonical snapshot model.
///
/// `mu` is the mean molecular weight used to turn internal energy into
/// temperature.
pub fn read_gadget(path: &Path, mu: f64) -> Result<Snapshot, SphError> {
    let blocks = read_blocks(path)?;
    let find = |name: &str| blocks.iter().find(|b| b.name == name);

    let head = find("HEAD")
        .ok_or_else(|| SphError::Format("missing HEAD block".into()))?;
    let hdr = GadgetHeader::from_bytes(&head.payload)?;
    let ntot = hdr.total_particles();

    let pos_block = find("POS").ok_or_else(|| SphError::Format("missing POS block".into()))?;
    let vel_block = find("VEL").ok_or_else(|| SphError::Format("missing VEL block".into()))?;
    let pos = f32s(&pos_block.payload);
    let vel = f32s(&vel_block.payload);
    if pos.len() != 3 * ntot || vel.len() != 3 * ntot {
        return Err(SphError::Format(format!(
            "POS/VEL length mismatch: {} particles, {} / {} values",
            ntot,
            pos.len(),
            vel.len()
        )));
    }

    // Per-particle masses: header table where set, MASS block otherwise.
    let var_masses: Vec<f64> = match find("MASS") {
        Some(b) => f32s(&b.payload),
        None => Vec::new(),
    };
    if var_masses.len() != hdr.variable_mass_count() {
        return Err(SphError::Format(format!(
            "MASS block holds {} values, header implies {}",
            var_masses.len(),
            hdr.variable_mass_count()
        )));
    }

    // Non-cosmological time unit: kpc / (km/s), converted to Gyr.
    let time_gyr = hdr.time * (constants::KPC / constants::KM) / constants::GYR;
    let boxsize = if hdr.boxsize > 0.0 { Some(hdr.boxsize) } else { None };
    let mut snap = Snapshot::new(
        SnapLayout::Gadget,
        SnapProperties {
            boxsize,
            time: time_gyr,
        },
    );

    let mut var_iter = var_masses.into_iter();
    let mut cursor = 0usize;
    for ptype in 0..NTYPES {
        let n = hdr.npart[ptype] as usize;
        if n == 0 {
            continue;
        }
        let fam = match ptype {
            0 => &mut snap.gas,
            4 => &mut snap.stars,
            // Halo, disk, bulge and boundary particles are all collisionless.
            _ => &mut snap.dm,
        };
        for i in cursor..cursor + n {
            fam.pos.push([pos[3 * i], pos[3 * i + 1], pos[3 * i + 2]]);
            fam.vel.push([vel[3 * i], vel[3 * i + 1], vel[3 * i + 2]]);
            let m_code = if hdr.massarr[ptype] != 0.0 {
                hdr.massarr[ptype]
            } else {
                var_iter.next().ok_or_else(|| {
                    SphError::Format("MASS block exhausted early".into())
                })?
            };
            fam.mass.push(m_code * 1.0e10); // code mass 1e10 Msol
        }
        cursor += n;
    }

    // Gas thermodynamics.
    let ngas = snap.gas.len();
    if ngas > 0 {
        if let Some(b) = find("U") {
            let u = f32s(&b.payload);
            if u.len() != ngas {
                return Err(SphError::Format("U block length mismatch".into()));
            }
            // u in (km/s)^2 -> erg/g; T = (gamma-1) mu m_p u / k_B.
            let scale =
                (constants::GAMMA - 1.0) * mu * constants::M_P * constants::KM * constants::KM
                    / constants::K_B;
            let temp: Vec<f64> = u.iter().map(|&ui| ui * scale).collect();
            snap.gas.set_field("temp", temp)?;
        }
        if let Some(b) = find("RHO") {
            let rho = f32s(&b.payload);
            if rho.len() != ngas {
                return Err(SphError::Format("RHO block length mismatch".into()));
            }
            // code density 1e10 Msol / kpc^3 -> g/cm^3.
            let scale = 1.0e10 * constants::M_SOL / constants::KPC.powi(3);
            let rho: Vec<f64> = rho.iter().map(|&r| r * scale).collect();
            snap.gas.set_field("rho", rho)?;
        }
        if let Some(b) = find("HSML") {
            let hsml = f32s(&b.payload);
            if hsml.len() != ngas {
                return Err(SphError::Format("HSML block length mismatch".into()));
            }
            snap.gas.set_field("hsml", hsml)?;
        }
    }
    Ok(snap)
}

/// Arrays handed to [`write_gadget`], already in code units.
#[derive(Debug, Default)]
pub struct GadgetParticles {
    /// Per-type particle data, GADGET type order (0 = gas, 1 = halo, ...).
    pub pos: [Vec<[f32; 3]>; NTYPES],
    pub vel: [Vec<[f32; 3]>; NTYPES],
    pub mass: [Vec<f32>; NTYPES],
    /// Gas internal energy, density and smoothing length; empty when no gas.
    pub u: Vec<f32>,
    pub rho: Vec<f32>,
    pub hsml: Vec<f32>,
    pub time: f64,
}

/// Writes a SnapFormat = 2 file: HEAD, POS, VEL, ID, MASS, then U / RHO /
/// HSML when gas particles are present.
pub fn write_gadget(path: &Path, particles: &GadgetParticles) -> Result<(), SphError> {
    let mut hdr = GadgetHeader {
        time: particles.time,
        num_files: 1,
        ..Default::default()
    };
    for i in 0..NTYPES {
        hdr.npart[i] = particles.pos[i].len() as u32;
        hdr.npart_total[i] = hdr.npart[i];
    }
    let ntot: usize = hdr.total_particles();

    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    write_named_block(&mut w, "HEAD", &hdr.to_bytes())?;

    let mut pos_buf = Vec::with_capacity(ntot * 12);
    let mut vel_buf = Vec::with_capacity(ntot * 12);
    let mut id_buf = Vec::with_capacity(ntot * 4);
    let mut mass_buf = Vec::new();
    let mut next_id: u32 = 1;
    for t in 0..NTYPES {
        for (p, v) in particles.pos[t].iter().zip(particles.vel[t].iter()) {
            for k in 0..3 {
                pos_buf.extend_from_slice(&p[k].to_le_bytes());
                vel_buf.extend_from_slice(&v[k].to_le_bytes());
            }
            id_buf.extend_from_slice(&next_id.to_le_bytes());
            next_id += 1;
        }
        for m in &particles.mass[t] {
            mass_buf.extend_from_slice(&m.to_le_bytes());
        }
    }
    write_named_block(&mut w, "POS ", &pos_buf)?;
    write_named_block(&mut w, "VEL ", &vel_buf)?;
    write_named_block(&mut w, "ID  ", &id_buf)?;
    write_named_block(&mut w, "MASS", &mass_buf)?;

    if !particles.pos[0].is_empty() {
        for (name, data) in [
            ("U   ", &particles.u),
            ("RHO ", &particles.rho),
            ("HSML", &particles.hsml),
        ] {
            let mut buf = Vec::with_capacity(data.len() * 4);
            for v in data {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            write_named_block(&mut w, name, &buf)?;
        }
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Family;

    fn sample_particles() -> GadgetParticles {
        let mut p = GadgetParticles {
            time: 1.0,
            ..Default::default()
        };
        // Two gas particles, three halo particles.
        p.pos[0] = vec![[1.0, 2.0, 3.0], [-1.0, 0.5, 0.0]];
        p.vel[0] = vec![[10.0, 0.0, 0.0], [0.0, -20.0, 0.0]];
        p.mass[0] = vec![0.001, 0.001]; // 1e7 Msol each
        p.u = vec![100.0, 400.0]; // (km/s)^2
        p.rho = vec![1.0e-5, 2.0e-5];
        p.hsml = vec![5.0, 7.0];
        p.pos[1] = vec![[50.0, 0.0, 0.0], [0.0, 50.0, 0.0], [0.0, 0.0, 50.0]];
        p.vel[1] = vec![[0.0; 3]; 3];
        p.mass[1] = vec![0.01, 0.01, 0.01];
        p
    }

    #[test]
    fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot_000");
        write_gadget(&path, &sample_particles()).unwrap();

        let snap = read_gadget(&path, constants::MU).unwrap();
        assert_eq!(snap.gas.len(), 2);
        assert_eq!(snap.dm.len(), 3);
        assert_eq!(snap.stars.len(), 0);
        assert!((snap.gas.mass[0] - 1.0e7).abs() / 1.0e7 < 1e-5);
        assert!((snap.gas.pos[1][0] - -1.0).abs() < 1e-6);
        assert!(snap.gas.has_field("temp"));
        assert!(snap.gas.has_field("rho"));
        assert!(snap.gas.has_field("hsml"));
        // No boxsize on a collision snapshot.
        assert!(snap.properties.boxsize.is_none());
        // Code time 1.0 -> 0.978 Gyr.
        assert!((snap.properties.time - 0.978).abs() < 0.01);
    }

    #[test]
    fn temperature_from_internal_energy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap_u");
        write_gadget(&path, &sample_particles()).unwrap();
        let snap = read_gadget(&path, constants::MU).unwrap();
        let temp = snap.family(Family::Gas).field("temp").unwrap();
        // T = (2/3) mu m_p u / k_B with u = 100 (km/s)^2 = 1e12 erg/g.
        let expect = (2.0 / 3.0) * constants::MU * constants::M_P * 1.0e12 / constants::K_B;
        assert!(
            (temp[0] - expect).abs() / expect < 1e-5,
            "T = {}, expected {expect}",
            temp[0]
        );
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(read_gadget(&path, constants::MU).is_err());
    }
}
