//! The profile engine: radial binning of snapshot quantities and the
//! profile figures.

use crate::registry::Quantity;
use cluster_common::{config, ClusterError};
use log::debug;
use plotters::prelude::*;
use sph_kit::binning::{bin_edges, density_profile, weighted_profile, BinSpacing};
use sph_kit::snapshot::{Family, Snapshot};
use sph_kit::units::Unit;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Options of one profile extraction.
#[derive(Debug, Clone)]
pub struct ProfileOptions {
    /// 2 for cylindrical radii in the view plane, 3 for spherical.
    pub ndim: usize,
    pub nbins: usize,
    pub spacing: BinSpacing,
    pub rmin: Option<f64>,
    pub rmax: Option<f64>,
    /// Restrict to one family; default is every eligible family merged.
    pub family: Option<Family>,
    /// Display unit; defaults to the registry's choice.
    pub units: Option<Unit>,
    /// Log-scaled value axis on the figure.
    pub log: Option<bool>,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        ProfileOptions {
            ndim: 3,
            nbins: 64,
            spacing: BinSpacing::Log,
            rmin: None,
            rmax: None,
            family: None,
            units: None,
            log: None,
        }
    }
}

/// A binned radial curve with units and the snapshot time it came from.
#[derive(Debug, Clone)]
pub struct ProfileProduct {
    /// Bin centers, kpc.
    pub r: Vec<f64>,
    pub values: Vec<f64>,
    pub unit: Unit,
    pub quantity: Quantity,
    /// Snapshot time in Gyr.
    pub time: f64,
    pub label: String,
}

fn radii(fam_pos: &[[f64; 3]], ndim: usize) -> Result<Vec<f64>, ClusterError> {
    match ndim {
        2 => Ok(fam_pos
            .iter()
            .map(|p| (p[0] * p[0] + p[1] * p[1]).sqrt())
            .collect()),
        3 => Ok(fam_pos
            .iter()
            .map(|p| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt())
            .collect()),
        other => Err(ClusterError::Snapshot(format!(
            "profile ndim must be 2 or 3, got {other}"
        ))),
    }
}

/// Families a profile of `qty` runs over: the explicit request, validated,
/// or all eligible families with particles.
fn profile_families(
    snap: &Snapshot,
    qty: Quantity,
    requested: Option<Family>,
) -> Result<Vec<Family>, ClusterError> {
    match requested {
        Some(f) => {
            if !qty.info().families.contains(&f) {
                return Err(ClusterError::Snapshot(format!(
                    "quantity '{}' is not defined for family '{f}'",
                    qty.tag()
                )));
            }
            if snap.family(f).is_empty() {
                return Err(ClusterError::Snapshot(format!(
                    "snapshot holds no '{f}' particles"
                )));
            }
            Ok(vec![f])
        }
        None => {
            let present: Vec<Family> = qty
                .info()
                .families
                .iter()
                .copied()
                .filter(|f| !snap.family(*f).is_empty())
                .collect();
            if present.is_empty() {
                return Err(ClusterError::Snapshot(format!(
                    "no family in this snapshot can profile '{}'",
                    qty.tag()
                )));
            }
            Ok(present)
        }
    }
}

/// Extracts the radial profile of one quantity.
///
/// Density profiles divide binned mass by the shell measure; every other
/// quantity is the mass-weighted mean per bin. Units pass through the same
/// fix-up as images, including the temperature coercion.
pub fn make_profile(
    snap: &mut Snapshot,
    qty: Quantity,
    opts: &ProfileOptions,
) -> Result<ProfileProduct, ClusterError> {
    let families = profile_families(snap, qty, opts.family)?;
    qty.ensure(snap)?;

    // Merge the particle sets of the selected families.
    let mut r_all = Vec::new();
    let mut m_all = Vec::new();
    let mut v_all = Vec::new();
    for family in &families {
        let fam = snap.family(*family);
        r_all.extend(radii(&fam.pos, opts.ndim)?);
        m_all.extend_from_slice(&fam.mass);
        if qty != Quantity::Rho {
            v_all.extend(qty.values(snap, *family)?);
        }
    }

    let edges = bin_edges(&r_all, opts.nbins, opts.spacing, opts.rmin, opts.rmax)
        .map_err(|e| ClusterError::Snapshot(e.to_string()))?;

    let (centers, mut values) = if qty == Quantity::Rho {
        let prof = density_profile(&r_all, &m_all, &edges, opts.spacing, opts.ndim)
            .map_err(|e| ClusterError::Snapshot(e.to_string()))?;
        // Binned mass per kpc^3 (or kpc^2); bring it to the storage unit.
        let to_cgs = Unit::MsolPerKpc3.to_cgs();
        let values: Vec<f64> = prof.values.iter().map(|&v| v * to_cgs).collect();
        (prof.centers, values)
    } else {
        let prof = weighted_profile(&r_all, &m_all, &v_all, &edges, opts.spacing);
        (prof.centers, prof.values)
    };

    let target = opts.units.unwrap_or(qty.info().default_unit);
    let unit = qty.fix_units(&mut values, target)?;
    debug!(
        "profile of '{}' over {} families, {} bins",
        qty.tag(),
        families.len(),
        centers.len()
    );
    Ok(ProfileProduct {
        r: centers,
        values,
        unit,
        quantity: qty,
        time: snap.properties.time,
        label: qty.info().label.to_string(),
    })
}

/// An overlay curve: evaluated at the profile radii (configured length
/// unit in, profile unit out) and drawn alongside the data.
pub type ReferenceFn<'a> = &'a dyn Fn(f64) -> f64;

/// Plots one profile; a thin wrapper over [`make_profiles_plot`].
pub fn make_profile_plot(
    products: &[ProfileProduct],
    reference: Option<(&str, ReferenceFn)>,
    log_scale: bool,
    out: &Path,
) -> Result<PathBuf, ClusterError> {
    make_profiles_plot(products, reference, log_scale, out)
}

/// Plots one or more profiles on a shared axis. Every product must carry
/// the same unit; mixing units on one axis is a precondition violation.
pub fn make_profiles_plot(
    products: &[ProfileProduct],
    reference: Option<(&str, ReferenceFn)>,
    log_scale: bool,
    out: &Path,
) -> Result<PathBuf, ClusterError> {
    let first = products.first().ok_or_else(|| {
        ClusterError::PipelinePlot("no profiles to plot".into())
    })?;
    if products.iter().any(|p| p.unit != first.unit) {
        return Err(ClusterError::PipelinePlot(
            "all quantities on one profile axis must share a unit".into(),
        ));
    }
    debug!(
        "plotting {} curve(s) against '{}'",
        products.len(),
        first.quantity.tag()
    );

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ClusterError::PipelinePlot(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    let length_unit = &config().units.length;
    let time_unit_str = &config().units.time;
    let time_unit = Unit::from_str(time_unit_str).unwrap_or(Unit::Gyr);
    let time_value = sph_kit::convert(first.time, Unit::Gyr, time_unit).unwrap_or(first.time);

    let r_min = products
        .iter()
        .flat_map(|p| p.r.iter().cloned())
        .fold(f64::INFINITY, f64::min);
    let r_max = products
        .iter()
        .flat_map(|p| p.r.iter().cloned())
        .fold(f64::NEG_INFINITY, f64::max);
    let mut v_min = f64::INFINITY;
    let mut v_max = f64::NEG_INFINITY;
    for p in products {
        for &v in &p.values {
            if log_scale && v <= 0.0 {
                continue;
            }
            v_min = v_min.min(v);
            v_max = v_max.max(v);
        }
    }
    if !(v_max > v_min) {
        return Err(ClusterError::PipelinePlot(
            "profile values span a degenerate range".into(),
        ));
    }

    let root = BitMapBackend::new(out, (900, 640)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;
    let caption = format!(
        "{} [{}]   t = {:.2} {}",
        first.label, first.unit, time_value, time_unit_str
    );

    // Log axes are emulated by plotting log10 coordinates; the data values
    // themselves stay untouched.
    let map_v = |v: f64| if log_scale { v.max(v_min).log10() } else { v };
    let y_lo = map_v(v_min);
    let y_hi = map_v(v_max);

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(r_min..r_max, y_lo..y_hi)
        .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;
    chart
        .configure_mesh()
        .x_desc(format!("r / {length_unit}"))
        .y_desc(if log_scale {
            format!("log10 {} [{}]", first.label, first.unit)
        } else {
            format!("{} [{}]", first.label, first.unit)
        })
        .draw()
        .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;

    let palette_colors = [BLUE, RED, GREEN, MAGENTA, CYAN, BLACK];
    for (i, p) in products.iter().enumerate() {
        let color = palette_colors[i % palette_colors.len()];
        chart
            .draw_series(LineSeries::new(
                p.r.iter()
                    .zip(p.values.iter())
                    .filter(|(_, &v)| !log_scale || v > 0.0)
                    .map(|(&r, &v)| (r, map_v(v))),
                color.stroke_width(2),
            ))
            .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?
            .label(p.label.clone())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2))
            });
    }

    if let Some((label, f)) = reference {
        chart
            .draw_series(LineSeries::new(
                first
                    .r
                    .iter()
                    .map(|&r| (r, map_v(f(r))))
                    .filter(|(_, y)| y.is_finite()),
                BLACK.stroke_width(1),
            ))
            .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?
            .label(label.to_string())
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], BLACK));
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()
        .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;
    root.present()
        .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;
    Ok(out.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::tests::synthetic_gas_snapshot;
    use sph_kit::constants;
    use sph_kit::snapshot::{SnapLayout, SnapProperties};

    /// A uniform-density gas ball sampled on a spherical shell lattice.
    fn uniform_ball(rho_msol_kpc3: f64, rmax: f64) -> Snapshot {
        let mut snap = Snapshot::new(
            SnapLayout::Gadget,
            SnapProperties {
                boxsize: None,
                time: 1.0,
            },
        );
        let n_shells = 40;
        let per_shell = 48;
        for i in 0..n_shells {
            let r0 = rmax * i as f64 / n_shells as f64;
            let r1 = rmax * (i + 1) as f64 / n_shells as f64;
            let r = 0.5 * (r0 + r1);
            let shell_vol = 4.0 / 3.0 * std::f64::consts::PI * (r1.powi(3) - r0.powi(3));
            let m = rho_msol_kpc3 * shell_vol / per_shell as f64;
            for j in 0..per_shell {
                // Fibonacci-ish shell coverage.
                let phi = 2.0 * std::f64::consts::PI * j as f64 / per_shell as f64;
                let cos_t = 1.0 - 2.0 * (j as f64 + 0.5) / per_shell as f64;
                let sin_t = (1.0 - cos_t * cos_t).sqrt();
                snap.gas
                    .pos
                    .push([r * sin_t * phi.cos(), r * sin_t * phi.sin(), r * cos_t]);
                snap.gas.vel.push([0.0; 3]);
                snap.gas.mass.push(m);
            }
        }
        let n = snap.gas.len();
        snap.gas.set_field("temp", vec![1.0e7; n]).unwrap();
        let rho_cgs = rho_msol_kpc3 * Unit::MsolPerKpc3.to_cgs();
        snap.gas.set_field("rho", vec![rho_cgs; n]).unwrap();
        snap.gas.set_field("hsml", vec![rmax / 20.0; n]).unwrap();
        snap
    }

    #[test]
    fn density_profile_of_uniform_ball_is_flat() {
        let rho = 1.0e6; // Msol / kpc^3
        let mut snap = uniform_ball(rho, 100.0);
        let opts = ProfileOptions {
            nbins: 8,
            spacing: BinSpacing::Lin,
            rmin: Some(10.0),
            rmax: Some(90.0),
            ..Default::default()
        };
        let prof = make_profile(&mut snap, Quantity::Rho, &opts).unwrap();
        let expect = rho * Unit::MsolPerKpc3.to_cgs();
        for (&r, &v) in prof.r.iter().zip(prof.values.iter()) {
            assert!(
                (v - expect).abs() / expect < 0.15,
                "rho({r}) = {v:e}, expected {expect:e}"
            );
        }
    }

    #[test]
    fn temperature_profile_in_kev() {
        let mut snap = uniform_ball(1.0e6, 50.0);
        let opts = ProfileOptions {
            nbins: 6,
            spacing: BinSpacing::Lin,
            units: Some(Unit::Kev),
            ..Default::default()
        };
        let prof = make_profile(&mut snap, Quantity::Temp, &opts).unwrap();
        assert_eq!(prof.unit, Unit::Kev);
        let expect = 1.0e7 * constants::K_B_KEV;
        for &v in prof.values.iter().filter(|&&v| v > 0.0) {
            assert!((v - expect).abs() / expect < 1e-9, "T = {v} keV");
        }
    }

    #[test]
    fn profile_carries_snapshot_time() {
        let mut snap = synthetic_gas_snapshot();
        let opts = ProfileOptions {
            nbins: 2,
            spacing: BinSpacing::Lin,
            ..Default::default()
        };
        let prof = make_profile(&mut snap, Quantity::Temp, &opts).unwrap();
        assert!((prof.time - 0.5).abs() < 1e-12);
    }

    #[test]
    fn two_dim_profile_uses_plane_radii() {
        let mut snap = synthetic_gas_snapshot();
        // Push all particles far out along z: 3-D radii large, 2-D small.
        for p in snap.gas.pos.iter_mut() {
            p[2] = 1000.0;
        }
        let opts2 = ProfileOptions {
            ndim: 2,
            nbins: 2,
            spacing: BinSpacing::Lin,
            ..Default::default()
        };
        let prof = make_profile(&mut snap, Quantity::Temp, &opts2).unwrap();
        assert!(prof.r.iter().all(|&r| r < 10.0));
    }

    #[test]
    fn mixed_units_on_one_axis_are_rejected() {
        let a = ProfileProduct {
            r: vec![1.0, 2.0],
            values: vec![1.0, 1.0],
            unit: Unit::Kev,
            quantity: Quantity::Temp,
            time: 0.0,
            label: "temperature".into(),
        };
        let mut b = a.clone();
        b.unit = Unit::KmPerS;
        b.quantity = Quantity::SoundSpeed;
        let dir = tempfile::tempdir().unwrap();
        let err = make_profiles_plot(&[a, b], None, false, &dir.path().join("p.png")).unwrap_err();
        assert!(matches!(err, ClusterError::PipelinePlot(_)));
    }
}
