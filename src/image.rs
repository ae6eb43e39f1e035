//! The image engine: per-family SPH rasterization, elementwise summing,
//! color normalization and PNG figure output.

use crate::colormap::Colormap;
use crate::registry::Quantity;
use cluster_common::{config, ClusterError};
use log::{debug, error};
use plotters::prelude::*;
use sph_kit::snapshot::{Family, Snapshot};
use sph_kit::render::{RasterGrid, Rasterizer};
use sph_kit::units::Unit;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Contour overlay of a second quantity on top of the colormap image.
#[derive(Debug, Clone)]
pub struct ContourOptions {
    pub quantity: Quantity,
    /// Number of contour levels.
    pub levels: usize,
    /// Gaussian pre-smoothing width in pixels, if any.
    pub smooth: Option<f64>,
}

/// Recognized options of one plot operation. Unknown CLI input is rejected
/// before this record is built.
#[derive(Debug, Clone)]
pub struct PlotOptions {
    /// Physical side length of the imaged region (kpc).
    pub width: f64,
    pub resolution: usize,
    /// Display unit; defaults to the registry's choice.
    pub units: Option<Unit>,
    pub vmin: Option<f64>,
    pub vmax: Option<f64>,
    /// Log color scale; defaults to the registry's choice.
    pub log: Option<bool>,
    pub colormap: Option<Colormap>,
    /// Families to render and sum; defaults to eligible-and-present.
    pub families: Option<Vec<Family>>,
    /// Line-of-sight average instead of a thin slice.
    pub av_z: bool,
    pub contours: Option<ContourOptions>,
}

impl Default for PlotOptions {
    fn default() -> Self {
        PlotOptions {
            width: 2000.0,
            resolution: 512,
            units: None,
            vmin: None,
            vmax: None,
            log: None,
            colormap: None,
            families: None,
            av_z: false,
            contours: None,
        }
    }
}

/// A rasterized quantity with units and extent metadata. The extent is
/// always `[-width/2, width/2]^2` centered on the view origin.
#[derive(Debug, Clone)]
pub struct ImageProduct {
    pub data: Vec<f64>,
    pub resolution: usize,
    pub width: f64,
    pub unit: Unit,
    pub quantity: Quantity,
    pub families: Vec<Family>,
    /// Snapshot time in Gyr.
    pub time: f64,
}

/// Resolved color normalization of one figure.
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    pub log: bool,
    pub vmin: f64,
    pub vmax: f64,
}

impl Normalization {
    /// Maps a sample to [0, 1].
    pub fn apply(&self, v: f64) -> f64 {
        if self.log {
            if v <= 0.0 {
                return 0.0;
            }
            let t = (v.log10() - self.vmin.log10()) / (self.vmax.log10() - self.vmin.log10());
            t.clamp(0.0, 1.0)
        } else {
            let t = (v - self.vmin) / (self.vmax - self.vmin);
            t.clamp(0.0, 1.0)
        }
    }
}

/// Chooses vmin/vmax for the data. On a log scale, a missing or
/// non-positive lower bound is clamped to the smallest strictly-positive
/// sample.
pub fn resolve_norm(
    data: &[f64],
    log: bool,
    vmin: Option<f64>,
    vmax: Option<f64>,
) -> Result<Normalization, ClusterError> {
    let data_max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let vmax = vmax.unwrap_or(data_max);
    let vmin = if log {
        let smallest_positive = data
            .iter()
            .cloned()
            .filter(|&v| v > 0.0)
            .fold(f64::INFINITY, f64::min);
        if !smallest_positive.is_finite() {
            return Err(ClusterError::PipelinePlot(
                "log scale requested but no sample is positive".into(),
            ));
        }
        match vmin {
            Some(v) if v > 0.0 => v,
            _ => smallest_positive,
        }
    } else {
        vmin.unwrap_or_else(|| data.iter().cloned().fold(f64::INFINITY, f64::min))
    };
    if !(vmax > vmin) {
        return Err(ClusterError::PipelinePlot(format!(
            "degenerate color range [{vmin}, {vmax}]"
        )));
    }
    Ok(Normalization { log, vmin, vmax })
}

/// Resolves the family list: explicit request (validated against the
/// registry) or every eligible family present in the snapshot.
fn resolve_families(
    snap: &Snapshot,
    qty: Quantity,
    requested: &Option<Vec<Family>>,
) -> Result<Vec<Family>, ClusterError> {
    let eligible = qty.info().families;
    let families: Vec<Family> = match requested {
        Some(list) => {
            for f in list {
                if !eligible.contains(f) {
                    return Err(ClusterError::Snapshot(format!(
                        "quantity '{}' is not defined for family '{f}'",
                        qty.tag()
                    )));
                }
                if snap.family(*f).is_empty() {
                    return Err(ClusterError::Snapshot(format!(
                        "snapshot holds no '{f}' particles"
                    )));
                }
            }
            list.clone()
        }
        None => eligible
            .iter()
            .copied()
            .filter(|f| !snap.family(*f).is_empty())
            .collect(),
    };
    if families.is_empty() {
        return Err(ClusterError::Snapshot(format!(
            "no family in this snapshot can render '{}'",
            qty.tag()
        )));
    }
    Ok(families)
}

/// Rasterizes `qty` for each requested family and sums the arrays.
///
/// A family that fails to rasterize is logged and skipped; the operation
/// fails only when every family fails. The output passes through the
/// unit-fix pass, including the temperature-to-energy coercion.
pub fn generate_image_array(
    snap: &mut Snapshot,
    qty: Quantity,
    opts: &PlotOptions,
) -> Result<ImageProduct, ClusterError> {
    let families = resolve_families(snap, qty, &opts.families)?;
    qty.ensure(snap)?;

    let grid = RasterGrid {
        width: opts.width,
        resolution: opts.resolution,
        integrate: opts.av_z,
    };
    let raster = Rasterizer::new();

    let mut sum: Option<Vec<f64>> = None;
    let mut rendered = Vec::new();
    for family in &families {
        let result = rasterize_family(snap, qty, *family, &raster, &grid);
        match result {
            Ok(img) => {
                match sum.as_mut() {
                    Some(acc) => {
                        for (a, b) in acc.iter_mut().zip(img.iter()) {
                            *a += *b;
                        }
                    }
                    None => sum = Some(img),
                }
                rendered.push(*family);
            }
            Err(e) => {
                error!("rasterizing {} for family '{family}' failed: {e}", qty.tag());
            }
        }
    }
    let mut data = sum.ok_or_else(|| {
        ClusterError::PipelinePlot(format!(
            "every family failed to rasterize '{}'",
            qty.tag()
        ))
    })?;

    let target = opts.units.unwrap_or(qty.info().default_unit);
    let unit = qty.fix_units(&mut data, target)?;
    debug!(
        "image array for '{}': {} families, unit {unit}",
        qty.tag(),
        rendered.len()
    );
    Ok(ImageProduct {
        data,
        resolution: opts.resolution,
        width: opts.width,
        unit,
        quantity: qty,
        families: rendered,
        time: snap.properties.time,
    })
}

/// One family's raster: SPH interpolation for gas, mass deposit for the
/// collisionless families (which only render density).
fn rasterize_family(
    snap: &Snapshot,
    qty: Quantity,
    family: Family,
    raster: &Rasterizer,
    grid: &RasterGrid,
) -> Result<Vec<f64>, ClusterError> {
    let fam = snap.family(family);
    if family == Family::Gas {
        let values = qty.values(snap, family)?;
        let img = raster
            .field_image(fam, &values, grid)
            .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;
        Ok(img.data)
    } else if qty == Quantity::Rho {
        let img = raster
            .density_image(fam, grid)
            .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;
        Ok(img.data)
    } else {
        Err(ClusterError::PipelinePlot(format!(
            "family '{family}' can only be rasterized as density"
        )))
    }
}

/// Separable Gaussian smoothing of a square array, sigma in pixels.
pub fn gaussian_smooth(data: &[f64], resolution: usize, sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 {
        return data.to_vec();
    }
    let half = (3.0 * sigma).ceil() as i64;
    let kernel: Vec<f64> = (-half..=half)
        .map(|i| (-(i as f64).powi(2) / (2.0 * sigma * sigma)).exp())
        .collect();
    let ksum: f64 = kernel.iter().sum();
    let res = resolution as i64;

    let mut tmp = vec![0.0f64; data.len()];
    for y in 0..res {
        for x in 0..res {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let xi = (x + k as i64 - half).clamp(0, res - 1);
                acc += w * data[(y * res + xi) as usize];
            }
            tmp[(y * res + x) as usize] = acc / ksum;
        }
    }
    let mut out = vec![0.0f64; data.len()];
    for y in 0..res {
        for x in 0..res {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let yi = (y + k as i64 - half).clamp(0, res - 1);
                acc += w * tmp[(yi * res + x) as usize];
            }
            out[(y * res + x) as usize] = acc / ksum;
        }
    }
    out
}

/// Marching-squares contour extraction at one level. Returns physical
/// (x, y) line segments over the image extent.
pub fn contour_segments(
    data: &[f64],
    resolution: usize,
    width: f64,
    level: f64,
) -> Vec<((f64, f64), (f64, f64))> {
    let res = resolution;
    let px = width / res as f64;
    let coord = |i: usize| -width / 2.0 + (i as f64 + 0.5) * px;
    let mut segments = Vec::new();

    // Interpolated crossing point between two samples along one cell edge.
    let lerp = |a: f64, b: f64| {
        if (b - a).abs() < 1e-300 {
            0.5
        } else {
            ((level - a) / (b - a)).clamp(0.0, 1.0)
        }
    };

    for y in 0..res - 1 {
        for x in 0..res - 1 {
            let v00 = data[y * res + x];
            let v10 = data[y * res + x + 1];
            let v01 = data[(y + 1) * res + x];
            let v11 = data[(y + 1) * res + x + 1];
            let mut case = 0u8;
            if v00 >= level {
                case |= 1;
            }
            if v10 >= level {
                case |= 2;
            }
            if v11 >= level {
                case |= 4;
            }
            if v01 >= level {
                case |= 8;
            }
            if case == 0 || case == 15 {
                continue;
            }
            // Edge crossing points: bottom, right, top, left.
            let bottom = (coord(x) + lerp(v00, v10) * px, coord(y));
            let right = (coord(x + 1), coord(y) + lerp(v10, v11) * px);
            let top = (coord(x) + lerp(v01, v11) * px, coord(y + 1));
            let left = (coord(x), coord(y) + lerp(v00, v01) * px);
            let mut push = |a: (f64, f64), b: (f64, f64)| segments.push((a, b));
            match case {
                1 | 14 => push(left, bottom),
                2 | 13 => push(bottom, right),
                3 | 12 => push(left, right),
                4 | 11 => push(right, top),
                6 | 9 => push(bottom, top),
                7 | 8 => push(left, top),
                5 => {
                    push(left, bottom);
                    push(right, top);
                }
                10 => {
                    push(bottom, right);
                    push(left, top);
                }
                _ => {}
            }
        }
    }
    segments
}

/// Builds the colormap figure for one quantity and writes it as a PNG.
pub fn make_plot(
    snap: &mut Snapshot,
    qty: Quantity,
    opts: &PlotOptions,
    out: &Path,
) -> Result<PathBuf, ClusterError> {
    let product = generate_image_array(snap, qty, opts)?;
    let log = opts.log.unwrap_or(qty.info().log_default);
    let norm = resolve_norm(&product.data, log, opts.vmin, opts.vmax)?;
    let cmap = opts.colormap.unwrap_or(qty.info().colormap);

    // Optional contour overlay of a second quantity on the same grid.
    let contour_lines = match &opts.contours {
        Some(c) => {
            let mut overlay_opts = opts.clone();
            overlay_opts.contours = None;
            overlay_opts.units = None;
            overlay_opts.families = None;
            let overlay = generate_image_array(snap, c.quantity, &overlay_opts)?;
            let field = match c.smooth {
                Some(sigma) => gaussian_smooth(&overlay.data, overlay.resolution, sigma),
                None => overlay.data,
            };
            let onorm = resolve_norm(&field, true, None, None)?;
            let mut lines = Vec::new();
            for i in 1..=c.levels {
                let t = i as f64 / (c.levels + 1) as f64;
                let level = if onorm.log {
                    10f64.powf(onorm.vmin.log10() + t * (onorm.vmax.log10() - onorm.vmin.log10()))
                } else {
                    onorm.vmin + t * (onorm.vmax - onorm.vmin)
                };
                lines.extend(contour_segments(&field, opts.resolution, opts.width, level));
            }
            lines
        }
        None => Vec::new(),
    };

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ClusterError::PipelinePlot(format!("cannot create {}: {e}", parent.display())))?;
    }

    let canvas = 900u32;
    let root = BitMapBackend::new(out, (canvas, canvas)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;

    let time_unit = &config().units.time;
    let time_value = sph_kit::convert(product.time, Unit::Gyr, Unit::from_str(time_unit).unwrap_or(Unit::Gyr))
        .unwrap_or(product.time);
    let length_unit = &config().units.length;
    let caption = format!(
        "{} [{}]   t = {:.2} {}",
        product.quantity.info().label,
        product.unit,
        time_value,
        time_unit
    );

    let half = product.width / 2.0;
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-half..half, -half..half)
        .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(format!("x / {length_unit}"))
        .y_desc(format!("y / {length_unit}"))
        .draw()
        .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;

    let res = product.resolution;
    let px = product.width / res as f64;
    chart
        .draw_series((0..res * res).map(|idx| {
            let ix = idx % res;
            let iy = idx / res;
            let t = norm.apply(product.data[idx]) as f32;
            let [r, g, b] = cmap.eval_u8(t);
            let x0 = -half + ix as f64 * px;
            let y0 = -half + iy as f64 * px;
            Rectangle::new(
                [(x0, y0), (x0 + px, y0 + px)],
                RGBColor(r, g, b).filled(),
            )
        }))
        .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;

    if !contour_lines.is_empty() {
        chart
            .draw_series(
                contour_lines
                    .iter()
                    .map(|&(a, b)| PathElement::new(vec![a, b], WHITE.stroke_width(1))),
            )
            .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;
    }

    root.present()
        .map_err(|e| ClusterError::PipelinePlot(e.to_string()))?;
    Ok(out.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::tests::synthetic_gas_snapshot;

    #[test]
    fn log_norm_clamps_to_smallest_positive() {
        let data = [0.0, -1.0, 4.0, 0.25, 16.0];
        let norm = resolve_norm(&data, true, None, None).unwrap();
        assert!((norm.vmin - 0.25).abs() < 1e-12);
        assert!((norm.vmax - 16.0).abs() < 1e-12);
        // Non-positive samples land at the bottom of the scale.
        assert_eq!(norm.apply(-1.0), 0.0);
        assert!((norm.apply(16.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn log_norm_ignores_nonpositive_explicit_vmin() {
        let data = [0.5, 2.0];
        let norm = resolve_norm(&data, true, Some(-3.0), None).unwrap();
        assert!((norm.vmin - 0.5).abs() < 1e-12);
    }

    #[test]
    fn all_negative_log_scale_fails() {
        let data = [-1.0, -2.0];
        assert!(resolve_norm(&data, true, None, None).is_err());
    }

    #[test]
    fn image_array_sums_requested_families() {
        let mut snap = synthetic_gas_snapshot();
        // Add a dm particle at the origin so rho has two contributors.
        snap.dm.pos.push([0.0, 0.0, 0.0]);
        snap.dm.vel.push([0.0; 3]);
        snap.dm.mass.push(1.0e10);

        let opts = PlotOptions {
            width: 20.0,
            resolution: 32,
            av_z: true,
            ..Default::default()
        };
        let gas_only = generate_image_array(
            &mut snap,
            Quantity::Rho,
            &PlotOptions {
                families: Some(vec![Family::Gas]),
                ..opts.clone()
            },
        )
        .unwrap();
        let both = generate_image_array(&mut snap, Quantity::Rho, &opts).unwrap();
        let sum_gas: f64 = gas_only.data.iter().sum();
        let sum_both: f64 = both.data.iter().sum();
        assert!(sum_both > sum_gas, "dm contribution missing");
        assert_eq!(both.families.len(), 2);
    }

    #[test]
    fn requesting_absent_family_is_snapshot_error() {
        let mut snap = synthetic_gas_snapshot();
        let opts = PlotOptions {
            width: 20.0,
            resolution: 16,
            families: Some(vec![Family::Stars]),
            ..Default::default()
        };
        let err = generate_image_array(&mut snap, Quantity::Rho, &opts).unwrap_err();
        assert!(matches!(err, ClusterError::Snapshot(_)));
    }

    #[test]
    fn temperature_image_honors_the_kev_quirk() {
        let mut snap = synthetic_gas_snapshot();
        let opts = PlotOptions {
            width: 10.0,
            resolution: 16,
            units: Some(Unit::Kev),
            av_z: false,
            ..Default::default()
        };
        let img = generate_image_array(&mut snap, Quantity::Temp, &opts).unwrap();
        assert_eq!(img.unit, Unit::Kev);
        // Gas is at 1e7 K ~ 0.86 keV; interpolated samples stay well under
        // the kelvin magnitude.
        let max = img.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(max < 10.0, "max sample {max} looks like kelvin");
    }

    #[test]
    fn gaussian_smooth_preserves_total() {
        let res = 16;
        let mut data = vec![0.0; res * res];
        data[8 * res + 8] = 100.0;
        let smooth = gaussian_smooth(&data, res, 1.5);
        let total: f64 = smooth.iter().sum();
        assert!((total - 100.0).abs() < 1.0, "total = {total}");
        assert!(smooth[8 * res + 8] < 100.0);
    }

    #[test]
    fn contours_ring_a_peak() {
        // A radial bump crossed at half height yields a closed-ish ring:
        // every segment endpoint sits near the level circle.
        let res = 64;
        let width = 2.0;
        let mut data = vec![0.0; res * res];
        for y in 0..res {
            for x in 0..res {
                let fx = -1.0 + (x as f64 + 0.5) * width / res as f64;
                let fy = -1.0 + (y as f64 + 0.5) * width / res as f64;
                data[y * res + x] = (-4.0 * (fx * fx + fy * fy)).exp();
            }
        }
        let level = 0.5;
        let segs = contour_segments(&data, res, width, level);
        assert!(!segs.is_empty());
        let r_expect = (0.5f64.ln() / -4.0).sqrt();
        for (a, b) in &segs {
            for p in [a, b] {
                let r = (p.0 * p.0 + p.1 * p.1).sqrt();
                assert!((r - r_expect).abs() < 0.1, "point at r = {r}");
            }
        }
    }
}
