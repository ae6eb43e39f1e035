//! The two-channel gas/dark-matter composite image: dark-matter mass
//! density and gas X-ray emissivity, each log-normalized, colorized with a
//! synthesized 0 -> color ramp and alpha-merged into one 8-bit frame.

use crate::colormap::BinaryColormap;
use crate::image::{generate_image_array, resolve_norm, PlotOptions};
use crate::registry::Quantity;
use cluster_common::ClusterError;
use image::{Rgba, RgbaImage};
use sph_kit::snapshot::{Family, Snapshot};
use std::path::{Path, PathBuf};

/// Width of one colorbar strip in pixels.
const BAR_WIDTH: u32 = 28;
/// Gap between the image and the colorbars.
const BAR_GAP: u32 = 12;

/// Alpha-merges per-channel ramp colors: for channels i with normalized
/// intensity a_i, the output pixel is ((sum_i cmap_i(a_i) * a_i) / 2) * 255
/// per component, cast to u8. Intensities outside [0, 1] are clamped, so
/// the result is always a valid 8-bit value.
pub fn alpha_merge(channels: &[(BinaryColormap, f32)]) -> [u8; 3] {
    let mut acc = [0.0f32; 3];
    for (cmap, alpha) in channels {
        let a = alpha.clamp(0.0, 1.0);
        let c = cmap.eval(a);
        acc[0] += c.red * a;
        acc[1] += c.green * a;
        acc[2] += c.blue * a;
    }
    [
        ((acc[0] / 2.0).clamp(0.0, 1.0) * 255.0) as u8,
        ((acc[1] / 2.0).clamp(0.0, 1.0) * 255.0) as u8,
        ((acc[2] / 2.0).clamp(0.0, 1.0) * 255.0) as u8,
    ]
}

/// Renders the composite and writes it as a PNG. `colors` picks the base
/// color of the dark-matter and gas channels, in that order.
pub fn make_gas_dm_image(
    snap: &mut Snapshot,
    opts: &PlotOptions,
    colors: [BinaryColormap; 2],
    out: &Path,
) -> Result<PathBuf, ClusterError> {
    if snap.dm.is_empty() || snap.gas.is_empty() {
        return Err(ClusterError::Snapshot(
            "the composite needs both dark matter and gas particles".into(),
        ));
    }

    let mut dm_opts = opts.clone();
    dm_opts.families = Some(vec![Family::DarkMatter]);
    dm_opts.units = None;
    let dm = generate_image_array(snap, Quantity::Rho, &dm_opts)?;

    let mut gas_opts = opts.clone();
    gas_opts.families = Some(vec![Family::Gas]);
    gas_opts.units = None;
    let gas = generate_image_array(snap, Quantity::Xray, &gas_opts)?;

    let dm_norm = resolve_norm(&dm.data, true, opts.vmin, opts.vmax)?;
    let gas_norm = resolve_norm(&gas.data, true, None, None)?;

    let res = opts.resolution as u32;
    let total_w = res + 2 * (BAR_GAP + BAR_WIDTH);
    let mut img = RgbaImage::from_pixel(total_w, res, Rgba([0, 0, 0, 255]));

    for iy in 0..res {
        for ix in 0..res {
            let idx = (iy * res + ix) as usize;
            let a_dm = dm_norm.apply(dm.data[idx]) as f32;
            let a_gas = gas_norm.apply(gas.data[idx]) as f32;
            let [r, g, b] = alpha_merge(&[(colors[0], a_dm), (colors[1], a_gas)]);
            // Row 0 of the raster is the bottom of the frame.
            img.put_pixel(ix, res - 1 - iy, Rgba([r, g, b, 255]));
        }
    }

    // Two colorbars side by side: the pure ramp of each channel, bottom to
    // top, at the right edge of the frame.
    for (slot, cmap) in colors.iter().enumerate() {
        let x0 = res + BAR_GAP + slot as u32 * (BAR_WIDTH + BAR_GAP);
        for iy in 0..res {
            let t = 1.0 - iy as f32 / (res - 1) as f32;
            let c = cmap.eval(t);
            let pixel = Rgba([
                (c.red * t * 255.0) as u8,
                (c.green * t * 255.0) as u8,
                (c.blue * t * 255.0) as u8,
                255,
            ]);
            for x in x0..x0 + BAR_WIDTH {
                img.put_pixel(x, iy, pixel);
            }
        }
    }

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ClusterError::PipelinePlot(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    img.save(out)
        .map_err(|e| ClusterError::PipelinePlot(format!("cannot write {}: {e}", out.display())))?;
    Ok(out.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::tests::synthetic_gas_snapshot;

    #[test]
    fn merged_values_span_the_u8_range_only() {
        let red = BinaryColormap::named("red").unwrap();
        let blue = BinaryColormap::named("blue").unwrap();
        // Sweep intensities well outside [0, 1]; the merge must stay u8.
        for i in -5..=15 {
            let a = i as f32 / 5.0;
            let px = alpha_merge(&[(red, a), (blue, 1.0 - a)]);
            // A [u8; 3] can't escape 0..=255 by construction; check the
            // clamp keeps saturated channels at the ceiling rather than
            // wrapping.
            if a >= 1.0 {
                assert!(px[0] >= 127, "red channel collapsed at a = {a}");
            }
        }
    }

    #[test]
    fn zero_intensity_is_black() {
        let red = BinaryColormap::named("red").unwrap();
        let px = alpha_merge(&[(red, 0.0)]);
        assert_eq!(px, [0, 0, 0]);
    }

    #[test]
    fn merge_is_half_the_channel_sum() {
        // One channel at full intensity with a pure-red base: the red
        // component is 1.0 * 1.0 / 2 = 0.5 of full scale.
        let pure_red = BinaryColormap::new(palette::Srgb::new(1.0, 0.0, 0.0));
        let px = alpha_merge(&[(pure_red, 1.0)]);
        assert_eq!(px[0], 127);
        assert_eq!(px[1], 0);
    }

    #[test]
    fn composite_writes_a_png() {
        let mut snap = synthetic_gas_snapshot();
        snap.dm.pos.push([1.0, 1.0, 0.0]);
        snap.dm.vel.push([0.0; 3]);
        snap.dm.mass.push(5.0e9);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("composite.png");
        let opts = PlotOptions {
            width: 20.0,
            resolution: 32,
            av_z: true,
            ..Default::default()
        };
        let colors = [
            BinaryColormap::named("blue").unwrap(),
            BinaryColormap::named("red").unwrap(),
        ];
        make_gas_dm_image(&mut snap, &opts, colors, &out).unwrap();
        let written = image::open(&out).unwrap().to_rgba8();
        assert_eq!(written.height(), 32);
        assert!(written.width() > 32);
    }
}
