//! Colormaps for rasterized figures.
//!
//! A small closed set of maps, each defined by linear interpolation over a
//! handful of sRGB anchors, plus the synthesized 0 -> color "binary" ramps
//! the gas/dm composite uses.

use cluster_common::ClusterError;
use palette::Srgb;
use std::str::FromStr;

/// The colormaps selectable from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    Viridis,
    Inferno,
    Hot,
    Jet,
    Gray,
}

/// sRGB anchor tables, evenly spaced over [0, 1].
const VIRIDIS: [(f32, f32, f32); 6] = [
    (0.267, 0.005, 0.329),
    (0.254, 0.265, 0.530),
    (0.164, 0.471, 0.558),
    (0.134, 0.658, 0.517),
    (0.477, 0.821, 0.318),
    (0.993, 0.906, 0.144),
];

const INFERNO: [(f32, f32, f32); 6] = [
    (0.001, 0.000, 0.014),
    (0.258, 0.039, 0.406),
    (0.576, 0.148, 0.404),
    (0.865, 0.316, 0.226),
    (0.988, 0.645, 0.040),
    (0.988, 0.998, 0.645),
];

const HOT: [(f32, f32, f32); 4] = [
    (0.0, 0.0, 0.0),
    (0.9, 0.0, 0.0),
    (1.0, 0.9, 0.0),
    (1.0, 1.0, 1.0),
];

const JET: [(f32, f32, f32); 5] = [
    (0.0, 0.0, 0.5),
    (0.0, 0.5, 1.0),
    (0.5, 1.0, 0.5),
    (1.0, 0.5, 0.0),
    (0.5, 0.0, 0.0),
];

fn lerp_anchors(anchors: &[(f32, f32, f32)], t: f32) -> Srgb<f32> {
    let t = t.clamp(0.0, 1.0);
    let span = (anchors.len() - 1) as f32;
    let x = t * span;
    let i = (x as usize).min(anchors.len() - 2);
    let frac = x - i as f32;
    let (r0, g0, b0) = anchors[i];
    let (r1, g1, b1) = anchors[i + 1];
    Srgb::new(
        r0 + (r1 - r0) * frac,
        g0 + (g1 - g0) * frac,
        b0 + (b1 - b0) * frac,
    )
}

impl Colormap {
    /// Samples the map at `t` in [0, 1].
    pub fn eval(self, t: f32) -> Srgb<f32> {
        match self {
            Colormap::Viridis => lerp_anchors(&VIRIDIS, t),
            Colormap::Inferno => lerp_anchors(&INFERNO, t),
            Colormap::Hot => lerp_anchors(&HOT, t),
            Colormap::Jet => lerp_anchors(&JET, t),
            Colormap::Gray => Srgb::new(t.clamp(0.0, 1.0), t.clamp(0.0, 1.0), t.clamp(0.0, 1.0)),
        }
    }

    /// Samples the map as 8-bit RGB.
    pub fn eval_u8(self, t: f32) -> [u8; 3] {
        let c = self.eval(t);
        [
            (c.red * 255.0).round() as u8,
            (c.green * 255.0).round() as u8,
            (c.blue * 255.0).round() as u8,
        ]
    }
}

impl FromStr for Colormap {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viridis" => Ok(Colormap::Viridis),
            "inferno" => Ok(Colormap::Inferno),
            "hot" => Ok(Colormap::Hot),
            "jet" => Ok(Colormap::Jet),
            "gray" | "grey" => Ok(Colormap::Gray),
            other => Err(ClusterError::PipelinePlot(format!(
                "unknown colormap '{other}'"
            ))),
        }
    }
}

/// A synthesized two-point ramp from black to a base color, used by the
/// gas/dm composite channels.
#[derive(Debug, Clone, Copy)]
pub struct BinaryColormap {
    pub base: Srgb<f32>,
}

impl BinaryColormap {
    pub fn new(base: Srgb<f32>) -> Self {
        BinaryColormap { base }
    }

    /// Parses a named base color.
    pub fn named(name: &str) -> Result<Self, ClusterError> {
        let base = match name.to_ascii_lowercase().as_str() {
            "red" => Srgb::new(1.0, 0.1, 0.1),
            "green" => Srgb::new(0.1, 1.0, 0.1),
            "blue" => Srgb::new(0.2, 0.4, 1.0),
            "cyan" => Srgb::new(0.1, 0.9, 0.9),
            "magenta" => Srgb::new(0.9, 0.1, 0.9),
            "yellow" => Srgb::new(0.9, 0.9, 0.1),
            "white" => Srgb::new(1.0, 1.0, 1.0),
            other => {
                return Err(ClusterError::PipelinePlot(format!(
                    "unknown channel color '{other}'"
                )))
            }
        };
        Ok(BinaryColormap { base })
    }

    /// Ramp value at `t` in [0, 1].
    pub fn eval(self, t: f32) -> Srgb<f32> {
        let t = t.clamp(0.0, 1.0);
        Srgb::new(self.base.red * t, self.base.green * t, self.base.blue * t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_match_anchor_tables() {
        let lo = Colormap::Viridis.eval(0.0);
        assert!((lo.red - 0.267).abs() < 1e-6);
        let hi = Colormap::Viridis.eval(1.0);
        assert!((hi.blue - 0.144).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_input_clamps() {
        let a = Colormap::Hot.eval(-3.0);
        let b = Colormap::Hot.eval(0.0);
        assert_eq!(a.red, b.red);
        assert_eq!(Colormap::Gray.eval_u8(2.0), [255, 255, 255]);
    }

    #[test]
    fn binary_ramp_starts_black() {
        let cm = BinaryColormap::named("blue").unwrap();
        let zero = cm.eval(0.0);
        assert_eq!((zero.red, zero.green, zero.blue), (0.0, 0.0, 0.0));
        assert!(cm.eval(1.0).blue > 0.9);
    }
}
