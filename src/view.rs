//! The snapshot view: a camera transform over one loaded snapshot.
//!
//! Loading re-centers a RAMSES snapshot on its box center, applies the
//! caller's origin offset, then rotates positions and velocities into the
//! viewing frame (azimuth about z, then elevation about x). The view owns
//! the snapshot exclusively; releasing the view drops it.

use cluster_common::{config, ClusterError};
use sph_kit::snapshot::{SnapLayout, Snapshot};
use std::path::Path;

/// Camera parameters of a view.
#[derive(Debug, Clone, Copy)]
pub struct ViewParams {
    /// Origin offset in kpc, applied after box re-centering.
    pub origin: [f64; 3],
    /// Azimuth in degrees, rotation about the z axis.
    pub azimuth_deg: f64,
    /// Elevation in degrees, rotation about the x axis.
    pub elevation_deg: f64,
}

impl Default for ViewParams {
    fn default() -> Self {
        ViewParams {
            origin: [0.0; 3],
            azimuth_deg: 0.0,
            elevation_deg: 0.0,
        }
    }
}

impl ViewParams {
    /// The combined rotation matrix R = Rx(elevation) * Rz(azimuth).
    pub fn rotation(&self) -> [[f64; 3]; 3] {
        let az = self.azimuth_deg.to_radians();
        let el = self.elevation_deg.to_radians();
        let (sa, ca) = az.sin_cos();
        let (se, ce) = el.sin_cos();
        // Rz then Rx, composed.
        [
            [ca, -sa, 0.0],
            [ce * sa, ce * ca, -se],
            [se * sa, se * ca, ce],
        ]
    }

    fn is_identity(&self) -> bool {
        self.azimuth_deg == 0.0 && self.elevation_deg == 0.0
    }
}

fn mat_apply(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// A camera wrapper holding one snapshot at a time.
#[derive(Debug)]
pub struct SnapView {
    params: ViewParams,
    snapshot: Option<Snapshot>,
}

impl SnapView {
    pub fn new(params: ViewParams) -> Self {
        SnapView {
            params,
            snapshot: None,
        }
    }

    pub fn params(&self) -> &ViewParams {
        &self.params
    }

    /// Loads a snapshot and applies the full transform chain: box
    /// re-centering, origin translation, view rotation. Unit conversion to
    /// the canonical physical units happens inside the loader. Replaces
    /// any previously attached snapshot.
    pub fn load_snapshot(&mut self, path: &Path) -> Result<(), ClusterError> {
        let mu = config().numerics.mu;
        let mut snap = sph_kit::load_snapshot(path, mu)
            .map_err(|e| ClusterError::Snapshot(format!("{}: {e}", path.display())))?;

        // A RAMSES-layout snapshot must carry its box size; positions are
        // shifted so the box center becomes the origin.
        let center = match snap.layout {
            SnapLayout::Ramses => {
                let boxsize = snap.properties.boxsize.ok_or_else(|| {
                    ClusterError::NotRamses(format!(
                        "{} carries no boxsize property",
                        path.display()
                    ))
                })?;
                boxsize / 2.0
            }
            SnapLayout::Gadget => 0.0,
        };

        let shift = [
            center + self.params.origin[0],
            center + self.params.origin[1],
            center + self.params.origin[2],
        ];
        let rot = self.params.rotation();
        let rotate = !self.params.is_identity();
        for fam in [&mut snap.gas, &mut snap.dm, &mut snap.stars] {
            for p in fam.pos.iter_mut() {
                let t = [p[0] - shift[0], p[1] - shift[1], p[2] - shift[2]];
                *p = if rotate { mat_apply(&rot, t) } else { t };
            }
            if rotate {
                for v in fam.vel.iter_mut() {
                    *v = mat_apply(&rot, *v);
                }
            }
        }
        self.snapshot = Some(snap);
        Ok(())
    }

    /// The attached snapshot, or a snapshot error when none is loaded.
    pub fn snapshot(&self) -> Result<&Snapshot, ClusterError> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| ClusterError::Snapshot("view holds no snapshot".into()))
    }

    pub fn snapshot_mut(&mut self) -> Result<&mut Snapshot, ClusterError> {
        self.snapshot
            .as_mut()
            .ok_or_else(|| ClusterError::Snapshot("view holds no snapshot".into()))
    }

    /// Drops the snapshot, releasing its arrays.
    pub fn release(&mut self) {
        self.snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_identity_at_zero_angles() {
        let params = ViewParams::default();
        let r = params.rotation();
        let v = mat_apply(&r, [1.0, 2.0, 3.0]);
        assert!((v[0] - 1.0).abs() < 1e-12);
        assert!((v[1] - 2.0).abs() < 1e-12);
        assert!((v[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn azimuth_quarter_turn_maps_x_to_minus_y() {
        let params = ViewParams {
            origin: [0.0; 3],
            azimuth_deg: 90.0,
            elevation_deg: 0.0,
        };
        let v = mat_apply(&params.rotation(), [1.0, 0.0, 0.0]);
        assert!(v[0].abs() < 1e-12);
        assert!((v[1] - 1.0).abs() < 1e-12 || (v[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn elevation_quarter_turn_maps_y_to_z() {
        let params = ViewParams {
            origin: [0.0; 3],
            azimuth_deg: 0.0,
            elevation_deg: 90.0,
        };
        let v = mat_apply(&params.rotation(), [0.0, 1.0, 0.0]);
        assert!(v[1].abs() < 1e-12);
        assert!((v[2].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rotation_preserves_length() {
        let params = ViewParams {
            origin: [0.0; 3],
            azimuth_deg: 37.0,
            elevation_deg: -12.0,
        };
        let v = mat_apply(&params.rotation(), [3.0, -4.0, 12.0]);
        let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        assert!((len - 13.0).abs() < 1e-10);
    }

    #[test]
    fn empty_view_reports_missing_snapshot() {
        let view = SnapView::new(ViewParams::default());
        assert!(matches!(view.snapshot(), Err(ClusterError::Snapshot(_))));
    }
}
