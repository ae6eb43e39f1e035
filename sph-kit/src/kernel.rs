//! The cubic-spline (M4) smoothing kernel and its line-of-sight projection.

use std::f64::consts::PI;

/// Dimensionless cubic-spline profile w(q), compact support q < 2.
#[inline(always)]
pub fn w_cubic(q: f64) -> f64 {
    if q < 1.0 {
        1.0 - 1.5 * q * q + 0.75 * q * q * q
    } else if q < 2.0 {
        let t = 2.0 - q;
        0.25 * t * t * t
    } else {
        0.0
    }
}

/// 3-D kernel W(r, h) = w(r/h) / (pi h^3), normalized to unit volume integral.
#[inline(always)]
pub fn w3(r: f64, h: f64) -> f64 {
    if h <= 0.0 {
        return 0.0;
    }
    w_cubic(r / h) / (PI * h * h * h)
}

/// Tabulated column kernel: the 3-D kernel integrated along the line of
/// sight. `eval(b, h)` returns the surface value at projected distance `b`
/// (units 1/h^2). The table is filled once per rasterizer instance by a
/// Simpson pass over the compact support.
#[derive(Debug, Clone)]
pub struct ColumnKernel {
    table: Vec<f64>,
}

const TABLE_LEN: usize = 256;
const Q_MAX: f64 = 2.0;

impl ColumnKernel {
    pub fn new() -> Self {
        let mut table = Vec::with_capacity(TABLE_LEN);
        for i in 0..TABLE_LEN {
            let qb = Q_MAX * i as f64 / (TABLE_LEN - 1) as f64;
            table.push(column_integral(qb));
        }
        ColumnKernel { table }
    }

    /// Column-integrated kernel at projected distance `b` for smoothing
    /// length `h`, in units of 1/h^2.
    #[inline]
    pub fn eval(&self, b: f64, h: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        let qb = b / h;
        if qb >= Q_MAX {
            return 0.0;
        }
        let x = qb / Q_MAX * (TABLE_LEN - 1) as f64;
        let i = x as usize;
        let frac = x - i as f64;
        let lo = self.table[i];
        let hi = if i + 1 < TABLE_LEN { self.table[i + 1] } else { 0.0 };
        (lo + (hi - lo) * frac) / (h * h)
    }
}

impl Default for ColumnKernel {
    fn default() -> Self {
        Self::new()
    }
}

/// Simpson integration of the dimensionless kernel along the line of sight
/// at projected distance `qb`.
fn column_integral(qb: f64) -> f64 {
    if qb >= Q_MAX {
        return 0.0;
    }
    let z_max = (Q_MAX * Q_MAX - qb * qb).sqrt();
    let n = 64; // even
    let dz = z_max / n as f64;
    let f = |z: f64| w_cubic((qb * qb + z * z).sqrt()) / PI;
    let mut sum = f(0.0) + f(z_max);
    for i in 1..n {
        let w = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += w * f(i as f64 * dz);
    }
    // Symmetric about z = 0.
    2.0 * sum * dz / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn w3_integrates_to_one() {
        // Radial shell integration of the normalized kernel.
        let h = 1.3;
        let n = 4000;
        let dr = 2.0 * h / n as f64;
        let mut total = 0.0;
        for i in 0..n {
            let r = (i as f64 + 0.5) * dr;
            total += 4.0 * PI * r * r * w3(r, h) * dr;
        }
        assert!((total - 1.0).abs() < 1e-3, "kernel norm = {total}");
    }

    #[test]
    fn column_kernel_integrates_to_one() {
        // The surface integral of the projected kernel is also unity.
        let ck = ColumnKernel::new();
        let h = 0.7;
        let n = 2000;
        let db = 2.0 * h / n as f64;
        let mut total = 0.0;
        for i in 0..n {
            let b = (i as f64 + 0.5) * db;
            total += 2.0 * PI * b * ck.eval(b, h) * db;
        }
        assert!((total - 1.0).abs() < 1e-3, "column norm = {total}");
    }

    #[test]
    fn compact_support() {
        assert_eq!(w3(2.1, 1.0), 0.0);
        let ck = ColumnKernel::new();
        assert_eq!(ck.eval(2.0, 1.0), 0.0);
    }
}
