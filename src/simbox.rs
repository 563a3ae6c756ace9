use nalgebra::{Matrix3, Vector3};

use crate::error::{Error, Result};

/// Periodic simulation box, 2D or 3D, with triclinic tilt factors.
///
/// The box is stored as an upper-triangular cell matrix `h` (columns are the
/// box vectors) together with its inverse. Wrap-around is always on; a 2D box
/// leaves the z component of every vector untouched and reports zero for the
/// z nearest-plane distance.
#[derive(Clone, Debug)]
pub struct SimBox {
    h: Matrix3<f64>,
    h_inv: Matrix3<f64>,
    is_2d: bool,
}

impl SimBox {
    /// 3D box from side lengths and tilt factors.
    pub fn new(lx: f64, ly: f64, lz: f64, xy: f64, xz: f64, yz: f64) -> Result<Self> {
        if !(lx > 0.0 && ly > 0.0 && lz > 0.0) {
            return Err(Error::DegenerateBox);
        }
        let h = Matrix3::new(lx, xy * ly, xz * lz, 0.0, ly, yz * lz, 0.0, 0.0, lz);
        Self::from_h(h, false)
    }

    /// 2D box from side lengths and the xy tilt factor.
    ///
    /// The internal z period is 1 so the cell matrix stays invertible; the z
    /// axis never participates in wrapping. 2D particle positions carry a
    /// zero z component by convention.
    pub fn new_2d(lx: f64, ly: f64, xy: f64) -> Result<Self> {
        if !(lx > 0.0 && ly > 0.0) {
            return Err(Error::DegenerateBox);
        }
        let h = Matrix3::new(lx, xy * ly, 0.0, 0.0, ly, 0.0, 0.0, 0.0, 1.0);
        Self::from_h(h, true)
    }

    /// Cubic 3D box of side `l`.
    pub fn cubic(l: f64) -> Result<Self> {
        Self::new(l, l, l, 0.0, 0.0, 0.0)
    }

    /// Square 2D box of side `l`.
    pub fn square(l: f64) -> Result<Self> {
        Self::new_2d(l, l, 0.0)
    }

    fn from_h(h: Matrix3<f64>, is_2d: bool) -> Result<Self> {
        let h_inv = h.try_inverse().ok_or(Error::DegenerateBox)?;
        Ok(Self { h, h_inv, is_2d })
    }

    pub fn is_2d(&self) -> bool {
        self.is_2d
    }

    /// Side lengths; the z component is 0 for 2D boxes.
    pub fn lengths(&self) -> Vector3<f64> {
        let lz = if self.is_2d { 0.0 } else { self.h[(2, 2)] };
        Vector3::new(self.h[(0, 0)], self.h[(1, 1)], lz)
    }

    /// Box volume (area for 2D boxes).
    pub fn volume(&self) -> f64 {
        // The 2D cell matrix carries a unit z period, so the determinant is
        // the area either way.
        self.h.determinant()
    }

    pub fn to_fractional(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        self.h_inv * cart
    }

    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.h * frac
    }

    /// Distances between parallel box faces, per axis.
    /// d_i = 1 / |h_inv.row(i)|
    pub fn nearest_plane_distance(&self) -> Vector3<f64> {
        let dz = if self.is_2d {
            0.0
        } else {
            1.0 / self.h_inv.row(2).norm()
        };
        Vector3::new(
            1.0 / self.h_inv.row(0).norm(),
            1.0 / self.h_inv.row(1).norm(),
            dz,
        )
    }

    /// Minimum-image representation of a displacement vector.
    pub fn wrap(&self, v: &Vector3<f64>) -> Vector3<f64> {
        let mut frac = self.to_fractional(v);
        frac.x -= frac.x.round();
        frac.y -= frac.y.round();
        if !self.is_2d {
            frac.z -= frac.z.round();
        }
        self.to_cartesian(&frac)
    }
}
