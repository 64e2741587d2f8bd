//! Coordinate axes and orthonormal frames.

use glam::{Mat3, Vec3};

/// One of the three coordinate axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Axis for a component index, `None` outside 0..3.
    pub fn from_index(i: usize) -> Option<Axis> {
        match i {
            0 => Some(Axis::X),
            1 => Some(Axis::Y),
            2 => Some(Axis::Z),
            _ => None,
        }
    }
}

/// Build an orthonormal basis whose third column is `n`.
///
/// The smallest-magnitude component of `n` is replaced by 1 to obtain a
/// helper vector that cannot be parallel to `n`; two cross products then
/// give the tangent and bitangent. `n` is expected to be unit length.
pub fn form_basis(n: Vec3) -> Mat3 {
    let abs = n.abs();
    let mut min_idx = 0;
    for i in 1..3 {
        if abs[i] < abs[min_idx] {
            min_idx = i;
        }
    }

    let mut q = n;
    q[min_idx] = 1.0;

    let t = q.cross(n).normalize();
    let b = n.cross(t).normalize();

    Mat3::from_cols(t, b, n)
}
