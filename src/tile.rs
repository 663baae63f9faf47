#![allow(clippy::unreadable_literal)]

use crate::error::PmtError;

/// The highest zoom level representable in a 64-bit tile id.
///
/// At `z=27` the prefix sum `TZ[z] + 4^z - 1` would overflow `u64`, so the format caps
/// addressable zoom levels at 26.
pub const MAX_ZOOM: u8 = 26;

/// Prefix sums of the tile pyramid: `TZ[z] = sum_{k<z} 4^k`, i.e. the tile id of the
/// first tile at zoom level `z`.
pub const TZ: [u64; 28] = [
    /*  0 */ 0,
    /*  1 */ 1,
    /*  2 */ 5,
    /*  3 */ 21,
    /*  4 */ 85,
    /*  5 */ 341,
    /*  6 */ 1365,
    /*  7 */ 5461,
    /*  8 */ 21845,
    /*  9 */ 87381,
    /* 10 */ 349525,
    /* 11 */ 1398101,
    /* 12 */ 5592405,
    /* 13 */ 22369621,
    /* 14 */ 89478485,
    /* 15 */ 357913941,
    /* 16 */ 1431655765,
    /* 17 */ 5726623061,
    /* 18 */ 22906492245,
    /* 19 */ 91625968981,
    /* 20 */ 366503875925,
    /* 21 */ 1466015503701,
    /* 22 */ 5864062014805,
    /* 23 */ 23456248059221,
    /* 24 */ 93824992236885,
    /* 25 */ 375299968947541,
    /* 26 */ 1501199875790165,
    // one past the last representable zoom, used only as an upper search bound
    /* 27 */ 6004799503160661,
];

/// A tile's coordinates: zoom level and the `(x, y)` position within that level's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Zoom level, `0..=26`.
    pub z: u8,
    /// Column, `0..2^z`.
    pub x: u64,
    /// Row, `0..2^z`.
    pub y: u64,
}

impl TileCoord {
    /// Creates a coordinate after validating it against [`MAX_ZOOM`] and the grid size.
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::InvalidArgument`] if `z > MAX_ZOOM` or `x`/`y` are out of range.
    pub fn new(z: u8, x: u64, y: u64) -> Result<Self, PmtError> {
        if z > MAX_ZOOM {
            return Err(PmtError::InvalidArgument(format!(
                "zoom {z} exceeds maximum of {MAX_ZOOM}"
            )));
        }
        let dim = 1u64 << z;
        if x >= dim || y >= dim {
            return Err(PmtError::InvalidArgument(format!(
                "tile coordinates ({x}, {y}) out of range for zoom {z}"
            )));
        }
        Ok(Self { z, x, y })
    }

    /// Computes this coordinate's 64-bit Hilbert tile id.
    #[must_use]
    pub fn to_id(self) -> u64 {
        zxy_to_id(self.z, self.x, self.y)
    }

    /// Recovers a coordinate from a tile id.
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::InvalidArgument`] if `id` falls beyond the range addressable
    /// at [`MAX_ZOOM`].
    pub fn from_id(id: u64) -> Result<Self, PmtError> {
        let (z, x, y) = id_to_zxy(id)?;
        Ok(Self { z, x, y })
    }
}

/// Rotates/reflects the quadrant `(x, y)` within an `s`-sized sub-square, per the
/// standard Hilbert-curve construction.
fn rotate(s: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = s - 1 - *x;
            *y = s - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

/// Converts `(z, x, y)` tile coordinates into a 64-bit tile id.
///
/// `x` and `y` must already be known to be within `0..2^z`; use [`TileCoord::new`] to
/// validate untrusted input before calling this.
#[must_use]
pub fn zxy_to_id(z: u8, x: u64, y: u64) -> u64 {
    let acc = TZ[usize::from(z)];
    if z == 0 {
        return acc;
    }

    let (mut x, mut y) = (x, y);
    let mut d: u64 = 0;
    let mut s = 1u64 << (z - 1);
    while s > 0 {
        let rx = u64::from((x & s) > 0);
        let ry = u64::from((y & s) > 0);
        d += s * s * ((3 * rx) ^ ry);
        rotate(s, &mut x, &mut y, rx, ry);
        s >>= 1;
    }
    acc + d
}

/// Recovers `(z, x, y)` tile coordinates from a 64-bit tile id.
///
/// # Errors
///
/// Returns [`PmtError::InvalidArgument`] if `id` is beyond the range addressable at
/// [`MAX_ZOOM`] (i.e. `id >= TZ[MAX_ZOOM + 1]`).
pub fn id_to_zxy(id: u64) -> Result<(u8, u64, u64), PmtError> {
    let z = TZ
        .iter()
        .rposition(|&base| base <= id)
        .filter(|&z| z <= usize::from(MAX_ZOOM))
        .ok_or_else(|| PmtError::InvalidArgument(format!("tile id {id} is out of range")))?;
    let base = TZ[z];
    let d = id - base;

    let n = 1u64 << z;
    let (mut x, mut y) = (0u64, 0u64);
    let mut t = d;
    let mut s = 1u64;
    while s < n {
        let rx = 1 & (t / 2);
        let ry = 1 & (t ^ rx);
        rotate(s, &mut x, &mut y, rx, ry);
        x += s * rx;
        y += s * ry;
        t /= 4;
        s <<= 1;
    }

    Ok((z as u8, x, y))
}

#[cfg(test)]
mod tests {
    use super::{id_to_zxy, zxy_to_id};

    #[test]
    fn known_ids() {
        assert_eq!(zxy_to_id(0, 0, 0), 0);
        assert_eq!(zxy_to_id(1, 1, 0), 4);
        assert_eq!(zxy_to_id(2, 1, 3), 11);
        assert_eq!(zxy_to_id(3, 3, 0), 26);
    }

    #[test]
    fn round_trips_many_coords() {
        for z in 0..=10u8 {
            let dim = 1u64 << z;
            for x in 0..dim.min(8) {
                for y in 0..dim.min(8) {
                    let id = zxy_to_id(z, x, y);
                    let back = id_to_zxy(id).unwrap();
                    assert_eq!((z, x, y), back, "round trip failed for id {id}");
                }
            }
        }
    }

    #[test]
    fn hilbert_edge_case_regression_anchor() {
        let id = zxy_to_id(7, 34, 51);
        assert_eq!(id_to_zxy(id).unwrap(), (7, 34, 51));
    }

    #[test]
    fn rejects_out_of_range_id() {
        assert!(id_to_zxy(u64::MAX).is_err());
    }
}
