//! Conversion between labelme point pairs and COCO flat coordinate rings.

use crate::error::ConvertError;

/// Fewest points that still enclose an area.
pub const MIN_POLYGON_POINTS: usize = 3;

/// Flatten `[[x, y], ...]` into `[x, y, x, y, ...]`, truncating toward zero.
///
/// Order is preserved and the ring is left open (the first point is not
/// repeated at the end).
pub fn to_flat_coordinates(points: &[[f64; 2]]) -> Vec<i64> {
    points
        .iter()
        .flat_map(|&[x, y]| [x.trunc() as i64, y.trunc() as i64])
        .collect()
}

/// Pair up a flat `[x, y, x, y, ...]` ring.
pub fn to_point_pairs(flat: &[f64]) -> Result<Vec<[f64; 2]>, ConvertError> {
    if flat.len() % 2 == 1 {
        return Err(ConvertError::OddLength { len: flat.len() });
    }
    Ok(flat.chunks_exact(2).map(|c| [c[0], c[1]]).collect())
}

/// Reject polygons with fewer than [`MIN_POLYGON_POINTS`] points.
pub fn validate_polygon(points: &[[f64; 2]]) -> Result<(), ConvertError> {
    if points.len() < MIN_POLYGON_POINTS {
        return Err(ConvertError::DegeneratePolygon {
            points: points.len(),
        });
    }
    Ok(())
}
