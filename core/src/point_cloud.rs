//! Point clouds stored as `N x D` matrices, one point per row.

use nalgebra::{DMatrix, DVector, Point3, RowDVector};

/// `N x D` point matrix.
pub type PointMatrix = DMatrix<f64>;

/// Build a point matrix from row data.
///
/// Every row must have the same, nonzero length and at least one row must be
/// present.
pub fn points_from_rows(rows: &[Vec<f64>]) -> crate::Result<PointMatrix> {
    let first = rows
        .first()
        .ok_or_else(|| crate::Error::InvalidInput("point array has no rows".to_string()))?;
    let dim = first.len();
    if dim == 0 {
        return Err(crate::Error::InvalidInput(
            "point array has zero columns".to_string(),
        ));
    }

    for (i, row) in rows.iter().enumerate() {
        if row.len() != dim {
            return Err(crate::Error::InvalidInput(format!(
                "point array must be 2-dimensional: row {} has {} columns, row 0 has {}",
                i,
                row.len(),
                dim
            )));
        }
    }

    Ok(DMatrix::from_fn(rows.len(), dim, |i, j| rows[i][j]))
}

/// Convert 3D points into a `N x 3` point matrix.
pub fn points_from_point3(points: &[Point3<f64>]) -> PointMatrix {
    DMatrix::from_fn(points.len(), 3, |i, j| points[i][j])
}

/// Concatenate two point matrices vertically. Both must have the same column count.
pub fn stack_rows(top: &PointMatrix, bottom: &PointMatrix) -> crate::Result<PointMatrix> {
    if top.ncols() != bottom.ncols() {
        return Err(crate::Error::dimension_mismatch(
            top.ncols(),
            bottom.ncols(),
            "stacking point arrays",
        ));
    }

    let rows = top.nrows();
    Ok(DMatrix::from_fn(rows + bottom.nrows(), top.ncols(), |i, j| {
        if i < rows {
            top[(i, j)]
        } else {
            bottom[(i - rows, j)]
        }
    }))
}

/// Squared Euclidean norm of every row.
pub fn squared_row_norms(points: &PointMatrix) -> DVector<f64> {
    DVector::from_iterator(
        points.nrows(),
        points.row_iter().map(|row| row.norm_squared()),
    )
}

/// Mean of the rows. Returns zeros for an empty matrix.
pub fn row_mean(points: &PointMatrix) -> RowDVector<f64> {
    if points.nrows() == 0 {
        return RowDVector::zeros(points.ncols());
    }
    points.row_sum() / points.nrows() as f64
}

/// Subtract `offset` from every row.
pub fn sub_row(points: &PointMatrix, offset: &RowDVector<f64>) -> PointMatrix {
    DMatrix::from_fn(points.nrows(), points.ncols(), |i, j| {
        points[(i, j)] - offset[j]
    })
}

/// Add `offset` to every row.
pub fn add_row(points: &PointMatrix, offset: &RowDVector<f64>) -> PointMatrix {
    DMatrix::from_fn(points.nrows(), points.ncols(), |i, j| {
        points[(i, j)] + offset[j]
    })
}
