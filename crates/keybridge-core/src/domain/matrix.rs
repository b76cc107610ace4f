//! Two-dimensional key matrix addressing.
//!
//! Injected key events address a switch either by explicit row/column or by a
//! single linear index.  A linear index is resolved against the statically
//! configured column count:
//!
//! ```text
//! row = position / columns
//! col = position % columns
//! ```

use thiserror::Error;

/// Errors raised while resolving a key address into a matrix coordinate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    /// A linear position cannot be resolved when the matrix has no columns.
    #[error("linear position {position} cannot be resolved: matrix has 0 columns")]
    ZeroColumns { position: u32 },
}

/// A (row, column) cell of the key matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixCoordinate {
    pub row: u32,
    pub col: u32,
}

/// Static size of the key matrix, as configured for the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixGeometry {
    pub rows: u32,
    pub columns: u32,
}

impl MatrixGeometry {
    pub fn new(rows: u32, columns: u32) -> Self {
        Self { rows, columns }
    }

    /// Resolves a linear index into a coordinate.
    ///
    /// Rows are not bounds-checked: the position is forwarded to the matrix
    /// consumer as-is, which owns the decision about out-of-range cells.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::ZeroColumns`] when `columns == 0`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keybridge_core::domain::matrix::{MatrixCoordinate, MatrixGeometry};
    ///
    /// let geometry = MatrixGeometry::new(4, 4);
    /// assert_eq!(
    ///     geometry.resolve_position(5),
    ///     Ok(MatrixCoordinate { row: 1, col: 1 })
    /// );
    /// ```
    pub fn resolve_position(&self, position: u32) -> Result<MatrixCoordinate, AddressError> {
        if self.columns == 0 {
            return Err(AddressError::ZeroColumns { position });
        }
        Ok(MatrixCoordinate {
            row: position / self.columns,
            col: position % self.columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_position_with_four_columns() {
        // Arrange
        let geometry = MatrixGeometry::new(4, 4);

        // Act
        let coord = geometry.resolve_position(5);

        // Assert
        assert_eq!(coord, Ok(MatrixCoordinate { row: 1, col: 1 }));
    }

    #[test]
    fn test_resolve_position_zero_is_origin() {
        let geometry = MatrixGeometry::new(4, 12);
        assert_eq!(geometry.resolve_position(0), Ok(MatrixCoordinate { row: 0, col: 0 }));
    }

    #[test]
    fn test_resolve_position_last_cell_of_row() {
        let geometry = MatrixGeometry::new(4, 12);
        assert_eq!(geometry.resolve_position(11), Ok(MatrixCoordinate { row: 0, col: 11 }));
        assert_eq!(geometry.resolve_position(12), Ok(MatrixCoordinate { row: 1, col: 0 }));
    }

    #[test]
    fn test_resolve_position_with_zero_columns_is_error() {
        let geometry = MatrixGeometry::new(4, 0);
        assert_eq!(
            geometry.resolve_position(5),
            Err(AddressError::ZeroColumns { position: 5 })
        );
    }

    #[test]
    fn test_resolve_position_beyond_rows_is_not_rejected() {
        let geometry = MatrixGeometry::new(1, 4);
        let coord = geometry.resolve_position(9).unwrap();
        assert_eq!(coord, MatrixCoordinate { row: 2, col: 1 });
        assert!(coord.row >= geometry.rows);
    }
}
