use super::ProjectedPoint;
use rustc_hash::FxHashMap as HashMap;

type CellKey = (i64, i64);

/// A uniform grid over projected points for fixed radius neighbour queries.
///
/// Every point is stored in its home cell AND the 8 cells around it. With a cell size equal to
/// the query radius, anything within the radius of a point is guaranteed to be listed in that
/// point's home cell, so a query is a single map lookup.
#[derive(Debug)]
pub(crate) struct GridIndex {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
}

impl GridIndex {
    /// Build an index over `points`, the stored values are indexes into that slice.
    ///
    /// `cell_size` must be finite and greater than zero.
    pub(crate) fn build_for(points: &[ProjectedPoint], cell_size: f64) -> Self {
        debug_assert!(cell_size.is_finite() && cell_size > 0.0);

        let mut cells: HashMap<CellKey, Vec<usize>> = HashMap::default();
        cells.reserve(points.len());

        for (index, point) in points.iter().enumerate() {
            let (cx, cy) = Self::cell_for(cell_size, point);

            for dx in -1..=1 {
                for dy in -1..=1 {
                    cells
                        .entry((cx.saturating_add(dx), cy.saturating_add(dy)))
                        .or_default()
                        .push(index);
                }
            }
        }

        GridIndex { cell_size, cells }
    }

    /// Get the indexes of every point that could be within `cell_size` of `point`.
    ///
    /// The list is a superset of the true neighbours and includes the point itself if it was part
    /// of the indexed data.
    pub(crate) fn candidates(&self, point: &ProjectedPoint) -> &[usize] {
        let key = Self::cell_for(self.cell_size, point);
        self.cells.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The number of non-empty cells.
    pub(crate) fn num_cells(&self) -> usize {
        self.cells.len()
    }

    fn cell_for(cell_size: f64, point: &ProjectedPoint) -> CellKey {
        let cx = (point.x_km / cell_size).floor() as i64;
        let cy = (point.y_km / cell_size).floor() as i64;
        (cx, cy)
    }
}
