//! Uniform hash grid keyed by integer cell coordinates.

use hashbrown::HashMap;
use nalgebra::{Point2, Vector2};
use orbital_types::BodyId;

use super::{Aabb, BodyProxy};

/// Integer cell coordinate.
pub type Cell = (i64, i64);

/// Widest box, in cells per axis, that is rasterized into the grid.
pub const MAX_CELL_SPAN: i64 = 64;

/// Sparse uniform grid mapping cells to the entries whose boxes touch them.
///
/// Entries are plain indices (into the caller's proxy list). An entry whose
/// box spans several cells is stored in every one of them, up to
/// [`MAX_CELL_SPAN`] cells per axis. Wider boxes go to an oversized list that
/// every query returns, and wider query boxes scan the occupied cells instead
/// of enumerating their range.
#[derive(Debug, Clone)]
pub struct HashGrid {
    cell_size: f64,
    cells: HashMap<Cell, Vec<usize>>,
    oversized: Vec<usize>,
}

impl HashGrid {
    /// Create an empty grid. `cell_size` must be positive; callers validate.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            oversized: Vec::new(),
        }
    }

    /// Edge length of a cell.
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of occupied cells.
    #[must_use]
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Entries whose boxes were too wide to rasterize.
    #[must_use]
    pub fn oversized(&self) -> &[usize] {
        &self.oversized
    }

    /// Remove every entry, keeping allocated buckets.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.oversized.clear();
    }

    /// Cell containing `point` (floor division).
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn cell_of(&self, point: &Point2<f64>) -> Cell {
        (
            (point.x / self.cell_size).floor() as i64,
            (point.y / self.cell_size).floor() as i64,
        )
    }

    /// World-space bounds of a cell.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn cell_bounds(&self, cell: Cell) -> Aabb {
        let min = Point2::new(cell.0 as f64 * self.cell_size, cell.1 as f64 * self.cell_size);
        Aabb::new(min, min + Vector2::repeat(self.cell_size))
    }

    /// Inclusive range of cells covered by `aabb`; `None` for non-finite boxes.
    fn cell_range(&self, aabb: &Aabb) -> Option<(Cell, Cell)> {
        aabb.is_finite()
            .then(|| (self.cell_of(&aabb.min), self.cell_of(&aabb.max)))
    }

    fn is_oversized(((x0, y0), (x1, y1)): (Cell, Cell)) -> bool {
        x1.saturating_sub(x0) >= MAX_CELL_SPAN || y1.saturating_sub(y0) >= MAX_CELL_SPAN
    }

    /// Insert `entry` into every cell its box covers.
    ///
    /// Boxes with non-finite corners cover no cell and are not stored.
    pub fn insert(&mut self, entry: usize, aabb: &Aabb) {
        let Some(range) = self.cell_range(aabb) else {
            return;
        };
        if Self::is_oversized(range) {
            self.oversized.push(entry);
            return;
        }

        let ((x0, y0), (x1, y1)) = range;
        for x in x0..=x1 {
            for y in y0..=y1 {
                self.cells.entry((x, y)).or_default().push(entry);
            }
        }
    }

    /// Entries in every cell covered by `aabb`, followed by the oversized
    /// entries. Entries spanning several of those cells are yielded once per
    /// cell.
    pub fn query<'a>(&'a self, aabb: &Aabb) -> impl Iterator<Item = usize> + 'a {
        let range = self.cell_range(aabb);
        let (narrow, wide) = match range {
            Some(range) if Self::is_oversized(range) => (None, Some(range)),
            _ => (range, None),
        };

        let rasterized = narrow
            .into_iter()
            .flat_map(|((x0, y0), (x1, y1))| {
                (x0..=x1).flat_map(move |x| (y0..=y1).map(move |y| (x, y)))
            })
            .filter_map(move |cell| self.cells.get(&cell));

        let scanned = wide.into_iter().flat_map(move |((x0, y0), (x1, y1))| {
            self.cells
                .iter()
                .filter(move |(&(x, y), _)| (x0..=x1).contains(&x) && (y0..=y1).contains(&y))
                .map(|(_, entries)| entries)
        });

        let oversized = range.map(|_| self.oversized.as_slice()).unwrap_or_default();

        rasterized
            .chain(scanned)
            .flat_map(|entries| entries.iter().copied())
            .chain(oversized.iter().copied())
    }

    /// Occupied cells and their entries.
    pub fn cells(&self) -> impl Iterator<Item = (Cell, &[usize])> + '_ {
        self.cells
            .iter()
            .map(|(&cell, entries)| (cell, entries.as_slice()))
    }
}

/// Grid over the proxies' boxes as chosen by `aabb_of`.
pub(super) fn build_grid(
    cell_size: f64,
    proxies: &[BodyProxy],
    aabb_of: fn(&BodyProxy) -> Aabb,
) -> HashGrid {
    let mut grid = HashGrid::new(cell_size);
    for (index, proxy) in proxies.iter().enumerate() {
        grid.insert(index, &aabb_of(proxy));
    }
    grid
}

/// Every unordered pair of proxies whose boxes (per `aabb_of`) overlap and
/// share at least one grid cell, as `(lower, higher)` proxy indices. Each
/// pair is emitted once.
pub(super) fn grid_index_pairs(
    grid: &HashGrid,
    proxies: &[BodyProxy],
    aabb_of: fn(&BodyProxy) -> Aabb,
) -> Vec<(usize, usize)> {
    let boxes: Vec<Aabb> = proxies.iter().map(aabb_of).collect();
    // visited[j] == i + 1 once j has been considered for source i
    let mut visited = vec![0_usize; proxies.len()];
    let mut pairs = Vec::new();

    for (i, aabb) in boxes.iter().enumerate() {
        for j in grid.query(aabb) {
            if j <= i || visited[j] == i + 1 {
                continue;
            }
            visited[j] = i + 1;

            if aabb.overlaps(&boxes[j]) {
                pairs.push((i, j));
            }
        }
    }

    pairs
}

/// [`grid_index_pairs`] mapped to body ids.
pub(super) fn grid_pairs(
    grid: &HashGrid,
    proxies: &[BodyProxy],
    aabb_of: fn(&BodyProxy) -> Aabb,
) -> Vec<(BodyId, BodyId)> {
    grid_index_pairs(grid, proxies, aabb_of)
        .into_iter()
        .map(|(i, j)| (proxies[i].id, proxies[j].id))
        .collect()
}

/// Entries of cells within reach of a disc around `center`.
pub(super) fn grid_candidates(grid: &HashGrid, center: Point2<f64>, radius: f64) -> Vec<usize> {
    let reach = Aabb::from_center(center, Vector2::repeat(radius.max(0.0)));
    let mut candidates: Vec<usize> = grid.query(&reach).collect();
    candidates.sort_unstable();
    candidates.dedup();
    candidates
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_of_uses_floor() {
        let grid = HashGrid::new(10.0);
        assert_eq!(grid.cell_of(&Point2::new(5.0, 5.0)), (0, 0));
        assert_eq!(grid.cell_of(&Point2::new(-5.0, 15.0)), (-1, 1));
        assert_eq!(grid.cell_of(&Point2::new(-10.0, -0.1)), (-1, -1));
    }

    #[test]
    fn test_cell_bounds() {
        let grid = HashGrid::new(4.0);
        let bounds = grid.cell_bounds((-1, 2));
        assert_eq!(bounds.min, Point2::new(-4.0, 8.0));
        assert_eq!(bounds.max, Point2::new(0.0, 12.0));
    }

    #[test]
    fn test_insert_spans_cells() {
        let mut grid = HashGrid::new(10.0);
        grid.insert(0, &Aabb::new(Point2::new(-1.0, -1.0), Point2::new(1.0, 1.0)));
        assert_eq!(grid.occupied_cells(), 4);

        grid.insert(1, &Aabb::new(Point2::new(2.0, 2.0), Point2::new(3.0, 3.0)));
        assert_eq!(grid.occupied_cells(), 4);

        let mut hits: Vec<_> = grid
            .query(&Aabb::new(Point2::new(0.5, 0.5), Point2::new(0.6, 0.6)))
            .collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn test_non_finite_box_is_not_stored() {
        let mut grid = HashGrid::new(1.0);
        let runaway = Aabb::new(Point2::new(0.0, 0.0), Point2::new(f64::INFINITY, 1.0));
        grid.insert(0, &runaway);

        assert_eq!(grid.occupied_cells(), 0);
        assert_eq!(grid.query(&runaway).count(), 0);
    }

    #[test]
    fn test_wide_box_is_kept_aside() {
        let mut grid = HashGrid::new(10.0);
        grid.insert(0, &Aabb::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)));
        grid.insert(1, &Aabb::new(Point2::new(-5e6, -1.0), Point2::new(5e6, 1.0)));

        assert_eq!(grid.occupied_cells(), 1);
        assert_eq!(grid.oversized(), &[1]);

        // Narrow queries see the oversized entry even far from any cell.
        let far = Aabb::new(Point2::new(500.0, 500.0), Point2::new(501.0, 501.0));
        assert_eq!(grid.query(&far).collect::<Vec<_>>(), vec![1]);

        // Wide queries scan occupied cells instead of their whole range.
        let wide = Aabb::new(Point2::new(-1e9, -1e9), Point2::new(1e9, 1e9));
        let mut hits: Vec<_> = grid.query(&wide).collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);

        let wide_elsewhere = Aabb::new(Point2::new(1e6, 1e6), Point2::new(1e9, 1e9));
        assert_eq!(grid.query(&wide_elsewhere).collect::<Vec<_>>(), vec![1]);

        grid.clear();
        assert!(grid.oversized().is_empty());
    }

    #[test]
    fn test_query_empty_region() {
        let mut grid = HashGrid::new(1.0);
        grid.insert(0, &Aabb::new(Point2::new(0.1, 0.1), Point2::new(0.2, 0.2)));
        let far = Aabb::new(Point2::new(50.0, 50.0), Point2::new(51.0, 51.0));
        assert_eq!(grid.query(&far).count(), 0);

        grid.clear();
        assert_eq!(grid.occupied_cells(), 0);
    }
}
