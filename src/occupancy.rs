use geom::Vector3;
use std::collections::HashSet;
use std::hash::Hash;

/// Integer coordinates of a grid cell.
pub type Cell = [usize; 3];

/// Box of grid cells, inclusive on both ends.
///
/// Empty when `min` exceeds `max` on some axis, which only happens for negative radii.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub min: Cell,
    pub max: Cell,
}

impl CellRange {
    pub fn contains(&self, cell: Cell) -> bool {
        (0..3).all(|axis| self.min[axis] <= cell[axis] && cell[axis] <= self.max[axis])
    }

    pub fn len(&self) -> usize {
        (0..3)
            .map(|axis| (self.max[axis] + 1).saturating_sub(self.min[axis]))
            .product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All cells in the range, with z varying fastest.
    pub fn cells(&self) -> impl Iterator<Item = Cell> {
        let CellRange { min, max } = *self;

        (min[0]..=max[0]).flat_map(move |x| {
            (min[1]..=max[1]).flat_map(move |y| (min[2]..=max[2]).map(move |z| [x, y, z]))
        })
    }
}

/// Uniform grid of fixed size tracking which elements are near each cell.
///
/// Elements are registered with a covering sphere and stored in every cell of
/// the sphere's bounding box, so proximity queries may report elements that are
/// somewhat farther away than requested, but never miss one.
///
/// The grid does not remember footprints: an element must be removed with the
/// same position and radius it was inserted with. Positions outside the grid
/// are clamped to the border cells.
#[derive(Debug, Clone)]
pub struct OccupancyGrid<T> {
    size: [usize; 3],
    scale: Vector3<f32>,
    cells: Vec<HashSet<T>>,
}

impl<T> OccupancyGrid<T>
where
    T: Eq + Hash + Clone,
{
    /// Creates an empty grid with `size` cells per axis.
    ///
    /// World positions are multiplied by `scale` to obtain fractional cell
    /// coordinates, so `scale` is usually the reciprocal of the cell size.
    pub fn new(size: [usize; 3], scale: Vector3<f32>) -> OccupancyGrid<T> {
        assert!(
            size.iter().all(|&dim| dim > 0),
            "Occupancy grid needs at least one cell per axis, but size was {:?}",
            size
        );

        debug!("occupancy grid of {:?} cells, scale {:?}", size, scale);

        OccupancyGrid {
            size,
            scale,
            cells: (0..size[0] * size[1] * size[2])
                .map(|_| HashSet::new())
                .collect(),
        }
    }

    /// Creates an empty grid of cubic cells with edge length `cell_size`.
    pub fn with_cell_size(size: [usize; 3], cell_size: f32) -> OccupancyGrid<T> {
        let inv = 1.0 / cell_size;
        OccupancyGrid::new(size, Vector3::new(inv, inv, inv))
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn scale(&self) -> Vector3<f32> {
        self.scale
    }

    /// Lowest cell touched by `pos`, rounding down.
    pub fn min_corner(&self, pos: Vector3<f32>) -> Cell {
        self.to_cell(pos, f32::floor)
    }

    /// Highest cell touched by `pos`, rounding up.
    pub fn max_corner(&self, pos: Vector3<f32>) -> Cell {
        self.to_cell(pos, f32::ceil)
    }

    /// Cell closest to `pos`.
    pub fn cell_at(&self, pos: Vector3<f32>) -> Cell {
        self.to_cell(pos, f32::round)
    }

    /// World position of the center of `cell`.
    pub fn cell_center(&self, cell: Cell) -> Vector3<f32> {
        Vector3::new(
            (cell[0] as f32 + 0.5) / self.scale.x,
            (cell[1] as f32 + 0.5) / self.scale.y,
            (cell[2] as f32 + 0.5) / self.scale.z,
        )
    }

    fn to_cell<F>(&self, pos: Vector3<f32>, round: F) -> Cell
    where
        F: Fn(f32) -> f32,
    {
        [
            clamp_to_axis(round(pos.x * self.scale.x), self.size[0]),
            clamp_to_axis(round(pos.y * self.scale.y), self.size[1]),
            clamp_to_axis(round(pos.z * self.scale.z), self.size[2]),
        ]
    }

    /// Cells covering the bounding box of the sphere at `pos` with `radius`.
    pub fn occupancy_box(&self, pos: Vector3<f32>, radius: f32) -> CellRange {
        let extent = Vector3::new(radius, radius, radius);

        CellRange {
            min: self.min_corner(pos - extent),
            max: self.max_corner(pos + extent),
        }
    }

    fn index(&self, cell: Cell) -> usize {
        cell[0] + self.size[0] * (cell[1] + self.size[1] * cell[2])
    }

    /// Keys registered in `cell`, `None` if the cell is outside of the grid.
    pub fn cell(&self, cell: Cell) -> Option<&HashSet<T>> {
        if (0..3).all(|axis| cell[axis] < self.size[axis]) {
            Some(&self.cells[self.index(cell)])
        } else {
            None
        }
    }

    /// Registers `key` in every cell covered by the sphere. Inserting twice has no further effect.
    pub fn insert(&mut self, pos: Vector3<f32>, radius: f32, key: T) {
        let range = self.occupancy_box(pos, radius);
        trace!("insert into {} cells of {:?}", range.len(), range);

        for cell in range.cells() {
            let index = self.index(cell);
            self.cells[index].insert(key.clone());
        }
    }

    /// Unregisters `key` from every cell covered by the sphere, ignoring cells
    /// that do not hold it.
    pub fn remove(&mut self, pos: Vector3<f32>, radius: f32, key: &T) {
        let range = self.occupancy_box(pos, radius);
        trace!("remove from {} cells of {:?}", range.len(), range);

        for cell in range.cells() {
            let index = self.index(cell);
            self.cells[index].remove(key);
        }
    }

    /// Adds every key registered in a cell covered by the sphere to `proximity`.
    ///
    /// Keys already in `proximity` are kept, so results of several queries can be
    /// accumulated in one set.
    pub fn proximity_set(&self, pos: Vector3<f32>, radius: f32, proximity: &mut HashSet<T>) {
        for cell in self.occupancy_box(pos, radius).cells() {
            proximity.extend(self.cells[self.index(cell)].iter().cloned());
        }
    }

    /// Keys registered near the sphere, in a fresh set.
    pub fn proximity(&self, pos: Vector3<f32>, radius: f32) -> HashSet<T> {
        let mut proximity = HashSet::new();
        self.proximity_set(pos, radius, &mut proximity);
        proximity
    }

    /// Unregisters all keys, keeping the grid dimensions.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(HashSet::is_empty)
    }
}

/// Converts a rounded, scaled coordinate to a cell index in `[0, dim - 1]`.
fn clamp_to_axis(coord: f32, dim: usize) -> usize {
    let last = dim - 1;

    // Also maps NaN to the first cell
    if !(coord > 0.0) {
        0
    } else if coord >= last as f32 {
        last
    } else {
        coord as usize
    }
}
