use geom::{Aabb, Vector3};

/// Number of children of an internal octree node.
pub const OCTANT_COUNT: usize = 8;

/// Index of the octant of `aabb` that holds `point`.
///
/// Octants are numbered `i + 2 * j + 4 * k`, where `i`, `j` and `k` select the
/// lower (0) or upper (1) half along x, y and z. Points on a midpoint plane belong
/// to the upper half. Points outside of `aabb` are routed to the closest octant.
pub fn octant_index(aabb: &Aabb, point: Vector3<f32>) -> usize {
    let center = center(aabb);

    let i = (point.x >= center.x) as usize;
    let j = (point.y >= center.y) as usize;
    let k = (point.z >= center.z) as usize;

    i + 2 * j + 4 * k
}

/// Bounds of the octant with the given index, see [`octant_index`](fn.octant_index.html).
pub fn octant(aabb: &Aabb, index: usize) -> Aabb {
    debug_assert!(index < OCTANT_COUNT);

    let &Aabb { min, max } = aabb;
    let center = center(aabb);

    let (min_x, max_x) = if index & 1 == 0 { (min.x, center.x) } else { (center.x, max.x) };
    let (min_y, max_y) = if index & 2 == 0 { (min.y, center.y) } else { (center.y, max.y) };
    let (min_z, max_z) = if index & 4 == 0 { (min.z, center.z) } else { (center.z, max.z) };

    Aabb {
        min: Vector3::new(min_x, min_y, min_z),
        max: Vector3::new(max_x, max_y, max_z),
    }
}

pub fn octants(aabb: &Aabb) -> [Aabb; OCTANT_COUNT] {
    [
        octant(aabb, 0),
        octant(aabb, 1),
        octant(aabb, 2),
        octant(aabb, 3),
        octant(aabb, 4),
        octant(aabb, 5),
        octant(aabb, 6),
        octant(aabb, 7),
    ]
}

fn center(aabb: &Aabb) -> Vector3<f32> {
    let &Aabb { min, max } = aabb;
    min + 0.5 * (max - min)
}

/// Grows the box on every side by `fraction` of its extent along that axis.
pub fn enlarged(aabb: &Aabb, fraction: f32) -> Aabb {
    let &Aabb { min, max } = aabb;
    let margin = fraction * (max - min);

    Aabb {
        min: min - margin,
        max: max + margin,
    }
}

/// Smallest box enclosing all given points, `None` if there are none.
pub fn enclosing<I>(points: I) -> Option<Aabb>
where
    I: IntoIterator<Item = Vector3<f32>>,
{
    points.into_iter().fold(None, |bounds, p| {
        Some(match bounds {
            None => Aabb { min: p, max: p },
            Some(Aabb { min, max }) => Aabb {
                min: Vector3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z)),
                max: Vector3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z)),
            },
        })
    })
}

pub fn distance2(a: Vector3<f32>, b: Vector3<f32>) -> f32 {
    let d = a - b;
    d.x * d.x + d.y * d.y + d.z * d.z
}

/// Squared distance from `point` to the closest point of `aabb`, zero when inside.
pub fn distance2_to_aabb(aabb: &Aabb, point: Vector3<f32>) -> f32 {
    let axis = |p: f32, min: f32, max: f32| {
        if p < min {
            min - p
        } else if p > max {
            p - max
        } else {
            0.0
        }
    };

    let dx = axis(point.x, aabb.min.x, aabb.max.x);
    let dy = axis(point.y, aabb.min.y, aabb.max.y);
    let dz = axis(point.z, aabb.min.z, aabb.max.z);

    dx * dx + dy * dy + dz * dz
}
