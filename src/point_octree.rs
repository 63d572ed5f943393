use crate::config::OctreeConfig;
use crate::error::ConfigError;
use crate::octants::{
    distance2, distance2_to_aabb, enclosing, enlarged, octant, octant_index, octants,
    OCTANT_COUNT,
};
use geom::{Aabb, Vector3};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::iter::FromIterator;
use std::mem;

/// Stable identifier of a point in a [`PointOctree`](struct.PointOctree.html),
/// equal to the number of points inserted before it.
pub type PointId = usize;

/// Fraction of the extent added on each side of the root box, so that points on
/// the faces of the requested box are not on the outer boundary of the tree.
const ROOT_MARGIN: f32 = 0.01;

/// Result of a closest point query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    pub id: PointId,
    pub position: Vector3<f32>,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(Vec<PointId>),
    /// Index of the first of eight consecutive children, in octant order.
    Internal(usize),
}

/// Octree over a fixed box for closest point queries.
///
/// Nodes live in a flat arena with the root at index 0. A leaf is split into
/// eight octants once it holds more than `fan_out` points, unless it is already
/// at `max_depth`, in which case it keeps collecting points that are
/// indistinguishable at that resolution.
///
/// Points are never moved or removed, so ids stay valid for the lifetime of the tree.
/// Inserted points must lie inside the box given on construction.
#[derive(Debug)]
pub struct PointOctree {
    bounds: Aabb,
    config: OctreeConfig,
    nodes: Vec<Node>,
    points: Vec<Vector3<f32>>,
}

struct Search<'a> {
    query: Vector3<f32>,
    radius2: f32,
    exclude: &'a HashSet<PointId>,
    best: Option<(PointId, f32)>,
}

impl<'a> Search<'a> {
    /// Candidates farther away than this cannot improve the result.
    fn bound(&self) -> f32 {
        self.best.map_or(self.radius2, |(_, best2)| best2)
    }

    fn consider(&mut self, id: PointId, position: Vector3<f32>) {
        if self.exclude.contains(&id) {
            return;
        }

        let dist2 = distance2(self.query, position);
        if dist2 > self.bound() {
            return;
        }

        let improves = match self.best {
            None => true,
            // Equidistant candidates resolve to the lowest id
            Some((best_id, best2)) => dist2 < best2 || (dist2 == best2 && id < best_id),
        };

        if improves {
            self.best = Some((id, dist2));
        }
    }
}

impl PointOctree {
    /// Creates an empty tree spanning `bounds` with the default configuration.
    pub fn new(bounds: Aabb) -> PointOctree {
        PointOctree::build(bounds, OctreeConfig::default())
    }

    pub fn with_config(bounds: Aabb, config: OctreeConfig) -> Result<PointOctree, ConfigError> {
        config.validate()?;
        Ok(PointOctree::build(bounds, config))
    }

    fn build(bounds: Aabb, config: OctreeConfig) -> PointOctree {
        debug!(
            "point octree over {:?}..{:?}, fan-out {}, max depth {}",
            bounds.min, bounds.max, config.fan_out, config.max_depth
        );

        PointOctree {
            bounds: enlarged(&bounds, ROOT_MARGIN),
            config,
            nodes: vec![Node::Leaf(Vec::new())],
            points: Vec::new(),
        }
    }

    /// Bounds of the root node, slightly larger than the box the tree was built with.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn config(&self) -> OctreeConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, id: PointId) -> Option<Vector3<f32>> {
        self.points.get(id).cloned()
    }

    /// All points in insertion order, paired with their ids.
    pub fn points<'a>(&'a self) -> impl Iterator<Item = (PointId, Vector3<f32>)> + 'a {
        self.points.iter().cloned().enumerate()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Level of the deepest node, zero while the root is still a leaf.
    pub fn depth(&self) -> usize {
        self.node_depth(0)
    }

    fn node_depth(&self, node: usize) -> usize {
        match self.nodes[node] {
            Node::Leaf(_) => 0,
            Node::Internal(first_child) => {
                1 + (first_child..first_child + OCTANT_COUNT)
                    .map(|child| self.node_depth(child))
                    .max()
                    .unwrap_or(0)
            }
        }
    }

    /// Adds a point and returns its id.
    pub fn insert_point(&mut self, point: Vector3<f32>) -> PointId {
        let id = self.points.len();
        self.points.push(point);

        let (leaf, bounds, depth) = self.locate_leaf(point);
        let fan_out = self.config.fan_out;

        let overflowing = match self.nodes[leaf] {
            Node::Leaf(ref mut ids) => {
                ids.push(id);
                ids.len() > fan_out
            }
            Node::Internal(_) => false,
        };

        if overflowing && depth < self.config.max_depth {
            self.split(leaf, bounds, depth);
        }

        id
    }

    /// Walks down to the leaf whose box contains `point`.
    fn locate_leaf(&self, point: Vector3<f32>) -> (usize, Aabb, usize) {
        let mut node = 0;
        let mut bounds = self.bounds;
        let mut depth = 0;

        while let Node::Internal(first_child) = self.nodes[node] {
            let index = octant_index(&bounds, point);
            bounds = octant(&bounds, index);
            node = first_child + index;
            depth += 1;
        }

        (node, bounds, depth)
    }

    /// Turns the leaf `node` into an internal node and hands its points down to
    /// eight new leaves, splitting those again while they overflow.
    fn split(&mut self, node: usize, bounds: Aabb, depth: usize) {
        let ids = match self.nodes[node] {
            Node::Leaf(ref mut ids) => mem::replace(ids, Vec::new()),
            Node::Internal(_) => return,
        };

        let first_child = self.nodes.len();
        self.nodes
            .extend((0..OCTANT_COUNT).map(|_| Node::Leaf(Vec::new())));
        self.nodes[node] = Node::Internal(first_child);

        trace!(
            "split node {} at depth {} holding {} points",
            node,
            depth,
            ids.len()
        );

        for id in ids {
            let index = octant_index(&bounds, self.points[id]);
            if let Node::Leaf(ref mut child) = self.nodes[first_child + index] {
                child.push(id);
            }
        }

        if depth + 1 >= self.config.max_depth {
            return;
        }

        for index in 0..OCTANT_COUNT {
            let child = first_child + index;
            let overflowing = match self.nodes[child] {
                Node::Leaf(ref ids) => ids.len() > self.config.fan_out,
                Node::Internal(_) => false,
            };

            if overflowing {
                self.split(child, octant(&bounds, index), depth + 1);
            }
        }
    }

    /// Closest point within `radius` of `query`, `None` if there is none.
    ///
    /// A point exactly `radius` away counts as within range. Among points at the
    /// same distance, the one with the lowest id is returned.
    pub fn find_closest(&self, query: Vector3<f32>, radius: f32) -> Option<Nearest> {
        self.find_closest_excluding(query, radius, &HashSet::new())
    }

    /// Like [`find_closest`](#method.find_closest), but ignores the points in `exclude`.
    pub fn find_closest_excluding(
        &self,
        query: Vector3<f32>,
        radius: f32,
        exclude: &HashSet<PointId>,
    ) -> Option<Nearest> {
        // Also rejects NaN
        if !(radius >= 0.0) {
            return None;
        }

        let mut search = Search {
            query,
            radius2: radius * radius,
            exclude,
            best: None,
        };

        self.search_node(0, &self.bounds, &mut search);

        search.best.map(|(id, _)| Nearest {
            id,
            position: self.points[id],
        })
    }

    fn search_node(&self, node: usize, bounds: &Aabb, search: &mut Search) {
        match self.nodes[node] {
            Node::Leaf(ref ids) => {
                for &id in ids {
                    search.consider(id, self.points[id]);
                }
            }
            Node::Internal(first_child) => {
                let children = octants(bounds);

                let mut order = [(0.0_f32, 0_usize); OCTANT_COUNT];
                for (index, child) in children.iter().enumerate() {
                    order[index] = (distance2_to_aabb(child, search.query), index);
                }
                order.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

                for &(lower_bound, index) in &order {
                    // Sorted, so every remaining child is at least as far away
                    if lower_bound > search.bound() {
                        break;
                    }
                    self.search_node(first_child + index, &children[index], search);
                }
            }
        }
    }
}

impl FromIterator<Vector3<f32>> for PointOctree {
    /// Builds a tree with the default configuration spanning exactly the given
    /// points, inserted in iteration order.
    fn from_iter<I>(points: I) -> PointOctree
    where
        I: IntoIterator<Item = Vector3<f32>>,
    {
        let points: Vec<Vector3<f32>> = points.into_iter().collect();
        let bounds = enclosing(points.iter().cloned()).unwrap_or(Aabb {
            min: Vector3::new(0.0, 0.0, 0.0),
            max: Vector3::new(0.0, 0.0, 0.0),
        });

        let mut tree = PointOctree::new(bounds);
        for point in points {
            tree.insert_point(point);
        }
        tree
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn world() -> Aabb {
        Aabb {
            min: Vector3::new(-10.0, -10.0, -10.0),
            max: Vector3::new(10.0, 10.0, 10.0),
        }
    }

    fn random_point(rng: &mut StdRng) -> Vector3<f32> {
        Vector3::new(
            rng.gen_range(-10.0..10.0),
            rng.gen_range(-10.0..10.0),
            rng.gen_range(-10.0..10.0),
        )
    }

    fn make_random_tree(count: usize, fan_out: usize) -> (PointOctree, Vec<Vector3<f32>>) {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let config = OctreeConfig::default().with_fan_out(fan_out);
        let mut tree = PointOctree::with_config(world(), config).unwrap();

        let points: Vec<_> = (0..count).map(|_| random_point(&mut rng)).collect();
        for (expected_id, &p) in points.iter().enumerate() {
            assert_eq!(tree.insert_point(p), expected_id);
        }

        (tree, points)
    }

    /// Linear scan with the same range and tie-breaking rules as the tree.
    fn brute_force(
        points: &[Vector3<f32>],
        query: Vector3<f32>,
        radius: f32,
        exclude: &HashSet<PointId>,
    ) -> Option<PointId> {
        points
            .iter()
            .enumerate()
            .filter(|&(id, _)| !exclude.contains(&id))
            .map(|(id, &p)| (id, distance2(query, p)))
            .filter(|&(_, d2)| d2 <= radius * radius)
            .fold(None, |best: Option<(PointId, f32)>, (id, d2)| match best {
                Some((_, best2)) if best2 <= d2 => best,
                _ => Some((id, d2)),
            })
            .map(|(id, _)| id)
    }

    #[test]
    fn test_closest_with_and_without_exclusion() {
        let mut tree = PointOctree::new(world());
        let p0 = tree.insert_point(Vector3::new(0.0, 0.0, 0.0));
        let p1 = tree.insert_point(Vector3::new(1.0, 0.0, 0.0));
        tree.insert_point(Vector3::new(5.0, 5.0, 5.0));

        let query = Vector3::new(0.1, 0.0, 0.0);

        let nearest = tree.find_closest(query, 100.0).unwrap();
        assert_eq!(nearest.id, p0);
        assert_eq!(nearest.position, Vector3::new(0.0, 0.0, 0.0));

        let exclude: HashSet<PointId> = vec![p0].into_iter().collect();
        let nearest = tree.find_closest_excluding(query, 100.0, &exclude).unwrap();
        assert_eq!(nearest.id, p1);
    }

    #[test]
    fn test_empty_tree_finds_nothing() {
        let tree = PointOctree::new(world());
        assert!(tree.is_empty());
        assert!(tree.find_closest(Vector3::new(0.0, 0.0, 0.0), ::std::f32::INFINITY).is_none());
    }

    #[test]
    fn test_unbounded_search_matches_linear_scan() {
        let (tree, points) = make_random_tree(600, 4);
        let mut rng = StdRng::seed_from_u64(17);
        let no_exclusion = HashSet::new();

        assert!(tree.depth() > 1, "600 points should subdivide the tree");

        for _ in 0..300 {
            let query = random_point(&mut rng);
            let expected = brute_force(&points, query, ::std::f32::INFINITY, &no_exclusion);
            let actual = tree.find_closest(query, ::std::f32::INFINITY).map(|n| n.id);
            assert_eq!(actual, expected, "closest point to {:?}", query);
        }
    }

    #[test]
    fn test_radius_search_matches_linear_scan() {
        let (tree, points) = make_random_tree(400, 8);
        let mut rng = StdRng::seed_from_u64(23);
        let no_exclusion = HashSet::new();

        let mut found = 0;
        let mut missed = 0;

        for _ in 0..400 {
            let query = random_point(&mut rng);
            let radius = rng.gen_range(0.0..2.5);

            let expected = brute_force(&points, query, radius, &no_exclusion);
            let actual = tree.find_closest(query, radius).map(|n| n.id);
            assert_eq!(actual, expected, "query {:?} radius {}", query, radius);

            if actual.is_some() {
                found += 1;
            } else {
                missed += 1;
            }
        }

        assert!(found > 0 && missed > 0, "radii should produce both outcomes");
    }

    #[test]
    fn test_excluded_points_are_never_returned() {
        let (tree, points) = make_random_tree(300, 2);
        let mut rng = StdRng::seed_from_u64(31);

        for _ in 0..200 {
            let query = random_point(&mut rng);
            let nearest = tree.find_closest(query, 5.0);

            if let Some(nearest) = nearest {
                let mut exclude = HashSet::new();
                exclude.insert(nearest.id);
                exclude.insert(rng.gen_range(0..points.len()));

                let second = tree.find_closest_excluding(query, 5.0, &exclude);
                assert!(second.map_or(true, |n| !exclude.contains(&n.id)));
                assert_eq!(
                    second.map(|n| n.id),
                    brute_force(&points, query, 5.0, &exclude)
                );
            }
        }
    }

    #[test]
    fn test_point_exactly_on_radius_is_found() {
        let mut tree = PointOctree::new(world());
        let id = tree.insert_point(Vector3::new(3.0, 0.0, 0.0));

        let origin = Vector3::new(0.0, 0.0, 0.0);
        assert_eq!(tree.find_closest(origin, 3.0).map(|n| n.id), Some(id));
        assert!(tree.find_closest(origin, 2.99).is_none());
    }

    #[test]
    fn test_negative_or_nan_radius_finds_nothing() {
        let mut tree = PointOctree::new(world());
        tree.insert_point(Vector3::new(0.0, 0.0, 0.0));

        let origin = Vector3::new(0.0, 0.0, 0.0);
        assert!(tree.find_closest(origin, -1.0).is_none());
        assert!(tree.find_closest(origin, ::std::f32::NAN).is_none());
    }

    #[test]
    fn test_equidistant_points_resolve_to_lowest_id() {
        let config = OctreeConfig::default().with_fan_out(1);
        let mut tree = PointOctree::with_config(world(), config).unwrap();

        tree.insert_point(Vector3::new(8.0, 8.0, 8.0));
        let left = tree.insert_point(Vector3::new(-2.0, 0.0, 0.0));
        let right = tree.insert_point(Vector3::new(2.0, 0.0, 0.0));

        let origin = Vector3::new(0.0, 0.0, 0.0);
        assert_eq!(tree.find_closest(origin, 10.0).map(|n| n.id), Some(left));

        let exclude: HashSet<PointId> = vec![left].into_iter().collect();
        assert_eq!(
            tree.find_closest_excluding(origin, 10.0, &exclude).map(|n| n.id),
            Some(right)
        );
    }

    #[test]
    fn test_leaf_splits_once_fan_out_is_exceeded() {
        let config = OctreeConfig::default().with_fan_out(2);
        let mut tree = PointOctree::with_config(world(), config).unwrap();

        tree.insert_point(Vector3::new(-5.0, -5.0, -5.0));
        tree.insert_point(Vector3::new(5.0, 5.0, 5.0));
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.depth(), 0);

        tree.insert_point(Vector3::new(5.0, -5.0, -5.0));
        assert_eq!(tree.node_count(), 9);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_coincident_points_stop_splitting_at_max_depth() {
        let config = OctreeConfig::default().with_fan_out(2).with_max_depth(4);
        let mut tree = PointOctree::with_config(world(), config).unwrap();

        let p = Vector3::new(1.5, -2.5, 3.5);
        for _ in 0..50 {
            tree.insert_point(p);
        }

        assert_eq!(tree.len(), 50);
        assert_eq!(tree.depth(), 4);
        assert_eq!(tree.node_count(), 1 + 4 * OCTANT_COUNT);

        assert_eq!(tree.find_closest(p, 0.0).map(|n| n.id), Some(0));

        let exclude: HashSet<PointId> = (0..49).collect();
        assert_eq!(
            tree.find_closest_excluding(p, 0.0, &exclude).map(|n| n.id),
            Some(49)
        );
    }

    #[test]
    fn test_zero_max_depth_keeps_single_leaf() {
        let config = OctreeConfig::default().with_fan_out(1).with_max_depth(0);
        let mut tree = PointOctree::with_config(world(), config).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..20 {
            tree.insert_point(random_point(&mut rng));
        }

        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.len(), 20);
    }

    #[test]
    fn test_points_on_box_faces_are_found() {
        let mut tree = PointOctree::new(world());
        let corner = tree.insert_point(Vector3::new(10.0, 10.0, 10.0));
        let opposite = tree.insert_point(Vector3::new(-10.0, -10.0, -10.0));

        assert_eq!(
            tree.find_closest(Vector3::new(9.0, 9.0, 9.0), 5.0).map(|n| n.id),
            Some(corner)
        );
        assert_eq!(
            tree.find_closest(Vector3::new(-9.0, -9.0, -9.0), 5.0).map(|n| n.id),
            Some(opposite)
        );

        let bounds = tree.bounds();
        assert!(bounds.min.x < -10.0 && bounds.max.z > 10.0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = OctreeConfig::default().with_fan_out(0);
        assert_eq!(
            PointOctree::with_config(world(), config).unwrap_err(),
            ConfigError::ZeroFanOut
        );
    }

    #[test]
    fn test_collect_from_points() {
        let points = vec![
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(-4.0, 0.5, 2.0),
            Vector3::new(0.0, -1.0, 7.0),
        ];

        let tree: PointOctree = points.iter().cloned().collect();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.point(1), Some(points[1]));
        assert_eq!(tree.point(3), None);
        assert_eq!(
            tree.points().map(|(_, p)| p).collect::<Vec<_>>(),
            points
        );
        assert_eq!(
            tree.find_closest(Vector3::new(0.0, -1.0, 6.0), 2.0).map(|n| n.id),
            Some(2)
        );
    }
}
