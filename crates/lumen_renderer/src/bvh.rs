//! Bounding Volume Hierarchy (BVH) over scene triangles.
//!
//! Nodes live in a flat array with the root at index 0 and children
//! referenced by index. Every node covers an inclusive range
//! `[start, end]` of a permuted triangle-index array; building reorders
//! that array so each subtree's triangles are contiguous. The tree is
//! read-only once built, which makes it safe to share across render
//! threads and trivial to write to disk.

use std::time::{Duration, Instant};

use lumen_core::Triangle;
use lumen_math::{Aabb, Axis, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::BvhError;

/// Default maximum primitives per leaf node.
pub const DEFAULT_LEAF_SIZE: usize = 5;

/// How inner nodes choose their split.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitMode {
    /// Midpoint of the longest centroid extent, in-place partition
    #[default]
    Spatial,
    /// Surface area heuristic over sorted centroids
    Sah,
}

impl SplitMode {
    pub(crate) fn to_u32(self) -> u32 {
        match self {
            SplitMode::Spatial => 0,
            SplitMode::Sah => 1,
        }
    }

    pub(crate) fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(SplitMode::Spatial),
            1 => Some(SplitMode::Sah),
            _ => None,
        }
    }
}

/// Build parameters, passed explicitly to every build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BvhConfig {
    pub mode: SplitMode,
    pub max_leaf_size: usize,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            mode: SplitMode::Spatial,
            max_leaf_size: DEFAULT_LEAF_SIZE,
        }
    }
}

/// One node of the flat tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BvhNode {
    /// Tight bounds of all triangles in the range
    pub bounds: Aabb,
    /// First index-array slot covered (inclusive)
    pub start: usize,
    /// Last index-array slot covered (inclusive)
    pub end: usize,
    /// Left and right child node indices, `None` for a leaf
    pub children: Option<[usize; 2]>,
}

impl BvhNode {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Number of primitives in the range.
    #[inline]
    pub fn prim_count(&self) -> usize {
        self.end + 1 - self.start
    }
}

/// Build statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BvhStats {
    pub node_count: usize,
    pub leaf_count: usize,
    pub max_depth: usize,
    pub max_leaf_prims: usize,
    pub build_time: Duration,
}

/// A built hierarchy plus the permuted triangle indices it refers to.
#[derive(Clone, Debug)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    indices: Vec<u32>,
    config: BvhConfig,
    stats: BvhStats,
}

impl Bvh {
    /// Build a hierarchy over all triangles.
    pub fn build(triangles: &[Triangle], config: BvhConfig) -> Result<Self, BvhError> {
        if triangles.is_empty() {
            return Err(BvhError::EmptyScene);
        }
        let indices: Vec<u32> = (0..triangles.len() as u32).collect();
        let end = indices.len() - 1;
        Self::build_range(triangles, indices, 0, end, config)
    }

    /// Build a hierarchy over `indices[start..=end]`.
    ///
    /// Slots outside the range are carried along untouched. An inverted
    /// or out-of-bounds range is rejected before anything is built.
    pub fn build_range(
        triangles: &[Triangle],
        mut indices: Vec<u32>,
        start: usize,
        end: usize,
        config: BvhConfig,
    ) -> Result<Self, BvhError> {
        if end < start {
            return Err(BvhError::InvertedRange { start, end });
        }
        if end >= indices.len() {
            return Err(BvhError::RangeOutOfBounds {
                start,
                end,
                len: indices.len(),
            });
        }
        if config.max_leaf_size == 0 {
            return Err(BvhError::InvalidLeafSize);
        }
        if let Some(&index) = indices[start..=end]
            .iter()
            .find(|&&i| i as usize >= triangles.len())
        {
            return Err(BvhError::IndexOutOfRange {
                index,
                triangle_count: triangles.len(),
            });
        }

        let timer = Instant::now();
        let count = end + 1 - start;
        let mut builder = Builder {
            triangles,
            config,
            indices: &mut indices,
            nodes: Vec::with_capacity(2 * count.div_ceil(config.max_leaf_size)),
        };
        builder.build(start, end)?;
        let nodes = builder.nodes;

        let mut stats = compute_stats(&nodes);
        stats.build_time = timer.elapsed();

        log::info!(
            "BVH built ({:?}) in {:.2?}: {} nodes, {} leaves, depth {}, {} triangles",
            config.mode,
            stats.build_time,
            stats.node_count,
            stats.leaf_count,
            stats.max_depth,
            count
        );

        Ok(Self {
            nodes,
            indices,
            config,
            stats,
        })
    }

    /// Reassemble a hierarchy from stored parts, checking its structure.
    pub(crate) fn from_parts(
        nodes: Vec<BvhNode>,
        indices: Vec<u32>,
        config: BvhConfig,
        triangle_count: usize,
    ) -> Result<Self, String> {
        check_structure(&nodes, &indices, triangle_count)?;
        let stats = compute_stats(&nodes);
        Ok(Self {
            nodes,
            indices,
            config,
            stats,
        })
    }

    #[inline]
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Root node (index 0).
    #[inline]
    pub fn root(&self) -> &BvhNode {
        &self.nodes[0]
    }

    /// Permuted triangle indices; node ranges index into this.
    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Triangle ids covered by a node.
    #[inline]
    pub fn prims(&self, node: &BvhNode) -> &[u32] {
        &self.indices[node.start..=node.end]
    }

    #[inline]
    pub fn config(&self) -> BvhConfig {
        self.config
    }

    #[inline]
    pub fn stats(&self) -> BvhStats {
        self.stats
    }
}

struct Builder<'a> {
    triangles: &'a [Triangle],
    config: BvhConfig,
    indices: &'a mut [u32],
    nodes: Vec<BvhNode>,
}

impl Builder<'_> {
    /// Build iteratively; children are allocated as adjacent pairs.
    fn build(&mut self, start: usize, end: usize) -> Result<(), BvhError> {
        let root = self.leaf(start, end);
        self.nodes.push(root);
        let mut work = vec![0usize];

        while let Some(node_idx) = work.pop() {
            let BvhNode { start, end, .. } = self.nodes[node_idx];
            if end < start {
                return Err(BvhError::InvertedRange { start, end });
            }
            if end + 1 - start <= self.config.max_leaf_size {
                continue;
            }

            let split = match self.config.mode {
                SplitMode::Spatial => self.split_spatial(start, end),
                SplitMode::Sah => self.split_sah(start, end),
            };
            if split <= start || split > end {
                return Err(BvhError::EmptyChild { start, end, split });
            }

            let left = self.nodes.len();
            let (left_node, right_node) = (self.leaf(start, split - 1), self.leaf(split, end));
            self.nodes.push(left_node);
            self.nodes.push(right_node);
            self.nodes[node_idx].children = Some([left, left + 1]);

            log::trace!(
                "Split [{}, {}] at {} into nodes {} and {}",
                start,
                end,
                split,
                left,
                left + 1
            );

            work.push(left + 1);
            work.push(left);
        }
        Ok(())
    }

    fn leaf(&self, start: usize, end: usize) -> BvhNode {
        BvhNode {
            bounds: self.range_bounds(start, end),
            start,
            end,
            children: None,
        }
    }

    fn range_bounds(&self, start: usize, end: usize) -> Aabb {
        self.indices[start..=end]
            .iter()
            .fold(Aabb::EMPTY, |acc, &i| {
                Aabb::surrounding(&acc, &self.triangles[i as usize].bounds())
            })
    }

    #[inline]
    fn centroid(&self, index: u32) -> Vec3 {
        self.triangles[index as usize].centroid()
    }

    /// Partition around the midpoint of the longest centroid extent.
    ///
    /// Triangles whose centroid lies strictly above the midpoint go right.
    /// Falls back to a median split when the centroids coincide or the
    /// partition leaves one side empty.
    fn split_spatial(&mut self, start: usize, end: usize) -> usize {
        let mut centroid_bounds = Aabb::EMPTY;
        for &i in &self.indices[start..=end] {
            centroid_bounds.grow(self.centroid(i));
        }

        let axis = centroid_bounds.longest_axis();
        let a = axis.index();
        let extent = centroid_bounds.extent()[a];
        if !(extent > 0.0) {
            log::debug!(
                "Zero centroid extent over [{}, {}], splitting by count",
                start,
                end
            );
            return start + (end + 1 - start) / 2;
        }

        let mid = centroid_bounds.min[a] + extent * 0.5;
        let range = &mut self.indices[start..=end];
        let mut left = 0;
        let mut right = range.len();
        while left < right {
            if self.triangles[range[left] as usize].centroid()[a] > mid {
                right -= 1;
                range.swap(left, right);
            } else {
                left += 1;
            }
        }

        if left == 0 || left == range.len() {
            return self.split_median(start, end, axis);
        }
        start + left
    }

    fn split_median(&mut self, start: usize, end: usize, axis: Axis) -> usize {
        let a = axis.index();
        let triangles = self.triangles;
        let range = &mut self.indices[start..=end];
        let half = range.len() / 2;
        range.select_nth_unstable_by(half, |&x, &y| {
            triangles[x as usize].centroid()[a].total_cmp(&triangles[y as usize].centroid()[a])
        });
        start + half
    }

    /// Surface area heuristic: per axis, sort by centroid and score every
    /// split position with `left_count * left_area + right_count * right_area`.
    /// Strictly lower cost wins, so earlier axes and positions win ties.
    fn split_sah(&mut self, start: usize, end: usize) -> usize {
        let count = end + 1 - start;
        let triangles = self.triangles;

        let mut best_cost = f32::INFINITY;
        let mut best_pos = count / 2;
        let mut best_order: Option<Vec<u32>> = None;
        let mut right_areas = vec![0.0f32; count];

        for axis in Axis::ALL {
            let a = axis.index();
            let mut order = self.indices[start..=end].to_vec();
            order.sort_by(|&x, &y| {
                triangles[x as usize].centroid()[a].total_cmp(&triangles[y as usize].centroid()[a])
            });

            // right_areas[i]: area of the box over order[i..]
            let mut acc = Aabb::EMPTY;
            for i in (0..count).rev() {
                acc = Aabb::surrounding(&acc, &triangles[order[i] as usize].bounds());
                right_areas[i] = acc.surface_area();
            }

            let mut left = Aabb::EMPTY;
            let mut improved = false;
            for pos in 1..count {
                left = Aabb::surrounding(&left, &triangles[order[pos - 1] as usize].bounds());
                let cost =
                    pos as f32 * left.surface_area() + (count - pos) as f32 * right_areas[pos];
                if cost < best_cost {
                    best_cost = cost;
                    best_pos = pos;
                    improved = true;
                }
            }
            if improved || best_order.is_none() {
                best_order = Some(order);
            }
        }

        if let Some(order) = best_order {
            self.indices[start..=end].copy_from_slice(&order);
        }
        start + best_pos
    }
}

fn compute_stats(nodes: &[BvhNode]) -> BvhStats {
    let mut stats = BvhStats {
        node_count: nodes.len(),
        ..Default::default()
    };
    if nodes.is_empty() {
        return stats;
    }

    let mut stack = vec![(0usize, 1usize)];
    while let Some((idx, depth)) = stack.pop() {
        let node = &nodes[idx];
        stats.max_depth = stats.max_depth.max(depth);
        match node.children {
            Some([l, r]) => {
                stack.push((l, depth + 1));
                stack.push((r, depth + 1));
            }
            None => {
                stats.leaf_count += 1;
                stats.max_leaf_prims = stats.max_leaf_prims.max(node.prim_count());
            }
        }
    }
    stats
}

/// Structural checks for a hierarchy that did not come from the builder.
fn check_structure(nodes: &[BvhNode], indices: &[u32], triangle_count: usize) -> Result<(), String> {
    if nodes.is_empty() {
        return Err("no nodes".into());
    }
    if indices.len() != triangle_count {
        return Err(format!(
            "{} primitive indices for {} triangles",
            indices.len(),
            triangle_count
        ));
    }
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= triangle_count) {
        return Err(format!("primitive index {} out of range", bad));
    }

    for (idx, node) in nodes.iter().enumerate() {
        if node.end < node.start || node.end >= indices.len() {
            return Err(format!(
                "node {} has invalid range [{}, {}]",
                idx, node.start, node.end
            ));
        }
        if let Some([l, r]) = node.children {
            // Children always follow their parent, which also rules out cycles
            if l <= idx || r <= idx || l >= nodes.len() || r >= nodes.len() {
                return Err(format!("node {} has invalid children {} / {}", idx, l, r));
            }
            let (left, right) = (&nodes[l], &nodes[r]);
            if left.start != node.start || left.end + 1 != right.start || right.end != node.end {
                return Err(format!("children of node {} do not split its range", idx));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::TriangleSource;

    /// A row of small triangles along +X, one per unit.
    fn strip(count: usize) -> (Vec<Vec3>, Vec<Triangle>) {
        let mut positions = Vec::new();
        let mut triangles = Vec::new();
        for i in 0..count {
            let x = i as f32;
            let base = positions.len() as u32;
            positions.extend_from_slice(&[
                Vec3::new(x, 0.0, 0.0),
                Vec3::new(x + 0.5, 0.0, 0.0),
                Vec3::new(x, 0.5, 0.0),
            ]);
            let source = TriangleSource {
                submesh: 0,
                index: i as u32,
            };
            triangles.push(Triangle::new(&positions, [base, base + 1, base + 2], source));
        }
        (positions, triangles)
    }

    fn assert_well_formed(bvh: &Bvh, triangles: &[Triangle]) {
        let mut seen = vec![0u32; triangles.len()];
        for node in bvh.nodes() {
            for &i in bvh.prims(node) {
                let b = triangles[i as usize].bounds();
                assert!(node.bounds.contains_point(b.min, 0.0));
                assert!(node.bounds.contains_point(b.max, 0.0));
            }
            if node.is_leaf() {
                assert!(node.prim_count() <= bvh.config().max_leaf_size);
                for &i in bvh.prims(node) {
                    seen[i as usize] += 1;
                }
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_empty_scene() {
        assert_eq!(
            Bvh::build(&[], BvhConfig::default()).unwrap_err(),
            BvhError::EmptyScene
        );
    }

    #[test]
    fn test_single_leaf() {
        let (_, triangles) = strip(3);
        let bvh = Bvh::build(&triangles, BvhConfig::default()).unwrap();

        assert_eq!(bvh.nodes().len(), 1);
        assert!(bvh.root().is_leaf());
        assert_eq!((bvh.root().start, bvh.root().end), (0, 2));
        assert_eq!(bvh.stats().leaf_count, 1);
        assert_eq!(bvh.stats().max_depth, 1);
    }

    #[test]
    fn test_spatial_split() {
        let (_, triangles) = strip(40);
        let bvh = Bvh::build(&triangles, BvhConfig::default()).unwrap();
        assert_well_formed(&bvh, &triangles);

        // Root splits at the centroid midpoint along X
        let [l, r] = bvh.root().children.unwrap();
        let left_max = bvh.nodes()[l].bounds.max.x;
        let right_min = bvh.nodes()[r].bounds.min.x;
        assert!(left_max <= right_min);

        let stats = bvh.stats();
        assert_eq!(stats.node_count, bvh.nodes().len());
        assert_eq!(stats.node_count, 2 * stats.leaf_count - 1);
        assert!(stats.max_leaf_prims <= DEFAULT_LEAF_SIZE);
    }

    #[test]
    fn test_sah_split() {
        let (_, triangles) = strip(40);
        let config = BvhConfig {
            mode: SplitMode::Sah,
            ..Default::default()
        };
        let bvh = Bvh::build(&triangles, config).unwrap();
        assert_well_formed(&bvh, &triangles);
        assert_eq!(bvh.config().mode, SplitMode::Sah);
    }

    #[test]
    fn test_coincident_centroids_still_split() {
        // Same triangle repeated: no centroid extent at all
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let source = TriangleSource {
            submesh: 0,
            index: 0,
        };
        let triangles: Vec<Triangle> = (0..12)
            .map(|_| Triangle::new(&positions, [0, 1, 2], source))
            .collect();

        for mode in [SplitMode::Spatial, SplitMode::Sah] {
            let config = BvhConfig {
                mode,
                ..Default::default()
            };
            let bvh = Bvh::build(&triangles, config).unwrap();
            assert_well_formed(&bvh, &triangles);
        }
    }

    #[test]
    fn test_invalid_ranges() {
        let (_, triangles) = strip(8);
        let indices: Vec<u32> = (0..8).collect();

        assert_eq!(
            Bvh::build_range(&triangles, indices.clone(), 5, 2, BvhConfig::default()).unwrap_err(),
            BvhError::InvertedRange { start: 5, end: 2 }
        );
        assert!(matches!(
            Bvh::build_range(&triangles, indices.clone(), 0, 8, BvhConfig::default()),
            Err(BvhError::RangeOutOfBounds { .. })
        ));

        let config = BvhConfig {
            max_leaf_size: 0,
            ..Default::default()
        };
        assert_eq!(
            Bvh::build_range(&triangles, indices, 0, 7, config).unwrap_err(),
            BvhError::InvalidLeafSize
        );

        assert!(matches!(
            Bvh::build_range(&triangles, vec![0, 1, 99], 0, 2, BvhConfig::default()),
            Err(BvhError::IndexOutOfRange { index: 99, .. })
        ));
    }

    #[test]
    fn test_sub_range_leaves_other_slots() {
        let (_, triangles) = strip(20);
        let indices: Vec<u32> = (0..20).rev().collect();
        let bvh = Bvh::build_range(&triangles, indices, 5, 14, BvhConfig::default()).unwrap();

        assert_eq!((bvh.root().start, bvh.root().end), (5, 14));
        assert_eq!(&bvh.indices()[..5], &[19, 18, 17, 16, 15]);
        assert_eq!(&bvh.indices()[15..], &[4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_structure_check() {
        let (_, triangles) = strip(30);
        let bvh = Bvh::build(&triangles, BvhConfig::default()).unwrap();
        let rebuilt = Bvh::from_parts(
            bvh.nodes().to_vec(),
            bvh.indices().to_vec(),
            bvh.config(),
            triangles.len(),
        )
        .unwrap();
        assert_eq!(rebuilt.nodes(), bvh.nodes());
        assert_eq!(rebuilt.stats().leaf_count, bvh.stats().leaf_count);

        let mut nodes = bvh.nodes().to_vec();
        nodes[0].children = Some([0, 1]);
        assert!(Bvh::from_parts(nodes, bvh.indices().to_vec(), bvh.config(), 30).is_err());
        assert!(Bvh::from_parts(bvh.nodes().to_vec(), bvh.indices().to_vec(), bvh.config(), 31).is_err());
    }
}
