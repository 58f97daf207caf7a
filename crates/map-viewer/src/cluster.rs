//! Distance-based point clustering for layers that opt in.
//!
//! Membership is visual grouping only: every point with a position takes part,
//! whether or not it currently matches the filter. A multi-member cluster always
//! shows its full member count. Suppressing clusters whose members are all
//! filtered out would need a product decision first.

use crate::style::Style;
use rstar::{RTree, RTreeObject, AABB};

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Indices into the slice passed to [`ClusterAggregator::aggregate`], ascending.
    pub members: Vec<usize>,
    /// Centroid of the member positions.
    pub center: [f64; 2],
}

impl Cluster {
    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Display rule: a lone member keeps its own style (including hidden); two
    /// or more members show the cluster marker with the member count.
    pub fn style<F>(&self, singleton: F) -> Option<Style>
    where
        F: FnOnce(usize) -> Option<Style>,
    {
        match self.members.as_slice() {
            [] => None,
            [only] => singleton(*only),
            members => Some(Style::Cluster {
                count: members.len(),
            }),
        }
    }
}

#[derive(Clone, Copy)]
struct IndexedPoint {
    idx: usize,
    pos: [f64; 2],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.pos)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterAggregator {
    distance: f64,
}

impl ClusterAggregator {
    /// `distance` is in the same units as the positions handed to `aggregate`.
    pub fn new(distance: f64) -> Self {
        Self {
            distance: distance.max(0.0),
        }
    }

    /// Greedy grouping in input order: each not-yet-clustered point seeds a
    /// cluster that absorbs every unclustered point inside the square of
    /// half-width `distance` around it. Non-finite positions are ignored.
    pub fn aggregate(&self, positions: &[[f64; 2]]) -> Vec<Cluster> {
        let points: Vec<IndexedPoint> = positions
            .iter()
            .enumerate()
            .filter(|(_, p)| p[0].is_finite() && p[1].is_finite())
            .map(|(idx, &pos)| IndexedPoint { idx, pos })
            .collect();

        let tree = RTree::bulk_load(points.clone());
        let mut clustered = vec![false; positions.len()];
        let mut clusters = Vec::new();

        for seed in &points {
            if clustered[seed.idx] {
                continue;
            }

            let d = self.distance;
            let window = AABB::from_corners(
                [seed.pos[0] - d, seed.pos[1] - d],
                [seed.pos[0] + d, seed.pos[1] + d],
            );

            let mut members: Vec<usize> = tree
                .locate_in_envelope(&window)
                .map(|p| p.idx)
                .filter(|&idx| !clustered[idx])
                .collect();
            members.sort_unstable();

            let mut sum = [0.0f64; 2];
            for &idx in &members {
                clustered[idx] = true;
                sum[0] += positions[idx][0];
                sum[1] += positions[idx][1];
            }
            let n = members.len() as f64;

            clusters.push(Cluster {
                center: [sum[0] / n, sum[1] / n],
                members,
            });
        }

        clusters
    }
}
