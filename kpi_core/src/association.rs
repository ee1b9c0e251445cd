//! Data association between detections and ground truth for one timeframe.
//!
//! # Policies
//! - **Greedy** (default): ground-truth entries are visited in order; each
//!   takes its nearest still-unassigned detection if the pair passes the
//!   gate. Cheap, order-dependent, and the convention the historical KPI
//!   numbers were produced with.
//! - **Optimal**: gate every pair, build a sparse bipartite graph, partition
//!   it into connected components (union-find) and solve each component with
//!   the Hungarian algorithm. Maximises the number of matches, then minimises
//!   the summed cost.
//!
//! Ground-truth entries without a detection are false negatives; detections
//! nobody picked are false positives.

use crate::error::{KpiError, Result};
use crate::gating::{CostMetric, PairGate};
use crate::geometry::Geometry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Assignment strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationPolicy {
    #[default]
    Greedy,
    Optimal,
}

/// Configuration for the association engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssociationConfig {
    /// Maximum cost (meters) for a detection to match a ground-truth entry
    pub max_radius: f64,
    #[serde(default)]
    pub policy: AssociationPolicy,
    #[serde(default)]
    pub metric: CostMetric,
    /// Optional orientation gate (radians, undirected line angle)
    #[serde(default)]
    pub max_angle: Option<f64>,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self::pcl()
    }
}

impl AssociationConfig {
    /// Parking-course-line / delimiter association.
    pub fn pcl() -> Self {
        Self {
            max_radius: 0.5,
            policy: AssociationPolicy::Greedy,
            metric: CostMetric::PointToShape,
            max_angle: None,
        }
    }

    /// Wheel-stopper association.
    pub fn wheel_stopper() -> Self {
        Self {
            max_radius: 0.4,
            policy: AssociationPolicy::Greedy,
            metric: CostMetric::PointToShape,
            max_angle: None,
        }
    }

    /// Parking-slot association (slot center distance).
    pub fn parking_slot() -> Self {
        Self {
            max_radius: 1.0,
            policy: AssociationPolicy::Greedy,
            metric: CostMetric::RepresentativePoint,
            max_angle: None,
        }
    }

    pub fn with_radius(mut self, max_radius: f64) -> Self {
        self.max_radius = max_radius;
        self
    }

    pub fn with_policy(mut self, policy: AssociationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max_radius.is_finite() && self.max_radius > 0.0) {
            return Err(KpiError::threshold("max_radius", self.max_radius));
        }
        if let Some(a) = self.max_angle {
            if !(a.is_finite() && a >= 0.0) {
                return Err(KpiError::threshold("max_angle", a));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Which count a ratio is normalised by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatioBasis {
    /// TP / detections (precision-style)
    #[default]
    Detections,
    /// TP / ground truth (recall-style)
    GroundTruth,
}

/// Outcome for one ground-truth entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Association {
    pub ground_truth_index: usize,
    pub detection_index: Option<usize>,
    /// Cost of the match, or of the nearest candidate when unmatched
    /// (`+∞` when there was no detection at all)
    pub cost: f64,
}

/// Per-timeframe association result. Ratios are computed on demand.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssociationResult {
    /// One entry per ground-truth geometry, in ground-truth order
    pub associations: Vec<Association>,
    /// Detection indices not matched to any ground truth
    pub false_positive_indices: Vec<usize>,
    pub n_detections: usize,
    pub n_ground_truth: usize,
}

fn safe_ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

impl AssociationResult {
    pub fn true_positives(&self) -> usize {
        self.associations
            .iter()
            .filter(|a| a.detection_index.is_some())
            .count()
    }

    pub fn false_positives(&self) -> usize {
        self.false_positive_indices.len()
    }

    pub fn false_negatives(&self) -> usize {
        self.n_ground_truth - self.true_positives()
    }

    /// TP / detections; 0 when there are no detections.
    pub fn precision(&self) -> f64 {
        safe_ratio(self.true_positives(), self.n_detections)
    }

    /// TP / ground truth; 0 when there is no ground truth.
    pub fn recall(&self) -> f64 {
        safe_ratio(self.true_positives(), self.n_ground_truth)
    }

    pub fn ratio(&self, basis: RatioBasis) -> f64 {
        match basis {
            RatioBasis::Detections => self.precision(),
            RatioBasis::GroundTruth => self.recall(),
        }
    }

    /// Matched `(ground_truth_index, detection_index)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.associations
            .iter()
            .filter_map(|a| a.detection_index.map(|d| (a.ground_truth_index, d)))
    }
}

// ---------------------------------------------------------------------------
// Associator
// ---------------------------------------------------------------------------

/// Association engine bound to a validated configuration.
#[derive(Clone, Debug)]
pub struct Associator {
    config: AssociationConfig,
}

impl Associator {
    /// Fails eagerly with `InvalidThreshold` on a bad configuration.
    pub fn new(config: AssociationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    fn gate(&self) -> PairGate {
        PairGate {
            metric: self.config.metric,
            max_radius: self.config.max_radius,
            max_angle: self.config.max_angle,
        }
    }

    /// Associate one timeframe. Empty inputs are valid.
    pub fn associate(&self, detections: &[Geometry], ground_truth: &[Geometry]) -> AssociationResult {
        let associations = match self.config.policy {
            AssociationPolicy::Greedy => self.associate_greedy(detections, ground_truth),
            AssociationPolicy::Optimal => self.associate_optimal(detections, ground_truth),
        };

        let mut matched = vec![false; detections.len()];
        for a in &associations {
            if let Some(d) = a.detection_index {
                matched[d] = true;
            }
        }
        let false_positive_indices = (0..detections.len()).filter(|&d| !matched[d]).collect();

        AssociationResult {
            associations,
            false_positive_indices,
            n_detections: detections.len(),
            n_ground_truth: ground_truth.len(),
        }
    }

    fn associate_greedy(&self, detections: &[Geometry], ground_truth: &[Geometry]) -> Vec<Association> {
        let gate = self.gate();
        let mut taken = vec![false; detections.len()];

        ground_truth
            .iter()
            .enumerate()
            .map(|(gi, gt)| {
                let mut nearest = f64::INFINITY;
                // (detection index, cost) of the cheapest gate-passing candidate
                let mut best: Option<(usize, f64)> = None;
                for (di, det) in detections.iter().enumerate() {
                    if taken[di] {
                        continue;
                    }
                    let res = gate.check(det, gt);
                    nearest = nearest.min(res.cost);
                    if res.passes && best.map_or(true, |(_, c)| res.cost < c) {
                        best = Some((di, res.cost));
                    }
                }
                match best {
                    Some((di, cost)) => {
                        taken[di] = true;
                        Association {
                            ground_truth_index: gi,
                            detection_index: Some(di),
                            cost,
                        }
                    }
                    None => Association {
                        ground_truth_index: gi,
                        detection_index: None,
                        cost: nearest,
                    },
                }
            })
            .collect()
    }

    fn associate_optimal(&self, detections: &[Geometry], ground_truth: &[Geometry]) -> Vec<Association> {
        let gate = self.gate();
        let mut graph = BipartiteGraph::new(ground_truth.len(), detections.len());
        let mut nearest = vec![f64::INFINITY; ground_truth.len()];

        for (gi, gt) in ground_truth.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let res = gate.check(det, gt);
                nearest[gi] = nearest[gi].min(res.cost);
                if res.passes {
                    graph.add_edge(gi, di, res.cost);
                }
            }
        }

        let edge_cost: HashMap<(usize, usize), f64> = graph
            .edges
            .iter()
            .map(|e| ((e.gt_idx, e.det_idx), e.cost))
            .collect();

        let assignments: Vec<Assignment> = partition_components(&graph)
            .par_iter()
            .map(hungarian_solve)
            .collect();

        let mut matched: Vec<Option<usize>> = vec![None; ground_truth.len()];
        for ass in assignments {
            for (gi, di) in ass.pairs {
                matched[gi] = Some(di);
            }
        }

        matched
            .into_iter()
            .enumerate()
            .map(|(gi, det)| Association {
                ground_truth_index: gi,
                detection_index: det,
                cost: det
                    .and_then(|di| edge_cost.get(&(gi, di)).copied())
                    .unwrap_or(nearest[gi]),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Bipartite graph
// ---------------------------------------------------------------------------

/// A gate-passing (ground truth, detection) candidate pair.
#[derive(Clone, Debug)]
pub struct AssignEdge {
    pub gt_idx: usize,
    pub det_idx: usize,
    pub cost: f64,
}

/// Sparse bipartite graph between ground-truth and detection indices.
#[derive(Clone, Debug, Default)]
pub struct BipartiteGraph {
    pub edges: Vec<AssignEdge>,
    pub n_gt: usize,
    pub n_det: usize,
}

impl BipartiteGraph {
    pub fn new(n_gt: usize, n_det: usize) -> Self {
        Self {
            edges: Vec::new(),
            n_gt,
            n_det,
        }
    }

    pub fn add_edge(&mut self, gt_idx: usize, det_idx: usize, cost: f64) {
        self.edges.push(AssignEdge {
            gt_idx,
            det_idx,
            cost,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Disjoint sets over ground-truth + detection nodes
// ---------------------------------------------------------------------------

/// Union by size with full path compression.
struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn root(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = node;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn join(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.root(a), self.root(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}

/// A connected component of the bipartite graph.
#[derive(Clone, Debug, Default)]
pub struct Component {
    pub gt_indices: Vec<usize>,
    pub det_indices: Vec<usize>,
    pub edges: Vec<AssignEdge>,
}

/// Partition the graph into independent components.
///
/// Ground truth `i` is node `i`, detection `j` is node `n_gt + j`.
/// Components come out in a deterministic order.
pub fn partition_components(graph: &BipartiteGraph) -> Vec<Component> {
    let mut sets = DisjointSets::new(graph.n_gt + graph.n_det);
    for e in &graph.edges {
        sets.join(e.gt_idx, graph.n_gt + e.det_idx);
    }

    let mut comp_map: BTreeMap<usize, Component> = BTreeMap::new();
    for e in &graph.edges {
        let root = sets.root(e.gt_idx);
        comp_map.entry(root).or_default().edges.push(e.clone());
    }

    for comp in comp_map.values_mut() {
        comp.gt_indices = comp.edges.iter().map(|e| e.gt_idx).collect();
        comp.gt_indices.sort_unstable();
        comp.gt_indices.dedup();
        comp.det_indices = comp.edges.iter().map(|e| e.det_idx).collect();
        comp.det_indices.sort_unstable();
        comp.det_indices.dedup();
    }

    comp_map.into_values().collect()
}

// ---------------------------------------------------------------------------
// Hungarian algorithm — O(n³) Kuhn-Munkres
// ---------------------------------------------------------------------------

/// Matched pairs of one component, in global indices.
#[derive(Clone, Debug, Default)]
pub struct Assignment {
    /// (gt_idx, det_idx)
    pub pairs: Vec<(usize, usize)>,
    pub unmatched_gt: Vec<usize>,
    pub unmatched_det: Vec<usize>,
}

/// Solve one component: maximum number of pairs first, then minimum total
/// cost. Cells without a graph edge are never reported as pairs.
///
/// Edge costs are divided by the component's largest cost, so every real
/// cell lies in `[0, 1]` and the padding cell costs `n + 1`. A matching with
/// one more real pair is then always cheaper, and no cell can overflow
/// whatever the gate radius.
pub fn hungarian_solve(component: &Component) -> Assignment {
    let ng = component.gt_indices.len();
    let nd = component.det_indices.len();

    if ng == 0 || nd == 0 {
        return Assignment {
            pairs: vec![],
            unmatched_gt: component.gt_indices.clone(),
            unmatched_det: component.det_indices.clone(),
        };
    }

    let n = ng.max(nd);
    let scale = component
        .edges
        .iter()
        .map(|e| e.cost)
        .fold(0.0f64, f64::max);
    let scale = if scale > 0.0 { scale } else { 1.0 };

    let mut cost = vec![n as f64 + 1.0; n * n];
    let mut is_edge = vec![false; n * n];

    let gt_local: HashMap<usize, usize> = component
        .gt_indices
        .iter()
        .enumerate()
        .map(|(i, &g)| (g, i))
        .collect();
    let det_local: HashMap<usize, usize> = component
        .det_indices
        .iter()
        .enumerate()
        .map(|(j, &d)| (d, j))
        .collect();

    for e in &component.edges {
        if let (Some(&ri), Some(&ci)) = (gt_local.get(&e.gt_idx), det_local.get(&e.det_idx)) {
            cost[ri * n + ci] = e.cost / scale;
            is_edge[ri * n + ci] = true;
        }
    }

    let row_assign = run_hungarian(&cost, n);

    let mut pairs = Vec::new();
    let mut unmatched_gt = Vec::new();
    let mut matched_det = vec![false; nd];

    for (ri, &ci) in row_assign.iter().enumerate().take(ng) {
        if ci < nd && is_edge[ri * n + ci] {
            pairs.push((component.gt_indices[ri], component.det_indices[ci]));
            matched_det[ci] = true;
        } else {
            unmatched_gt.push(component.gt_indices[ri]);
        }
    }

    let unmatched_det = (0..nd)
        .filter(|&j| !matched_det[j])
        .map(|j| component.det_indices[j])
        .collect();

    Assignment {
        pairs,
        unmatched_gt,
        unmatched_det,
    }
}

/// Shortest-augmenting-path Hungarian on a square `n x n` row-major matrix
/// of finite costs. Returns `assign[row] = column`.
///
/// Rows and columns are 1-based inside; column 0 is the virtual source of
/// each augmenting path.
fn run_hungarian(cost: &[f64], n: usize) -> Vec<usize> {
    let mut row_pot = vec![0.0f64; n + 1];
    let mut col_pot = vec![0.0f64; n + 1];
    // owner[col] = row matched to col, 0 = free
    let mut owner = vec![0usize; n + 1];
    // prev[col] = column before col on the current path
    let mut prev = vec![0usize; n + 1];

    for row in 1..=n {
        owner[0] = row;
        let mut col = 0usize;
        let mut slack = vec![f64::INFINITY; n + 1];
        let mut visited = vec![false; n + 1];

        // Grow the alternating tree until it reaches a free column
        while owner[col] != 0 {
            visited[col] = true;
            let r = owner[col];
            let mut delta = f64::INFINITY;
            let mut next = 0usize;
            for c in 1..=n {
                if visited[c] {
                    continue;
                }
                let reduced = cost[(r - 1) * n + (c - 1)] - row_pot[r] - col_pot[c];
                if reduced < slack[c] {
                    slack[c] = reduced;
                    prev[c] = col;
                }
                if slack[c] < delta {
                    delta = slack[c];
                    next = c;
                }
            }
            for c in 0..=n {
                if visited[c] {
                    row_pot[owner[c]] += delta;
                    col_pot[c] -= delta;
                } else {
                    slack[c] -= delta;
                }
            }
            col = next;
        }

        // Flip the path back to the source
        while col != 0 {
            let p = prev[col];
            owner[col] = owner[p];
            col = p;
        }
    }

    let mut assign = vec![0usize; n];
    for c in 1..=n {
        if owner[c] != 0 {
            assign[owner[c] - 1] = c - 1;
        }
    }
    assign
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point2D, Polygon, Segment};
    use approx::assert_abs_diff_eq;

    fn seg(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
        Segment::from_coords(x0, y0, x1, y1).unwrap().into()
    }

    fn slot(cx: f64, cy: f64) -> Geometry {
        Polygon::new(vec![
            Point2D::new(cx - 1.25, cy - 2.5),
            Point2D::new(cx + 1.25, cy - 2.5),
            Point2D::new(cx + 1.25, cy + 2.5),
            Point2D::new(cx - 1.25, cy + 2.5),
        ])
        .unwrap()
        .into()
    }

    fn associator(radius: f64, policy: AssociationPolicy) -> Associator {
        Associator::new(AssociationConfig::pcl().with_radius(radius).with_policy(policy)).unwrap()
    }

    #[test]
    fn hungarian_3x3_known() {
        // Optimal: row0→col1 (1), row1→col0 (2), row2→col2 (2) = 5
        let cost = vec![4.0, 1.0, 3.0, 2.0, 0.0, 5.0, 3.0, 2.0, 2.0];
        let assign = run_hungarian(&cost, 3);
        let total: f64 = assign
            .iter()
            .enumerate()
            .map(|(r, &c)| cost[r * 3 + c])
            .sum();
        assert!(
            (total - 5.0).abs() < 1e-9,
            "Expected total cost 5, got {total}"
        );
    }

    #[test]
    fn partition_two_independent_components() {
        let mut graph = BipartiteGraph::new(4, 4);
        graph.add_edge(0, 0, 1.0);
        graph.add_edge(2, 3, 2.0);
        graph.add_edge(2, 2, 2.5);

        let comps = partition_components(&graph);
        assert_eq!(comps.len(), 2, "Should have 2 independent components");
        let sizes: Vec<_> = comps.iter().map(|c| c.det_indices.len()).collect();
        assert!(sizes.contains(&1) && sizes.contains(&2));
    }

    #[test]
    fn hungarian_never_pairs_missing_edges() {
        // 2 gt × 2 det but only gt0-det0 and gt1-det0 are edges
        let comp = Component {
            gt_indices: vec![0, 1],
            det_indices: vec![0, 1],
            edges: vec![
                AssignEdge {
                    gt_idx: 0,
                    det_idx: 0,
                    cost: 0.1,
                },
                AssignEdge {
                    gt_idx: 1,
                    det_idx: 0,
                    cost: 0.2,
                },
            ],
        };
        let ass = hungarian_solve(&comp);
        assert_eq!(ass.pairs.len(), 1);
        assert_eq!(ass.unmatched_gt.len(), 1);
        assert_eq!(ass.unmatched_det, vec![1]);
    }

    #[test]
    fn scenario_parallel_line_within_radius() {
        let gt = [seg(0.0, 0.0, 1.0, 0.0)];
        let det = [seg(0.0, 0.05, 1.0, 0.05)];
        for policy in [AssociationPolicy::Greedy, AssociationPolicy::Optimal] {
            let res = associator(0.1, policy).associate(&det, &gt);
            assert_eq!(res.associations[0].detection_index, Some(0));
            assert_abs_diff_eq!(res.associations[0].cost, 0.05, epsilon = 1e-12);
            assert_abs_diff_eq!(res.precision(), 1.0);
            assert_abs_diff_eq!(res.recall(), 1.0);
        }
    }

    #[test]
    fn scenario_parallel_line_outside_radius() {
        let gt = [seg(0.0, 0.0, 1.0, 0.0)];
        let det = [seg(0.0, 0.05, 1.0, 0.05)];
        for policy in [AssociationPolicy::Greedy, AssociationPolicy::Optimal] {
            let res = associator(0.01, policy).associate(&det, &gt);
            assert_eq!(res.associations[0].detection_index, None);
            assert_abs_diff_eq!(res.associations[0].cost, 0.05, epsilon = 1e-12);
            assert_eq!(res.false_positive_indices, vec![0]);
            assert_eq!(res.false_negatives(), 1);
            assert_abs_diff_eq!(res.precision(), 0.0);
        }
    }

    #[test]
    fn empty_inputs_give_zero_ratio() {
        let res = associator(0.5, AssociationPolicy::Greedy).associate(&[], &[]);
        assert_eq!(res.precision(), 0.0);
        assert_eq!(res.recall(), 0.0);
        assert!(!res.precision().is_nan());

        let res = associator(0.5, AssociationPolicy::Optimal).associate(&[], &[seg(0.0, 0.0, 1.0, 0.0)]);
        assert_eq!(res.associations[0].cost, f64::INFINITY);
        assert_eq!(res.false_negatives(), 1);
    }

    #[test]
    fn invalid_radius_rejected_eagerly() {
        for r in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = Associator::new(AssociationConfig::pcl().with_radius(r)).unwrap_err();
            assert!(matches!(err, KpiError::InvalidThreshold { name: "max_radius", .. }));
        }
        let cfg = AssociationConfig {
            max_angle: Some(-0.1),
            ..AssociationConfig::pcl()
        };
        assert!(Associator::new(cfg).is_err());
    }

    #[test]
    fn association_is_idempotent() {
        let gt = [slot(0.0, 0.0), slot(3.0, 0.0), slot(6.0, 0.0)];
        let det = [slot(0.3, 0.1), slot(2.6, -0.2), slot(9.0, 0.0), slot(6.2, 0.4)];
        for policy in [AssociationPolicy::Greedy, AssociationPolicy::Optimal] {
            let a = Associator::new(AssociationConfig::parking_slot().with_policy(policy)).unwrap();
            assert_eq!(a.associate(&det, &gt), a.associate(&det, &gt));
        }
    }

    #[test]
    fn slots_classified() {
        let a = Associator::new(AssociationConfig::parking_slot()).unwrap();
        let gt = [slot(0.0, 0.0), slot(3.0, 0.0), slot(6.0, 0.0)];
        let det = [slot(0.3, 0.1), slot(9.0, 0.0), slot(6.2, 0.4)];
        let res = a.associate(&det, &gt);
        assert_eq!(res.pairs().collect::<Vec<_>>(), vec![(0, 0), (2, 2)]);
        assert_eq!(res.false_positive_indices, vec![1]);
        assert_eq!(res.true_positives(), 2);
        assert_eq!(res.false_negatives(), 1);
        assert_abs_diff_eq!(res.precision(), 2.0 / 3.0);
        assert_abs_diff_eq!(res.recall(), 2.0 / 3.0);
    }

    #[test]
    fn greedy_is_order_dependent_optimal_is_not() {
        // gt0 is visited first and steals d0, leaving gt1 with nothing in range.
        //   gt0 (y=0.0): d0 at 0.25, d1 at 0.6
        //   gt1 (y=0.6): d0 at 0.35, d1 at 1.2
        let gt = [seg(-0.5, 0.0, 0.5, 0.0), seg(-0.5, 0.6, 0.5, 0.6)];
        let det = [seg(-0.5, 0.25, 0.5, 0.25), seg(-0.5, -0.6, 0.5, -0.6)];
        let cfg = AssociationConfig {
            max_radius: 0.75,
            policy: AssociationPolicy::Greedy,
            metric: CostMetric::RepresentativePoint,
            max_angle: None,
        };
        let greedy = Associator::new(cfg.clone()).unwrap().associate(&det, &gt);
        let optimal = Associator::new(cfg.with_policy(AssociationPolicy::Optimal))
            .unwrap()
            .associate(&det, &gt);

        assert_eq!(greedy.true_positives(), 1);
        assert_eq!(optimal.true_positives(), 2);
        assert_eq!(optimal.pairs().collect::<Vec<_>>(), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn radius_increase_never_lowers_ratio() {
        let gt = [
            seg(0.0, 0.0, 2.0, 0.0),
            seg(0.0, 1.0, 2.0, 1.0),
            seg(5.0, 0.0, 5.0, 2.0),
        ];
        let det = [
            seg(0.0, 0.1, 2.0, 0.1),
            seg(0.0, 1.4, 2.0, 1.4),
            seg(5.9, 0.0, 5.9, 2.0),
            seg(10.0, 0.0, 12.0, 0.0),
        ];
        for policy in [AssociationPolicy::Greedy, AssociationPolicy::Optimal] {
            let mut last = 0.0;
            for r in [0.05, 0.2, 0.35, 0.5, 1.0, 2.0, 5.0] {
                let ratio = associator(r, policy).associate(&det, &gt).precision();
                assert!(ratio >= last, "{policy:?}: ratio dropped at r={r}");
                last = ratio;
            }
            assert_abs_diff_eq!(last, 0.75);
        }
    }

    #[test]
    fn optimal_handles_huge_radius() {
        let gt = [seg(0.0, 0.0, 1.0, 0.0)];
        let det = [seg(0.0, 0.1, 1.0, 0.1), seg(0.0, 0.2, 1.0, 0.2)];
        for radius in [1e308, f64::MAX] {
            let res = associator(radius, AssociationPolicy::Optimal).associate(&det, &gt);
            assert_eq!(res.pairs().collect::<Vec<_>>(), vec![(0, 0)]);
            assert_eq!(res.false_positive_indices, vec![1]);
        }
    }

    #[test]
    fn hungarian_keeps_cardinality_with_large_costs() {
        // Costs far above any fixed padding: still two pairs, not one cheap one
        let comp = Component {
            gt_indices: vec![0, 1],
            det_indices: vec![0, 1],
            edges: vec![
                AssignEdge { gt_idx: 0, det_idx: 0, cost: 1.0 },
                AssignEdge { gt_idx: 0, det_idx: 1, cost: 1e300 },
                AssignEdge { gt_idx: 1, det_idx: 0, cost: 1e300 },
            ],
        };
        let ass = hungarian_solve(&comp);
        assert_eq!(ass.pairs, vec![(0, 1), (1, 0)]);
        assert!(ass.unmatched_gt.is_empty());
    }

    #[test]
    fn greedy_tie_goes_to_lower_detection_index() {
        let gt = [seg(-1.0, 0.0, 1.0, 0.0)];
        let det = [seg(-1.0, 0.2, 1.0, 0.2), seg(-1.0, -0.2, 1.0, -0.2)];
        let res = associator(0.5, AssociationPolicy::Greedy).associate(&det, &gt);
        assert_eq!(res.associations[0].detection_index, Some(0));
        assert_eq!(res.false_positive_indices, vec![1]);
        assert_abs_diff_eq!(res.associations[0].cost, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn angle_gate_skips_to_aligned_candidate() {
        // The crossing detection is nearest but fails the orientation gate.
        let gt = [seg(-1.0, 0.0, 1.0, 0.0)];
        let det = [seg(0.0, -1.0, 0.0, 1.0), seg(-1.0, 0.2, 1.0, 0.2)];
        let cfg = AssociationConfig {
            max_radius: 1.0,
            policy: AssociationPolicy::Greedy,
            metric: CostMetric::RepresentativePoint,
            max_angle: Some(5f64.to_radians()),
        };
        let res = Associator::new(cfg).unwrap().associate(&det, &gt);
        assert_eq!(res.associations[0].detection_index, Some(1));
        assert_eq!(res.false_positive_indices, vec![0]);
    }
}
