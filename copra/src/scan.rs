use crate::labelset::Labelset;
use crate::network::Adjacency;
use std::cmp::Ordering;

/// Sparse accumulator of the weight a vertex's neighborhood lends to each community.
///
/// The dense table is indexed by community id and sized to the span of the graph. Only the
/// touched entries are reset by [`CommunityScan::clear`], so one scan can be reused across all
/// the vertices a worker processes. Scans must not be shared between concurrent workers.
#[derive(Clone, Debug, Default)]
pub struct CommunityScan {
    touched: Vec<usize>,
    weights: Vec<f64>,
}

impl CommunityScan {
    /// Create an empty scan for community ids in `0..span`.
    pub fn new(span: usize) -> Self {
        CommunityScan {
            touched: Vec::new(),
            weights: vec![0.0; span],
        }
    }

    /// Communities touched since the last clear, in first-touch order (or sorted order after
    /// [`CommunityScan::sort`]).
    pub fn touched(&self) -> &[usize] {
        &self.touched
    }

    /// Accumulated weight of `community`.
    pub fn weight(&self, community: usize) -> f64 {
        self.weights[community]
    }

    /// Sum of the accumulated weight over all touched communities.
    pub fn total_weight(&self) -> f64 {
        self.touched.iter().map(|&c| self.weights[c]).sum()
    }

    /// True if no community has been touched.
    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    /// Add the contribution of the edge `u -- v` with weight `w`: every community `c` that `v`
    /// belongs to with coefficient `b` receives `w * b`.
    pub fn scan_edge<const L: usize>(
        &mut self,
        u: usize,
        v: usize,
        w: f64,
        labelsets: &[Labelset<L>],
        self_loops: bool,
    ) {
        if !self_loops && u == v {
            return;
        }
        for &(c, b) in &labelsets[v] {
            let x = w * b;
            // zero never marks a community as touched
            if x == 0.0 {
                continue;
            }
            if self.weights[c] == 0.0 {
                self.touched.push(c);
            }
            self.weights[c] += x;
        }
    }

    /// Add the contributions of every edge incident to `u`.
    pub fn scan_vertex<G: Adjacency, const L: usize>(
        &mut self,
        graph: &G,
        u: usize,
        labelsets: &[Labelset<L>],
        self_loops: bool,
    ) {
        for (v, w) in graph.neighbors(u) {
            self.scan_edge(u, v, w, labelsets, self_loops);
        }
    }

    /// Order touched communities by descending weight.
    ///
    /// Equal weights are ordered by bit 1 of the community id (set first), then by ascending id,
    /// so two tied labels do not keep trading places between sweeps. With `strict`, ties keep
    /// their first-touch order.
    pub fn sort(&mut self, strict: bool) {
        let weights = &self.weights;
        self.touched.sort_by(|&c, &d| rank(weights, c, d, strict));
    }

    /// Reset the touched entries and forget them.
    pub fn clear(&mut self) {
        for &c in &self.touched {
            self.weights[c] = 0.0;
        }
        self.touched.clear();
    }
}

fn rank(weights: &[f64], c: usize, d: usize, strict: bool) -> Ordering {
    let order = weights[d].total_cmp(&weights[c]);
    if strict || order != Ordering::Equal {
        return order;
    }
    if (c ^ d) & 2 != 0 {
        (d & 2).cmp(&(c & 2))
    } else {
        c.cmp(&d)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Network;

    fn singletons(n: usize) -> Vec<Labelset> {
        (0..n).map(Labelset::singleton).collect()
    }

    #[test]
    fn test_scan_vertex() {
        let n = Network::from_edges(4, vec![(0, 1, 1.0), (0, 2, 2.0), (0, 0, 5.0)]).unwrap();
        let mut labelsets = singletons(4);
        labelsets[2] = Labelset::from_entries(&[(1, 0.5), (3, 0.5)]).unwrap();

        let mut scan = CommunityScan::new(4);
        scan.scan_vertex(&n, 0, &labelsets, false);
        assert_eq!(scan.touched(), &[1, 3]);
        assert_eq!(scan.weight(1), 2.0);
        assert_eq!(scan.weight(3), 1.0);
        assert_eq!(scan.total_weight(), 3.0);

        scan.clear();
        assert!(scan.is_empty());
        assert!(scan.weights.iter().all(|&w| w == 0.0));

        scan.scan_vertex(&n, 0, &labelsets, true);
        assert_eq!(scan.touched(), &[1, 3, 0]);
        assert_eq!(scan.weight(0), 5.0);
    }

    #[test]
    fn test_zero_weight_edges_are_ignored() {
        let labelsets = singletons(3);
        let mut scan = CommunityScan::new(3);
        scan.scan_edge(0, 1, 0.0, &labelsets, false);
        scan.scan_edge(0, 1, 1.0, &labelsets, false);
        scan.scan_edge(0, 1, 1.0, &labelsets, false);
        assert_eq!(scan.touched(), &[1]);
        assert_eq!(scan.weight(1), 2.0);
    }

    #[test]
    fn test_sort_ties() {
        let mut scan = CommunityScan::new(8);
        for c in [0, 1, 4, 5, 6] {
            scan.touched.push(c);
            scan.weights[c] = 1.0;
        }
        scan.weights[1] = 2.0;

        let mut strict = scan.clone();
        strict.sort(true);
        assert_eq!(strict.touched(), &[1, 0, 4, 5, 6]);

        // 6 has bit 1 set, so it beats every other tied id
        scan.sort(false);
        assert_eq!(scan.touched(), &[1, 6, 0, 4, 5]);
    }
}
