use crate::graph::{Edges, UnGraph};
use anyhow::{ensure, Error};
use fxhash::FxHashSet;
use std::ops::Range;

/// Undirected graph with f32 edge weights and u32 node keys.
pub(crate) type Graph = UnGraph<f32, u32>;

/// Read-only view of a weighted undirected graph with dense vertex keys `0..span()`.
/// Every edge must be visible from both of its endpoints.
pub trait Adjacency: Sync {
    /// Iterator over `(neighbor, edge weight)` pairs of one vertex.
    type Neighbors<'a>: Iterator<Item = (usize, f64)>
    where
        Self: 'a;

    /// Number of vertex keys.
    fn span(&self) -> usize;

    /// Iterate over `(neighbor, edge weight)` for all edges incident to `u`.
    fn neighbors(&self, u: usize) -> Self::Neighbors<'_>;

    /// All vertex keys.
    fn vertices(&self) -> Range<usize> {
        0..self.span()
    }
}

/// Container for the graph being clustered.
pub struct Network {
    pub(crate) graph: Graph,
}

/// Iterator over pairs of (adjacent node id, edge_weight) for all neighbors of a chosen node.
pub struct NeighborAndWeightIter<'a> {
    edge_iter: Edges<'a, f32, u32>,
}

impl Iterator for NeighborAndWeightIter<'_> {
    type Item = (usize, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.edge_iter.next().map(|e| (e.target(), e.weight() as f64))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.edge_iter.size_hint()
    }
}

/// A batch of edge updates. Each edge is listed once per direction the caller supplied;
/// use [`Batch::undirected`] to obtain the mirrored, source-sorted form the affected-vertex
/// detectors expect.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    /// Edges `(u, v)` to remove.
    pub deletions: Vec<(usize, usize)>,
    /// Edges `(u, v, w)` to add.
    pub insertions: Vec<(usize, usize, f64)>,
}

impl Batch {
    /// True if the batch holds no updates.
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.insertions.is_empty()
    }

    /// Both directions of every edge, sorted by source then target, duplicates removed.
    pub fn undirected(&self) -> Batch {
        let mut deletions = Vec::with_capacity(2 * self.deletions.len());
        for &(u, v) in &self.deletions {
            deletions.push((u, v));
            deletions.push((v, u));
        }
        deletions.sort_unstable();
        deletions.dedup();

        let mut insertions = Vec::with_capacity(2 * self.insertions.len());
        for &(u, v, w) in &self.insertions {
            insertions.push((u, v, w));
            insertions.push((v, u, w));
        }
        insertions.sort_by_key(|&(u, v, _)| (u, v));
        insertions.dedup_by_key(|&mut (u, v, _)| (u, v));

        Batch { deletions, insertions }
    }

    /// Largest vertex key mentioned, plus one.
    pub fn span(&self) -> usize {
        let d = self.deletions.iter().map(|&(u, v)| u.max(v) + 1);
        let i = self.insertions.iter().map(|&(u, v, _)| u.max(v) + 1);
        d.chain(i).max().unwrap_or(0)
    }
}

/// Check that `w` is a usable weight for the edge `i -- j` and convert it to storage precision.
fn edge_weight(i: usize, j: usize, w: f64) -> Result<f32, Error> {
    ensure!(w.is_finite() && w >= 0.0, "edge ({i}, {j}) has invalid weight {w}");
    let stored = w as f32;
    ensure!(stored.is_finite(), "edge ({i}, {j}) weight {w} does not fit in f32");
    Ok(stored)
}

impl Network {
    /// Create a new empty network
    pub fn new() -> Network {
        Network {
            graph: Graph::with_capacity(0),
        }
    }

    /// Create a network with `nodes` isolated vertices
    pub fn with_nodes(nodes: usize) -> Network {
        Network {
            graph: Graph::with_nodes(nodes),
        }
    }

    /// Build a network from a list of weighted edges. Repeated edges (in either direction) keep
    /// their first weight. Fails if an endpoint is not below `nodes` or a weight is negative,
    /// not finite or too large for `f32`.
    pub fn from_edges<I>(nodes: usize, edges: I) -> Result<Network, Error>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let mut n = Network::with_nodes(nodes);
        let mut seen = FxHashSet::default();
        for (i, j, w) in edges {
            ensure!(i < nodes && j < nodes, "edge ({i}, {j}) is outside of {nodes} vertices");
            let w = edge_weight(i, j, w)?;
            let key = if i < j { (i, j) } else { (j, i) };
            if seen.insert(key) {
                n.graph.add_edge(i, j, w);
            }
        }
        Ok(n)
    }

    /// Number of nodes in the graph
    pub fn nodes(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of undirected edges in the graph
    pub fn edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of edges incident to `node`
    pub fn degree(&self, node: usize) -> usize {
        self.graph.degree(node)
    }

    /// Add an undirected edge, unless the two nodes are already connected. Returns true if the
    /// edge was added. Fails on an endpoint outside the network or an invalid weight.
    pub fn add_edge(&mut self, i: usize, j: usize, weight: f64) -> Result<bool, Error> {
        let nodes = self.nodes();
        ensure!(i < nodes && j < nodes, "edge ({i}, {j}) is outside of {nodes} vertices");
        let weight = edge_weight(i, j, weight)?;
        if self.graph.contains_edge(i, j) {
            return Ok(false);
        }
        self.graph.add_edge(i, j, weight);
        Ok(true)
    }

    /// Remove the undirected edge between `i` and `j`. Returns false if there was none.
    pub fn remove_edge(&mut self, i: usize, j: usize) -> bool {
        self.graph.remove_edge(i, j)
    }

    /// True if `i` and `j` are connected.
    pub fn contains_edge(&self, i: usize, j: usize) -> bool {
        self.graph.contains_edge(i, j)
    }

    /// Apply the deletions and then the insertions of `batch`. Deleting a missing edge and
    /// inserting an existing one are no-ops. New vertex keys grow the network.
    ///
    /// The whole batch is checked first: if it is rejected the network is left unchanged.
    pub fn apply_batch(&mut self, batch: &Batch) -> Result<(), Error> {
        let nodes = self.nodes();
        for &(i, j) in &batch.deletions {
            ensure!(
                i < nodes && j < nodes,
                "deleted edge ({i}, {j}) is outside of {nodes} vertices"
            );
        }
        let insertions = batch
            .insertions
            .iter()
            .map(|&(i, j, w)| edge_weight(i, j, w).map(|w| (i, j, w)))
            .collect::<Result<Vec<_>, Error>>()?;

        for &(i, j) in &batch.deletions {
            self.remove_edge(i, j);
        }
        while self.nodes() < batch.span() {
            self.graph.add_node();
        }
        for (i, j, w) in insertions {
            if !self.graph.contains_edge(i, j) {
                self.graph.add_edge(i, j, w);
            }
        }
        Ok(())
    }

    /// Iterator over pairs of (adjacent node id, edge_weight) for all neighbors of `node`.
    pub fn neighbors(&'_ self, node: usize) -> NeighborAndWeightIter<'_> {
        NeighborAndWeightIter {
            edge_iter: self.graph.edges(node),
        }
    }

    /// Get the total edge weight of all nodes in the graph
    pub fn get_total_edge_weight(&self) -> f64 {
        self.graph.total_weight()
    }

}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Adjacency for Network {
    type Neighbors<'a> = NeighborAndWeightIter<'a>;

    fn span(&self) -> usize {
        self.nodes()
    }

    fn neighbors(&self, u: usize) -> Self::Neighbors<'_> {
        Network::neighbors(self, u)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_edges_dedup() {
        let n = Network::from_edges(3, vec![(0, 1, 1.0), (1, 0, 5.0), (1, 2, 2.0)]).unwrap();
        assert_eq!(n.edges(), 2);
        assert_eq!(n.get_total_edge_weight(), 3.0);
        assert!(Network::from_edges(2, vec![(0, 2, 1.0)]).is_err());
    }

    #[test]
    fn test_invalid_weights() {
        assert!(Network::from_edges(3, vec![(0, 1, -1.0)]).is_err());
        assert!(Network::from_edges(3, vec![(1, 2, f64::NAN)]).is_err());
        assert!(Network::from_edges(3, vec![(1, 2, f64::INFINITY)]).is_err());
        assert!(Network::from_edges(3, vec![(1, 2, 1e300)]).is_err());

        let mut n = Network::with_nodes(3);
        assert!(n.add_edge(0, 1, -1.0).is_err());
        assert!(n.add_edge(0, 1, f64::NAN).is_err());
        assert!(n.add_edge(0, 3, 1.0).is_err());
        assert_eq!(n.edges(), 0);
        assert!(n.add_edge(0, 1, 0.0).unwrap());
        assert!(!n.add_edge(1, 0, 2.0).unwrap());
        assert_eq!(n.edges(), 1);
    }

    #[test]
    fn test_rejected_batch_leaves_network_unchanged() {
        let mut n = Network::from_edges(3, vec![(0, 1, 1.0), (1, 2, 1.0)]).unwrap();
        let b = Batch {
            deletions: vec![(0, 1)],
            insertions: vec![(0, 2, 1.0), (0, 1, f64::NAN)],
        };
        assert!(n.apply_batch(&b.undirected()).is_err());
        assert!(n.apply_batch(&b).is_err());
        assert_eq!(n.edges(), 2);
        assert!(n.contains_edge(0, 1));
        assert!(!n.contains_edge(0, 2));

        let b = Batch {
            deletions: vec![(0, 1), (1, 5)],
            insertions: vec![(2, 4, 1.0)],
        };
        assert!(n.apply_batch(&b).is_err());
        assert_eq!(n.nodes(), 3);
        assert_eq!(n.edges(), 2);
        assert!(n.contains_edge(1, 0));
    }

    #[test]
    fn test_undirected_batch() {
        let b = Batch {
            deletions: vec![(2, 0), (0, 2)],
            insertions: vec![(1, 0, 2.0), (3, 3, 1.0)],
        };
        let u = b.undirected();
        assert_eq!(u.deletions, vec![(0, 2), (2, 0)]);
        assert_eq!(u.insertions, vec![(0, 1, 2.0), (1, 0, 2.0), (3, 3, 1.0)]);
        assert_eq!(b.span(), 4);
    }

    #[test]
    fn test_apply_batch() {
        let mut n = Network::from_edges(3, vec![(0, 1, 1.0), (1, 2, 1.0)]).unwrap();
        let b = Batch {
            deletions: vec![(1, 0), (0, 2)],
            insertions: vec![(2, 3, 4.0), (1, 2, 9.0)],
        }
        .undirected();
        n.apply_batch(&b).unwrap();
        assert_eq!(n.nodes(), 4);
        assert_eq!(n.edges(), 2);
        assert!(!n.contains_edge(0, 1));
        assert!(n.contains_edge(3, 2));
        // the existing 1 -- 2 edge keeps its weight
        assert_eq!(n.neighbors(1).collect::<Vec<_>>(), vec![(2, 1.0)]);
        assert!(n.apply_batch(&Batch { deletions: vec![(0, 9)], ..Batch::default() }).is_err());
    }
}
