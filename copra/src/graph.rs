use num_traits::cast::AsPrimitive;
use std::fmt::Debug;
use std::slice::Iter;

pub trait IndexTrait: AsPrimitive<usize> + Copy + Debug + PartialEq + TryFrom<usize>
where
    Self: std::marker::Sized,
{
}

impl IndexTrait for usize {}
impl IndexTrait for u32 {}

fn to_index<Ix>(ix: usize) -> Ix
where
    Ix: IndexTrait,
    <Ix as TryFrom<usize>>::Error: Debug,
{
    Ix::try_from(ix).unwrap()
}

#[derive(Copy, Clone, Debug)]
pub struct Edge<W> {
    source: usize,
    target: usize,
    weight: W,
}

impl<W: Copy> Edge<W> {
    pub fn target(&self) -> usize {
        self.target
    }
    pub fn weight(&self) -> W {
        self.weight
    }
}

/// Half of an undirected edge, stored in the adjacency list of its source.
#[derive(Copy, Clone, Debug)]
pub struct DiEdge<W, NodeIx = usize>
where
    NodeIx: IndexTrait,
{
    target: NodeIx,
    pub(crate) weight: W,
}

pub struct Edges<'a, W, NodeIx = usize>
where
    NodeIx: IndexTrait,
{
    source: usize,
    iter: Iter<'a, DiEdge<W, NodeIx>>,
}

impl<W, NodeIx> Iterator for Edges<'_, W, NodeIx>
where
    W: Copy,
    NodeIx: IndexTrait,
{
    type Item = Edge<W>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|DiEdge { target, weight }| Edge {
            source: self.source,
            target: target.as_(),
            weight: *weight,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

/// Undirected graph stored as one adjacency list per node. Every edge appears in the lists of
/// both endpoints, except self-loops which are stored once.
pub struct UnGraph<W, NodeIx = usize>
where
    W: Copy,
    NodeIx: IndexTrait,
    <NodeIx as TryFrom<usize>>::Error: Debug,
{
    pub(crate) edges: Vec<Vec<DiEdge<W, NodeIx>>>,
    total_edges: usize,
}

impl<W, NodeIx> UnGraph<W, NodeIx>
where
    W: Copy,
    NodeIx: IndexTrait,
    <NodeIx as TryFrom<usize>>::Error: Debug,
{
    pub fn with_capacity(nodes: usize) -> Self {
        UnGraph {
            edges: Vec::with_capacity(nodes),
            total_edges: 0,
        }
    }

    pub fn with_nodes(nodes: usize) -> Self {
        let mut g = Self::with_capacity(nodes);
        g.edges.resize_with(nodes, Vec::new);
        g
    }

    pub fn add_node(&mut self) -> usize {
        self.edges.push(vec![]);
        self.edges.len() - 1
    }

    pub fn add_edge(&mut self, source: usize, target: usize, weight: W) {
        self.edges[source].push(DiEdge {
            target: to_index(target),
            weight,
        });
        if source != target {
            self.edges[target].push(DiEdge {
                target: to_index(source),
                weight,
            });
        }
        self.total_edges += 1;
    }

    /// Remove one `source -- target` edge. Returns false if no such edge exists.
    pub fn remove_edge(&mut self, source: usize, target: usize) -> bool {
        let Some(pos) = self.find(source, target) else {
            return false;
        };
        self.edges[source].swap_remove(pos);
        if source != target {
            if let Some(pos) = self.find(target, source) {
                self.edges[target].swap_remove(pos);
            }
        }
        self.total_edges -= 1;
        true
    }

    pub fn contains_edge(&self, source: usize, target: usize) -> bool {
        self.find(source, target).is_some()
    }

    fn find(&self, source: usize, target: usize) -> Option<usize> {
        self.edges[source].iter().position(|e| e.target.as_() == target)
    }

    pub fn edge_count(&self) -> usize {
        self.total_edges
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn degree(&self, source: usize) -> usize {
        self.edges[source].len()
    }

    pub fn edges(&self, source: usize) -> Edges<'_, W, NodeIx> {
        Edges {
            source,
            iter: self.edges[source].iter(),
        }
    }

    /// Each undirected edge exactly once, as `source <= target`.
    pub fn edge_references(&self) -> impl Iterator<Item = Edge<W>> + '_ {
        (0..self.node_count())
            .flat_map(move |source| self.edges(source))
            .filter(|e| e.target >= e.source)
    }

    pub fn total_weight(&self) -> f64
    where
        W: AsPrimitive<f64>,
    {
        self.edge_references().fold(0.0, |acc, e| acc + e.weight.as_())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_add_remove() {
        let mut g = UnGraph::<f32, u32>::with_nodes(3);
        g.add_edge(0, 1, 1.0);
        g.add_edge(1, 2, 2.0);
        g.add_edge(2, 2, 0.5);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.degree(1), 2);
        assert_eq!(g.degree(2), 2);
        assert_eq!(g.edge_references().count(), 3);
        assert!((g.total_weight() - 3.5).abs() < 1e-12);

        assert!(g.remove_edge(2, 1));
        assert!(!g.remove_edge(1, 2));
        assert!(!g.contains_edge(1, 2));
        assert!(g.contains_edge(1, 0));
        assert!(g.remove_edge(2, 2));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.degree(2), 0);
    }

    #[test]
    fn test_edges_from_source() {
        let mut g = UnGraph::<f32, usize>::with_capacity(2);
        let a = g.add_node();
        let b = g.add_node();
        g.add_edge(a, b, 4.0);
        let e: Vec<_> = g.edges(b).map(|e| (e.source, e.target(), e.weight())).collect();
        assert_eq!(e, vec![(b, a, 4.0)]);
    }
}
