use crate::choose::{choose_community, Selection};
use crate::labelset::Labelset;
use crate::network::Adjacency;
use crate::scan::CommunityScan;
use log::debug;
use rayon::prelude::*;

/// Find the vertices which should be processed after a batch of edge deletions and insertions,
/// using delta-screening.
///
/// Both batches must be undirected and sorted by source vertex (see
/// [`Batch::undirected`](crate::Batch::undirected)); `graph` and `vertex_weights` describe the
/// graph after the update, `labelsets` the communities before it.
///
/// - A deletion within one community flags its source and the source's neighbors, and
///   flags that community.
/// - The cross-community insertions of one source are scanned together and a new labelset is
///   chosen with threshold `belonging * vertex_weights[u]`. The source is flagged. If the
///   chosen primary community differs from the current one, the source's neighbors and the
///   chosen community are flagged too.
/// - Every member (by primary community) of a flagged community is flagged.
pub fn affected_vertices_delta_screening<G: Adjacency, const L: usize>(
    graph: &G,
    deletions: &[(usize, usize)],
    insertions: &[(usize, usize, f64)],
    labelsets: &[Labelset<L>],
    vertex_weights: &[f64],
    belonging: f64,
    selection: Selection,
) -> Vec<bool> {
    let span = graph.span();
    let mut scan = CommunityScan::new(span);
    let mut vertices = vec![false; span];
    let mut neighbors = vec![false; span];
    let mut communities = vec![false; span];

    for &(u, v) in deletions {
        let cu = labelsets[u].primary();
        if cu != labelsets[v].primary() {
            continue;
        }
        vertices[u] = true;
        neighbors[u] = true;
        communities[cu] = true;
    }

    for run in insertions.chunk_by(|a, b| a.0 == b.0) {
        let u = run[0].0;
        let cu = labelsets[u].primary();
        let mut crossing = false;
        for &(_, v, w) in run {
            if labelsets[v].primary() == cu {
                continue;
            }
            crossing = true;
            scan.scan_edge(u, v, w, labelsets, false);
        }
        if !crossing {
            continue;
        }
        vertices[u] = true;
        if scan.is_empty() {
            continue;
        }

        let labels: Labelset<L> = choose_community(&mut scan, u, belonging * vertex_weights[u], selection);
        scan.clear();
        let cl = labels.primary();
        if cl == cu {
            continue;
        }
        neighbors[u] = true;
        communities[cl] = true;
    }

    for u in graph.vertices() {
        if neighbors[u] {
            for (v, _) in graph.neighbors(u) {
                vertices[v] = true;
            }
        }
    }
    vertices
        .par_iter_mut()
        .zip(labelsets.par_iter())
        .for_each(|(affected, labels)| {
            if communities[labels.primary()] {
                *affected = true;
            }
        });

    debug!(
        "delta-screening: {} of {} vertices affected",
        vertices.iter().filter(|&&a| a).count(),
        span
    );
    vertices
}

/// Find the vertices which should be processed after a batch of edge deletions and insertions,
/// using the frontier heuristic: the source of every deletion within a community and of every
/// insertion across communities is flagged, nothing else.
pub fn affected_vertices_frontier<G: Adjacency, const L: usize>(
    graph: &G,
    deletions: &[(usize, usize)],
    insertions: &[(usize, usize, f64)],
    labelsets: &[Labelset<L>],
) -> Vec<bool> {
    let mut vertices = vec![false; graph.span()];
    for &(u, v) in deletions {
        if labelsets[u].primary() == labelsets[v].primary() {
            vertices[u] = true;
        }
    }
    for &(u, v, _) in insertions {
        if labelsets[u].primary() != labelsets[v].primary() {
            vertices[u] = true;
        }
    }
    vertices
}
