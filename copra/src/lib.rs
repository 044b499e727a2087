//! Overlapping community detection by label propagation (COPRA), with incremental updates
#![deny(missing_docs)]
#![deny(warnings)]

/// Bounded per-vertex lists of communities and belonging coefficients
pub mod labelset;

/// Data structure for storing a weighted, undirected graph (aka network)
pub mod network;

/// Accumulation of neighbor community weights for one vertex
pub mod scan;

/// Selection of a vertex's communities from a scan
pub mod choose;

/// The label propagation driver
pub mod copra;

/// Detection of vertices affected by a batch of edge updates
pub mod affected;

/// Edge list and update batch files
pub mod edgelist;

mod graph;


pub use affected::{affected_vertices_delta_screening, affected_vertices_frontier};
pub use choose::{choose_community, Selection};
pub use copra::{best_communities, initialize, vertex_weights, Copra, CopraOptions, CopraResult, SweepMode};
pub use labelset::{Labelset, LABELS};
pub use network::{Adjacency, Batch, Network};
pub use scan::CommunityScan;
