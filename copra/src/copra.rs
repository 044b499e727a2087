use crate::choose::{choose_community, Selection};
use crate::labelset::{Labelset, LABELS};
use crate::network::Adjacency;
use crate::scan::CommunityScan;
use anyhow::{bail, ensure, Error};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Default number of timed repetitions of a run
pub const DEFAULT_REPEAT: usize = 1;
/// Default fraction of vertices allowed to change primary community in a converged sweep
pub const DEFAULT_TOLERANCE: f64 = 0.05;
/// Default maximum number of communities per vertex
pub const DEFAULT_MAX_MEMBERSHIP: usize = LABELS;
/// Default maximum number of sweeps
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// How a sweep reads the labelsets of neighbors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SweepMode {
    /// Every vertex reads the labelsets of the previous sweep and writes into a separate buffer.
    /// Vertices are processed in parallel and the result does not depend on the thread count.
    #[default]
    Synchronous,
    /// Vertices are updated in place, one at a time, in a seeded random order, and later
    /// vertices of a sweep see the updates of earlier ones. Usually converges in fewer sweeps,
    /// to a different result than the synchronous mode.
    Asynchronous,
}

impl FromStr for SweepMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" | "synchronous" => Ok(SweepMode::Synchronous),
            "async" | "asynchronous" => Ok(SweepMode::Asynchronous),
            _ => bail!("Sweep mode not recognized: {}", s),
        }
    }
}

/// Parameters of a COPRA run.
#[derive(Clone, Debug, PartialEq)]
pub struct CopraOptions {
    /// Number of times the whole run is repeated. The reported time is the mean.
    pub repeat: usize,
    /// Convergence is declared once the fraction of vertices whose primary community changed in
    /// a sweep falls below this value.
    pub tolerance: f64,
    /// Maximum number of communities per vertex, at most [`LABELS`].
    pub max_membership: usize,
    /// Maximum number of sweeps.
    pub max_iterations: usize,
    /// Neighbor read semantics of a sweep.
    pub sweep: SweepMode,
    /// Break ties in scan order instead of by the id-parity rule.
    pub strict: bool,
    /// Let self-loops contribute to a vertex's own scan.
    pub self_loops: bool,
    /// Seed for the vertex order of asynchronous sweeps. A seed of 0 is used if not set.
    pub seed: Option<u64>,
}

impl Default for CopraOptions {
    fn default() -> Self {
        CopraOptions {
            repeat: DEFAULT_REPEAT,
            tolerance: DEFAULT_TOLERANCE,
            max_membership: DEFAULT_MAX_MEMBERSHIP,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            sweep: SweepMode::default(),
            strict: false,
            self_loops: false,
            seed: None,
        }
    }
}

impl CopraOptions {
    /// Set the number of timed repetitions
    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat;
        self
    }

    /// Set the convergence tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the maximum number of communities per vertex
    pub fn with_max_membership(mut self, max_membership: usize) -> Self {
        self.max_membership = max_membership;
        self
    }

    /// Set the maximum number of sweeps
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the sweep mode
    pub fn with_sweep(mut self, sweep: SweepMode) -> Self {
        self.sweep = sweep;
        self
    }

    /// Enable or disable strict tie handling
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Include or exclude self-loops when scanning
    pub fn with_self_loops(mut self, self_loops: bool) -> Self {
        self.self_loops = self_loops;
        self
    }

    /// Set the random seed of asynchronous sweeps
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check that the options describe a run that can be executed.
    pub fn validate(&self) -> Result<(), Error> {
        ensure!(self.repeat >= 1, "repeat must be at least 1");
        ensure!(
            self.tolerance.is_finite() && (0.0..=1.0).contains(&self.tolerance),
            "tolerance must lie in [0, 1], got {}",
            self.tolerance
        );
        ensure!(
            (1..=LABELS).contains(&self.max_membership),
            "max membership must lie in 1..={}, got {}",
            LABELS,
            self.max_membership
        );
        Ok(())
    }

    /// The selection parameters implied by these options.
    pub fn selection(&self) -> Selection {
        Selection {
            max_membership: self.max_membership,
            strict: self.strict,
        }
    }
}

/// Outcome of a COPRA run.
#[derive(Clone, Debug)]
pub struct CopraResult {
    /// Primary community of each vertex.
    pub membership: Vec<usize>,
    /// Final labelset of each vertex. Feed these to the affected-vertex detectors and to
    /// [`Copra::run_dynamic`] after the graph changes.
    pub labelsets: Vec<Labelset>,
    /// Number of sweeps executed, including the one that detected convergence.
    pub iterations: usize,
    /// Mean wall time of one repetition.
    pub time: Duration,
}

impl CopraResult {
    fn new(labelsets: Vec<Labelset>, iterations: usize, time: Duration) -> Self {
        CopraResult {
            membership: best_communities(&labelsets),
            labelsets,
            iterations,
            time,
        }
    }
}

/// Total weight of the edges incident to each vertex.
pub fn vertex_weights<G: Adjacency>(graph: &G) -> Vec<f64> {
    graph
        .vertices()
        .into_par_iter()
        .map(|u| graph.neighbors(u).map(|(_, w)| w).sum::<f64>())
        .collect()
}

/// Place each vertex in its own community.
pub fn initialize(span: usize) -> Vec<Labelset> {
    (0..span).map(Labelset::singleton).collect()
}

/// Primary community of each vertex.
pub fn best_communities<const L: usize>(labelsets: &[Labelset<L>]) -> Vec<usize> {
    labelsets.iter().map(Labelset::primary).collect()
}

/// Overlapping community detection by label propagation (COPRA).
pub struct Copra {
    options: CopraOptions,
    rng: ChaCha20Rng,
    // We store these here to reuse heap space between sweeps.
    node_order: Vec<usize>,
    changed: Vec<usize>,
}

impl Copra {
    /// Set up a run. Fails if the options are invalid.
    pub fn new(options: CopraOptions) -> Result<Copra, Error> {
        options.validate()?;
        let seed = options.seed.unwrap_or_default();
        Ok(Copra {
            options,
            rng: ChaCha20Rng::seed_from_u64(seed),
            node_order: Vec::new(),
            changed: Vec::new(),
        })
    }

    /// The options of this run.
    pub fn options(&self) -> &CopraOptions {
        &self.options
    }

    fn reseed(&mut self) {
        self.rng = ChaCha20Rng::seed_from_u64(self.options.seed.unwrap_or_default());
    }

    /// Detect communities from scratch, starting with every vertex in its own community.
    pub fn run<G: Adjacency>(&mut self, graph: &G) -> CopraResult {
        info!(
            "copra: {} vertices, max membership {}, {:?} sweeps",
            graph.span(),
            self.options.max_membership,
            self.options.sweep
        );
        let start = Instant::now();
        let mut labelsets = Vec::new();
        let mut iterations = 0;
        for _ in 0..self.options.repeat {
            self.reseed();
            labelsets = initialize(graph.span());
            iterations = self.propagate(graph, &mut labelsets, None, false);
        }
        let time = start.elapsed().div_f64(self.options.repeat as f64);
        info!("copra: {iterations} iterations in {time:?}");
        CopraResult::new(labelsets, iterations, time)
    }

    /// Update communities after the graph changed, recomputing only vertices flagged in
    /// `affected`. The other vertices keep their labelsets from `labelsets`.
    ///
    /// With `expand`, a recomputed vertex is unflagged and a vertex whose primary community
    /// changed flags its neighbors for the next sweep. Without it the flagged set stays fixed.
    pub fn run_dynamic<G: Adjacency>(
        &mut self,
        graph: &G,
        labelsets: &[Labelset],
        affected: &[bool],
        expand: bool,
    ) -> Result<CopraResult, Error> {
        let span = graph.span();
        ensure!(
            labelsets.len() == span,
            "got {} labelsets for {} vertices",
            labelsets.len(),
            span
        );
        ensure!(
            affected.len() == span,
            "got {} affected flags for {} vertices",
            affected.len(),
            span
        );
        ensure!(
            labelsets.iter().flatten().all(|&(c, _)| c < span),
            "labelsets refer to communities outside of {span} vertices"
        );

        info!(
            "copra: updating {} of {} vertices",
            affected.iter().filter(|&&a| a).count(),
            span
        );
        let start = Instant::now();
        let mut current = Vec::new();
        let mut iterations = 0;
        for _ in 0..self.options.repeat {
            self.reseed();
            current = labelsets.to_vec();
            let mut active = affected.to_vec();
            iterations = self.propagate(graph, &mut current, Some(active.as_mut_slice()), expand);
        }
        let time = start.elapsed().div_f64(self.options.repeat as f64);
        info!("copra: {iterations} iterations in {time:?}");
        Ok(CopraResult::new(current, iterations, time))
    }

    /// Sweep until convergence or until the iteration budget is spent. Returns the number of
    /// sweeps executed.
    fn propagate<G: Adjacency>(
        &mut self,
        graph: &G,
        labelsets: &mut Vec<Labelset>,
        mut active: Option<&mut [bool]>,
        expand: bool,
    ) -> usize {
        let span = graph.span();
        if span == 0 {
            return 0;
        }

        let mut next = match self.options.sweep {
            SweepMode::Synchronous => labelsets.clone(),
            SweepMode::Asynchronous => Vec::new(),
        };
        let mut scan = CommunityScan::new(span);

        for iteration in 1..=self.options.max_iterations {
            let changed = match self.options.sweep {
                SweepMode::Synchronous => {
                    let changed = self.sweep_synchronous(graph, labelsets, &mut next, active.as_deref());
                    if expand {
                        if let Some(active) = active.as_deref_mut() {
                            self.expand_frontier(graph, labelsets, &next, active);
                        }
                    }
                    std::mem::swap(labelsets, &mut next);
                    changed
                }
                SweepMode::Asynchronous => {
                    self.sweep_asynchronous(graph, labelsets, &mut scan, active.as_deref_mut(), expand)
                }
            };

            let fraction = changed as f64 / span as f64;
            debug!("sweep {iteration}: {changed} vertices changed primary community ({fraction:.4})");
            if fraction < self.options.tolerance {
                return iteration;
            }
        }

        warn!(
            "copra: no convergence within {} iterations",
            self.options.max_iterations
        );
        self.options.max_iterations
    }

    /// Recompute every (active) vertex from the labelsets of the previous sweep, writing into
    /// `next`. Returns the number of vertices whose primary community changed.
    fn sweep_synchronous<G: Adjacency>(
        &self,
        graph: &G,
        current: &[Labelset],
        next: &mut [Labelset],
        active: Option<&[bool]>,
    ) -> usize {
        let span = graph.span();
        let selection = self.options.selection();
        let max_membership = self.options.max_membership as f64;
        let self_loops = self.options.self_loops;

        let chunk_size = ((span as f64) / (rayon::current_num_threads() as f64)) as usize;
        let chunk_size = std::cmp::max(256, chunk_size);

        next.par_chunks_mut(chunk_size)
            .enumerate()
            .map(|(chunk, next)| {
                // each chunk gets a private scratch accumulator
                let mut scan = CommunityScan::new(span);
                let mut changed = 0;

                for (offset, labels) in next.iter_mut().enumerate() {
                    let u = chunk * chunk_size + offset;
                    if active.is_some_and(|a| !a[u]) {
                        *labels = current[u];
                        continue;
                    }

                    scan.scan_vertex(graph, u, current, self_loops);
                    let threshold = scan.total_weight() / max_membership;
                    *labels = choose_community(&mut scan, u, threshold, selection);
                    scan.clear();

                    if labels.primary() != current[u].primary() {
                        changed += 1;
                    }
                }
                changed
            })
            .sum()
    }

    /// Replace the active set by the neighbors of vertices whose primary community changed
    /// between `current` and `next`.
    fn expand_frontier<G: Adjacency>(
        &mut self,
        graph: &G,
        current: &[Labelset],
        next: &[Labelset],
        active: &mut [bool],
    ) {
        self.changed.clear();
        self.changed
            .extend((0..graph.span()).filter(|&u| active[u] && next[u].primary() != current[u].primary()));
        active.fill(false);
        for &u in &self.changed {
            for (v, _) in graph.neighbors(u) {
                active[v] = true;
            }
        }
    }

    /// Recompute every (active) vertex in place, in a random order. Returns the number of
    /// vertices whose primary community changed.
    fn sweep_asynchronous<G: Adjacency>(
        &mut self,
        graph: &G,
        labelsets: &mut [Labelset],
        scan: &mut CommunityScan,
        mut active: Option<&mut [bool]>,
        expand: bool,
    ) -> usize {
        let selection = self.options.selection();
        let max_membership = self.options.max_membership as f64;
        let self_loops = self.options.self_loops;

        self.node_order.clear();
        self.node_order.extend(graph.vertices());
        self.node_order.shuffle(&mut self.rng);

        let mut changed = 0;
        for &u in &self.node_order {
            if let Some(active) = active.as_deref_mut() {
                if !active[u] {
                    continue;
                }
                if expand {
                    active[u] = false;
                }
            }

            scan.scan_vertex(graph, u, labelsets, self_loops);
            let threshold = scan.total_weight() / max_membership;
            let labels: Labelset = choose_community(scan, u, threshold, selection);
            scan.clear();

            if labels.primary() != labelsets[u].primary() {
                changed += 1;
                if expand {
                    if let Some(active) = active.as_deref_mut() {
                        for (v, _) in graph.neighbors(u) {
                            active[v] = true;
                        }
                    }
                }
            }
            labelsets[u] = labels;
        }
        changed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Network;

    fn path() -> Network {
        Network::from_edges(3, vec![(0, 1, 1.0), (1, 2, 1.0)]).unwrap()
    }

    #[test]
    fn test_validate() {
        assert!(CopraOptions::default().validate().is_ok());
        assert!(Copra::new(CopraOptions::default().with_max_membership(LABELS + 1)).is_err());
        assert!(Copra::new(CopraOptions::default().with_max_membership(0)).is_err());
        assert!(Copra::new(CopraOptions::default().with_tolerance(f64::NAN)).is_err());
        assert!(Copra::new(CopraOptions::default().with_repeat(0)).is_err());
    }

    #[test]
    fn test_sweep_mode_from_str() {
        assert_eq!("sync".parse::<SweepMode>().unwrap(), SweepMode::Synchronous);
        assert_eq!("asynchronous".parse::<SweepMode>().unwrap(), SweepMode::Asynchronous);
        assert!("gauss".parse::<SweepMode>().is_err());
    }

    #[test]
    fn test_vertex_weights() {
        let n = Network::from_edges(4, vec![(0, 1, 1.0), (1, 2, 2.5)]).unwrap();
        assert_eq!(vertex_weights(&n), vec![1.0, 3.5, 2.5, 0.0]);
    }

    #[test]
    fn test_first_sweep_on_path() {
        let n = path();
        let copra = Copra::new(CopraOptions::default()).unwrap();
        let current = initialize(3);
        let mut next = current.clone();
        let changed = copra.sweep_synchronous(&n, &current, &mut next, None);

        assert_eq!(changed, 3);
        assert_eq!(next[0].as_slice(), &[(1, 1.0)]);
        assert_eq!(next[1].as_slice(), &[(2, 0.5), (0, 0.5)]);
        assert_eq!(next[2].as_slice(), &[(1, 1.0)]);

        // same ids give the same tie break every time
        let mut again = current.clone();
        copra.sweep_synchronous(&n, &current, &mut again, None);
        assert_eq!(next, again);

        let strict = Copra::new(CopraOptions::default().with_strict(true)).unwrap();
        strict.sweep_synchronous(&n, &current, &mut next, None);
        assert_eq!(next[1].primary(), 0);
    }

    #[test]
    fn test_isolated_vertices_keep_their_own_community() {
        let n = Network::from_edges(4, vec![(0, 1, 1.0)]).unwrap();
        for sweep in [SweepMode::Synchronous, SweepMode::Asynchronous] {
            let mut copra = Copra::new(CopraOptions::default().with_sweep(sweep)).unwrap();
            let result = copra.run(&n);
            assert_eq!(result.labelsets[2], Labelset::singleton(2));
            assert_eq!(result.labelsets[3], Labelset::singleton(3));
        }
    }

    #[test]
    fn test_inactive_vertices_are_kept() {
        let n = path();
        let copra = Copra::new(CopraOptions::default()).unwrap();
        let current = initialize(3);
        let mut next = current.clone();
        let changed = copra.sweep_synchronous(&n, &current, &mut next, Some(&[false, true, false]));
        assert_eq!(changed, 1);
        assert_eq!(next[0], current[0]);
        assert_eq!(next[2], current[2]);
    }

    #[test]
    fn test_zero_iterations() {
        let mut copra = Copra::new(CopraOptions::default().with_max_iterations(0)).unwrap();
        let result = copra.run(&path());
        assert_eq!(result.iterations, 0);
        assert_eq!(result.membership, vec![0, 1, 2]);
    }

    #[test]
    fn test_run_dynamic_checks_lengths() {
        let n = path();
        let mut copra = Copra::new(CopraOptions::default()).unwrap();
        assert!(copra.run_dynamic(&n, &initialize(2), &[true; 3], false).is_err());
        assert!(copra.run_dynamic(&n, &initialize(3), &[true; 2], false).is_err());
        let outside = vec![Labelset::singleton(0), Labelset::singleton(1), Labelset::singleton(7)];
        assert!(copra.run_dynamic(&n, &outside, &[true; 3], false).is_err());
    }
}
