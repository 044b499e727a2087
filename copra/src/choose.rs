use crate::labelset::Labelset;
use crate::scan::CommunityScan;

/// Parameters of community selection shared by the propagation driver and the
/// affected-vertex detectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    /// Maximum number of communities kept per vertex. Clamped to `1..=` the labelset capacity.
    pub max_membership: usize,
    /// Break weight ties by scan order instead of the id-parity rule.
    pub strict: bool,
}

/// Choose the labelset of vertex `u` from the communities accumulated in `scan`.
///
/// Every community with weight at least `threshold` is kept, heaviest first, up to
/// `max_membership` of them. If none reaches the threshold the heaviest one is kept alone. The
/// kept weights are normalized to sum to 1. A vertex that touched no community (or only
/// zero weight) joins its own community.
///
/// `scan` is left sorted but not cleared.
pub fn choose_community<const L: usize>(
    scan: &mut CommunityScan,
    u: usize,
    threshold: f64,
    selection: Selection,
) -> Labelset<L> {
    let cap = selection.max_membership.clamp(1, L);
    scan.sort(selection.strict);

    let mut labels = Labelset::<L>::empty();
    let mut total = 0.0;

    // 1. Take labels above threshold.
    for &c in scan.touched() {
        let w = scan.weight(c);
        if labels.len() == cap || w < threshold {
            break;
        }
        labels.try_push(c, w);
        total += w;
    }

    // 2. If no labels above threshold, take the best label below threshold.
    if labels.is_empty() {
        if let Some(&c) = scan.touched().first() {
            let w = scan.weight(c);
            labels.try_push(c, w);
            total = w;
        }
    }

    // 3. If no usable label, join your own community.
    if labels.is_empty() || !(total > 0.0 && total.is_finite()) {
        return Labelset::singleton(u);
    }

    // 4. Normalize, such that belonging coefficients sum to 1.
    labels.normalize(total);
    labels
}
