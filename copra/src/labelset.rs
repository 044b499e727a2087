use anyhow::{ensure, Error};
use std::slice::Iter;

/// Maximum number of communities a vertex can belong to at once.
pub const LABELS: usize = 8;

/// Bounded list of `(community, belonging coefficient)` pairs held by one vertex, ordered by
/// descending coefficient. The first entry is the vertex's primary community.
///
/// The number of populated entries is stored explicitly, so a coefficient that underflows to zero
/// never truncates the list.
#[derive(Clone, Copy, Debug)]
pub struct Labelset<const L: usize = LABELS> {
    len: usize,
    labels: [(usize, f64); L],
}

impl<const L: usize> Labelset<L> {
    /// Number of entries that fit in the labelset.
    pub const CAPACITY: usize = L;

    pub(crate) fn empty() -> Self {
        Labelset {
            len: 0,
            labels: [(0, 0.0); L],
        }
    }

    /// Labelset holding only `community`, with a belonging coefficient of 1.
    pub fn singleton(community: usize) -> Self {
        let mut l = Self::empty();
        l.try_push(community, 1.0);
        l
    }

    /// Build a labelset from arbitrary entries. Entries are sorted by descending coefficient.
    /// Coefficients are stored as given; they are not renormalized.
    pub fn from_entries(entries: &[(usize, f64)]) -> Result<Self, Error> {
        ensure!(!entries.is_empty(), "a labelset needs at least one community");
        ensure!(
            entries.len() <= L,
            "{} communities exceed the labelset capacity of {}",
            entries.len(),
            L
        );
        ensure!(
            entries.iter().all(|&(_, b)| b.is_finite() && b >= 0.0),
            "belonging coefficients must be finite and non-negative"
        );
        let mut l = Self::empty();
        for &(c, b) in entries {
            l.try_push(c, b);
        }
        l.labels[..l.len].sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(l)
    }

    /// Append an entry. Returns false, leaving the labelset unchanged, if it is full.
    pub(crate) fn try_push(&mut self, community: usize, coefficient: f64) -> bool {
        if self.len == L {
            return false;
        }
        self.labels[self.len] = (community, coefficient);
        self.len += 1;
        true
    }

    pub(crate) fn normalize(&mut self, total: f64) {
        for (_, b) in self.labels[..self.len].iter_mut() {
            *b /= total;
        }
    }

    /// Number of populated entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no community has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The community with the highest belonging coefficient.
    pub fn primary(&self) -> usize {
        debug_assert!(self.len > 0);
        self.labels[0].0
    }

    /// Belonging coefficient to `community`, or 0 if the vertex is not a member.
    pub fn coefficient(&self, community: usize) -> f64 {
        self.iter().find(|&&(c, _)| c == community).map_or(0.0, |&(_, b)| b)
    }

    /// Sum of all belonging coefficients.
    pub fn total(&self) -> f64 {
        self.iter().map(|&(_, b)| b).sum()
    }

    /// The populated entries.
    pub fn as_slice(&self) -> &[(usize, f64)] {
        &self.labels[..self.len]
    }

    /// Iterate over populated `(community, coefficient)` entries.
    pub fn iter(&self) -> Iter<'_, (usize, f64)> {
        self.as_slice().iter()
    }
}

impl<const L: usize> PartialEq for Labelset<L> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<'a, const L: usize> IntoIterator for &'a Labelset<L> {
    type Item = &'a (usize, f64);
    type IntoIter = Iter<'a, (usize, f64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_singleton() {
        let l = Labelset::<LABELS>::singleton(7);
        assert_eq!(l.len(), 1);
        assert_eq!(l.primary(), 7);
        assert_eq!(l.coefficient(7), 1.0);
        assert_eq!(l.coefficient(3), 0.0);
    }

    #[test]
    fn test_from_entries_sorts() {
        let l = Labelset::<4>::from_entries(&[(1, 0.25), (2, 0.5), (3, 0.25)]).unwrap();
        assert_eq!(l.primary(), 2);
        assert_eq!(l.len(), 3);
        assert!((l.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_capacity() {
        assert!(Labelset::<2>::from_entries(&[(0, 0.3), (1, 0.3), (2, 0.4)]).is_err());
        assert!(Labelset::<2>::from_entries(&[]).is_err());

        let mut l = Labelset::<2>::singleton(0);
        assert!(l.try_push(1, 0.0));
        assert!(!l.try_push(2, 0.5));
        // a zero coefficient still counts as an entry
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn test_eq_ignores_unused_slots() {
        let mut a = Labelset::<3>::empty();
        a.labels[2] = (9, 9.0);
        a.try_push(4, 1.0);
        assert_eq!(a, Labelset::<3>::singleton(4));
    }
}
