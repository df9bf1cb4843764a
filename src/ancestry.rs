//! Turn decoded parent pairs into a local ancestry track: phase correction of
//! each traceback, per-site majority vote across tracebacks, and sliding
//! window smoothing.
use smallvec::SmallVec;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no ancestry paths to combine")]
    NoPaths,
    #[error("ancestry path {ipath} has {actual} sites, expect {expect}")]
    LengthMismatch {
        ipath: usize,
        expect: usize,
        actual: usize,
    },
}

/// Distinct values with their vote counts, in order of first appearance.
type Tally<T> = SmallVec<[(T, usize); 8]>;

fn tally<T: PartialEq + Copy>(votes: impl Iterator<Item = T>) -> Tally<T> {
    let mut counts: Tally<T> = SmallVec::new();
    for v in votes {
        match counts.iter_mut().find(|(x, _)| *x == v) {
            Some((_, n)) => *n += 1,
            None => counts.push((v, 1)),
        }
    }
    counts
}

/// Value with the highest count; the earliest one wins ties.
fn winner<T: Copy>(counts: &Tally<T>) -> Option<T> {
    let mut best: Option<(T, usize)> = None;
    for &(v, n) in counts.iter() {
        match best {
            Some((_, m)) if m >= n => {}
            _ => best = Some((v, n)),
        }
    }
    best.map(|(v, _)| v)
}

/// Make "parent 1" and "parent 2" follow the same lineage across sites.
///
/// Pairs come out of the decoder sorted by haplotype index. Scanning left to
/// right, whenever neither coordinate of a pair matches the previous
/// (corrected) pair, the pair and everything after it are swapped. Greedy and
/// single pass.
pub fn reconcile_phase<T: PartialEq + Copy>(path: &[(T, T)]) -> Vec<(T, T)> {
    let mut out: Vec<(T, T)> = Vec::with_capacity(path.len());
    let mut flipped = false;
    for &(a, b) in path.iter() {
        let mut cur = if flipped { (b, a) } else { (a, b) };
        if let Some(prev) = out.last() {
            if cur.0 != prev.0 && cur.1 != prev.1 {
                flipped = !flipped;
                cur = (cur.1, cur.0);
            }
        }
        out.push(cur);
    }
    out
}

/// Per-site unordered majority vote across ancestry paths.
///
/// A single path is returned as is. Otherwise every call is normalized to
/// `(min, max)` and the most frequent normalized call wins, ties going to the
/// call seen first in path order.
pub fn combine_ancestry<T: Ord + Copy>(mut ancestries: Vec<Vec<(T, T)>>) -> Result<Vec<(T, T)>> {
    let nsites = match ancestries.first() {
        Some(first) => first.len(),
        None => return Err(Error::NoPaths),
    };
    if let Some((ipath, path)) = ancestries
        .iter()
        .enumerate()
        .find(|(_, x)| x.len() != nsites)
    {
        return Err(Error::LengthMismatch {
            ipath,
            expect: nsites,
            actual: path.len(),
        });
    }
    if ancestries.len() == 1 {
        return ancestries.pop().ok_or(Error::NoPaths);
    }

    let combined = (0..nsites)
        .map(|i| {
            let votes = ancestries.iter().map(|path| {
                let (a, b) = path[i];
                (a.min(b), a.max(b))
            });
            // the first path always casts a vote
            winner(&tally(votes)).unwrap_or(ancestries[0][i])
        })
        .collect();
    Ok(combined)
}

/// Sliding-window majority filter.
///
/// Site `i` takes the most frequent call in `[i - w/2, i + w/2)` clipped to the
/// sequence; ties go to the call met first in the window. A window below 2
/// leaves the track untouched.
pub fn smooth_ancestry<T: PartialEq + Copy>(ancestry: Vec<T>, window: usize) -> Vec<T> {
    if window < 2 {
        return ancestry;
    }
    let half = window / 2;
    let n = ancestry.len();
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = n.min(i + half);
            winner(&tally(ancestry[start..end].iter().copied())).unwrap_or(ancestry[i])
        })
        .collect()
}

#[test]
fn test_reconcile_phase() {
    let path = vec![(1, 2), (2, 3), (3, 4), (4, 5)];
    let fixed = reconcile_phase(&path);
    assert_eq!(fixed, vec![(1, 2), (3, 2), (3, 4), (5, 4)]);
    // every pair shares a coordinate with its predecessor
    for w in fixed.windows(2) {
        assert!(w[0].0 == w[1].0 || w[0].1 == w[1].1);
    }

    assert!(reconcile_phase::<u32>(&[]).is_empty());
    assert_eq!(reconcile_phase(&[(7, 8)]), vec![(7, 8)]);
}

#[test]
fn test_reconcile_phase_disjoint() {
    // no shared parent: flip anyway and carry the flip forward
    let path = vec![(1, 2), (3, 4), (3, 5)];
    assert_eq!(reconcile_phase(&path), vec![(1, 2), (4, 3), (5, 3)]);
}

#[test]
fn test_reconcile_phase_idempotent() {
    let paths = [
        vec![(1, 2), (2, 3), (3, 4), (4, 5), (4, 4), (0, 4)],
        vec![(0, 0), (0, 1), (1, 1), (1, 2), (2, 6), (6, 7)],
        vec![(5, 9), (5, 9), (9, 12), (1, 9), (1, 9)],
    ];
    for path in paths.iter() {
        let once = reconcile_phase(path);
        let twice = reconcile_phase(&once);
        assert_eq!(once, twice);
    }
}

#[test]
fn test_reconcile_phase_global_swap() {
    let path = vec![(1, 2), (2, 3), (3, 4), (6, 7), (6, 8), (1, 8)];
    let swapped: Vec<_> = path.iter().map(|(a, b)| (*b, *a)).collect();
    let x = reconcile_phase(&path);
    let y = reconcile_phase(&swapped);
    let y_back: Vec<_> = y.iter().map(|(a, b)| (*b, *a)).collect();
    assert_eq!(x, y_back);
}

#[test]
fn test_combine_single_path_identity() {
    // unnormalized calls survive untouched
    let path = vec![("B", "A"), ("A", "A"), ("B", "B")];
    assert_eq!(combine_ancestry(vec![path.clone()]).unwrap(), path);
}

#[test]
fn test_combine_majority() {
    let ancestries = vec![
        vec![("B", "A"), ("A", "A"), ("A", "B")],
        vec![("A", "B"), ("B", "B"), ("A", "A")],
        vec![("A", "A"), ("A", "A"), ("B", "B")],
    ];
    let combined = combine_ancestry(ancestries).unwrap();
    // site 0: (A,B) twice once normalized
    // site 1: (A,A) twice
    // site 2: three-way tie, first path wins
    assert_eq!(combined, vec![("A", "B"), ("A", "A"), ("A", "B")]);
}

#[test]
fn test_combine_tie_goes_to_first_path() {
    let ancestries = vec![
        vec![(2u16, 2u16)],
        vec![(1, 2)],
        vec![(2, 1)],
        vec![(2, 2)],
    ];
    assert_eq!(combine_ancestry(ancestries).unwrap(), vec![(2, 2)]);
}

#[test]
fn test_combine_errors() {
    assert!(matches!(
        combine_ancestry::<u16>(vec![]),
        Err(Error::NoPaths)
    ));
    assert!(matches!(
        combine_ancestry(vec![vec![(0u16, 1u16)], vec![]]),
        Err(Error::LengthMismatch { ipath: 1, .. })
    ));
}

#[test]
fn test_smooth_identity_small_window() {
    let track = vec![(0, 1), (1, 1), (0, 1), (1, 0)];
    assert_eq!(smooth_ancestry(track.clone(), 0), track);
    assert_eq!(smooth_ancestry(track.clone(), 1), track);
}

#[test]
fn test_smooth_window() {
    let a = (0u16, 0u16);
    let b = (0u16, 1u16);
    let track = vec![a, a, b, a, a, b, b, b];
    // window 3: half = 1, votes from [i - 1, i + 1)
    let smoothed = smooth_ancestry(track.clone(), 3);
    assert_eq!(smoothed, vec![a, a, a, b, a, a, b, b]);

    // window 5: half = 2, votes from [i - 2, i + 2)
    // site 4 sees b, a, a, b: the tie goes to b
    let smoothed = smooth_ancestry(track, 5);
    assert_eq!(smoothed, vec![a, a, a, a, b, a, b, b]);
}

#[test]
fn test_smooth_removes_isolated_call() {
    let a = ("A", "A");
    let b = ("A", "B");
    let track = vec![a, a, a, b, a, a, a];
    assert_eq!(smooth_ancestry(track, 4), vec![a; 7]);
}
