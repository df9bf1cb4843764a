//! Two-parent Viterbi decoder returning the `n` best traceback paths.
//!
//! Hidden states are unordered pairs of reference haplotypes `(i, j)` with
//! `i <= j`. Scores are kept in log space; every state keeps its `n` best
//! partial paths (list Viterbi) so that `n` distinct tracebacks can be
//! recovered at the end.
use crate::{
    data::ReferencePanel,
    emission::{self, Emission, MISSING},
    gmap::RecombinationMap,
    transition::{self, TransitionModel},
};

pub type Result<T> = std::result::Result<T, Error>;

/// One decoded hidden pair per site, each pair sorted by pool index.
pub type TracebackPath = Vec<(u32, u32)>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no observations to decode")]
    EmptyObservations,
    #[error("reference panel is empty")]
    EmptyPanel,
    #[error("number of traceback paths should be at least 1")]
    NoPaths,
    #[error("number of traceback paths {0} exceeds {max}", max = u16::MAX)]
    TooManyPaths(usize),
    #[error("{what} has {actual} sites, expect {expect}")]
    LengthMismatch {
        what: &'static str,
        expect: usize,
        actual: usize,
    },
    #[error("{0}")]
    Emission(#[from] emission::Error),
    #[error("{0}")]
    Transition(#[from] transition::Error),
}

#[derive(Clone, Copy, Debug)]
struct Cand {
    score: f64,
    state: u32,
    rank: u16,
}

/// Insert `c` into `list`, kept sorted best-first and capped at `n`.
fn push_top(list: &mut Vec<Cand>, c: Cand, n: usize) {
    if list.len() == n {
        match list.last() {
            Some(last) if c.score > last.score => {
                list.pop();
            }
            _ => return,
        }
    }
    let idx = list.partition_point(|x| x.score >= c.score);
    list.insert(idx, c);
}

#[derive(Debug, Default)]
pub struct PairViterbi;

impl PairViterbi {
    pub fn new() -> Self {
        Self
    }

    /// Unordered pool pairs in state-index order.
    pub fn states(k: usize) -> Vec<(u32, u32)> {
        let mut v = Vec::with_capacity(k * (k + 1) / 2);
        for i in 0..k as u32 {
            for j in i..k as u32 {
                v.push((i, j));
            }
        }
        v
    }

    pub fn decode<R, E>(
        &self,
        transition: &TransitionModel<R>,
        emission: &E,
        panel: &ReferencePanel,
        observations: &[u8],
        n_paths: usize,
    ) -> Result<Vec<TracebackPath>>
    where
        R: RecombinationMap + ?Sized,
        E: Emission + ?Sized,
    {
        let nsites = observations.len();
        let k = panel.get_k();
        if nsites == 0 {
            return Err(Error::EmptyObservations);
        }
        if k == 0 {
            return Err(Error::EmptyPanel);
        }
        if n_paths == 0 {
            return Err(Error::NoPaths);
        }
        if n_paths > u16::MAX as usize {
            return Err(Error::TooManyPaths(n_paths));
        }
        for (what, actual) in [
            ("transition model", transition.get_nsites()),
            ("reference panel", panel.get_nsites()),
        ] {
            if actual != nsites {
                return Err(Error::LengthMismatch {
                    what,
                    expect: nsites,
                    actual,
                });
            }
        }

        let states = Self::states(k);
        let nstates = states.len();
        let mut ln_emission = vec![0.0; nstates];

        // n best partial paths per state at the current site
        let mut cur: Vec<Vec<Cand>> = vec![Vec::with_capacity(n_paths); nstates];
        let mut next: Vec<Vec<Cand>> = vec![Vec::with_capacity(n_paths); nstates];
        // backpointers (state, rank) per site per state per rank
        let mut back: Vec<Vec<Vec<(u32, u16)>>> = Vec::with_capacity(nsites);

        // initiation with a uniform prior over states
        let ln_init = -(nstates as f64).ln();
        self.fill_ln_emission(emission, panel, &states, observations, 0, &mut ln_emission)?;
        for (s, list) in cur.iter_mut().enumerate() {
            list.push(Cand {
                score: ln_init + ln_emission[s],
                state: u32::MAX,
                rank: 0,
            });
        }
        back.push(vec![vec![]; nstates]);

        let mut row_top: Vec<Vec<Cand>> = vec![Vec::with_capacity(n_paths); k];
        let mut global_top: Vec<Cand> = Vec::with_capacity(n_paths);
        let mut buf: Vec<Cand> = Vec::with_capacity(4 * n_paths);

        // induction
        for t in 1..nsites {
            let [ln_both_same, ln_one_same, ln_both_diff] =
                transition.transition_class(t)?.ln();
            self.fill_ln_emission(emission, panel, &states, observations, t, &mut ln_emission)?;

            // best predecessors per shared haplotype and overall
            row_top.iter_mut().for_each(|x| x.clear());
            global_top.clear();
            for (s, list) in cur.iter().enumerate() {
                let (a, b) = states[s];
                for (r, e) in list.iter().enumerate() {
                    let c = Cand {
                        score: e.score,
                        state: s as u32,
                        rank: r as u16,
                    };
                    push_top(&mut row_top[a as usize], c, n_paths);
                    if b != a {
                        push_top(&mut row_top[b as usize], c, n_paths);
                    }
                    push_top(&mut global_top, c, n_paths);
                }
            }

            let mut back_t = Vec::with_capacity(nstates);
            for (s, &(c, d)) in states.iter().enumerate() {
                buf.clear();
                let shift = |x: &Cand, w: f64| Cand {
                    score: x.score + w,
                    ..*x
                };
                buf.extend(cur[s].iter().enumerate().map(|(r, x)| Cand {
                    score: x.score + ln_both_same,
                    state: s as u32,
                    rank: r as u16,
                }));
                buf.extend(row_top[c as usize].iter().map(|x| shift(x, ln_one_same)));
                if d != c {
                    buf.extend(row_top[d as usize].iter().map(|x| shift(x, ln_one_same)));
                }
                buf.extend(global_top.iter().map(|x| shift(x, ln_both_diff)));

                // a predecessor reachable through several groups keeps its
                // best weight
                buf.sort_by(|x, y| {
                    (x.state, x.rank)
                        .cmp(&(y.state, y.rank))
                        .then(y.score.total_cmp(&x.score))
                });
                buf.dedup_by_key(|x| (x.state, x.rank));
                buf.sort_by(|x, y| {
                    y.score
                        .total_cmp(&x.score)
                        .then((x.state, x.rank).cmp(&(y.state, y.rank)))
                });
                buf.truncate(n_paths);

                let list = &mut next[s];
                list.clear();
                list.extend(buf.iter().map(|x| Cand {
                    score: x.score + ln_emission[s],
                    ..*x
                }));
                back_t.push(buf.iter().map(|x| (x.state, x.rank)).collect());
            }
            back.push(back_t);
            std::mem::swap(&mut cur, &mut next);
        }

        // termination: n best end points over all states
        let mut ends: Vec<Cand> = cur
            .iter()
            .enumerate()
            .flat_map(|(s, list)| {
                list.iter().enumerate().map(move |(r, x)| Cand {
                    score: x.score,
                    state: s as u32,
                    rank: r as u16,
                })
            })
            .collect();
        ends.sort_by(|x, y| {
            y.score
                .total_cmp(&x.score)
                .then((x.state, x.rank).cmp(&(y.state, y.rank)))
        });
        ends.truncate(n_paths);

        // backtracking
        let paths = ends
            .iter()
            .map(|end| {
                let mut path = vec![(0u32, 0u32); nsites];
                let (mut s, mut r) = (end.state, end.rank);
                for t in (0..nsites).rev() {
                    path[t] = states[s as usize];
                    if t > 0 {
                        (s, r) = back[t][s as usize][r as usize];
                    }
                }
                path
            })
            .collect();
        Ok(paths)
    }

    fn fill_ln_emission<E: Emission + ?Sized>(
        &self,
        emission: &E,
        panel: &ReferencePanel,
        states: &[(u32, u32)],
        observations: &[u8],
        t: usize,
        out: &mut [f64],
    ) -> Result<()> {
        let obs = observations[t];
        // a missing call emits the same probability from every state, possibly
        // zero: leave the scores unchanged
        if obs == MISSING {
            out.iter_mut().for_each(|x| *x = 0.0);
            return Ok(());
        }
        let freq = panel.allele_freq(t);
        for (x, &(i, j)) in out.iter_mut().zip(states.iter()) {
            let hid = (
                panel.genotype(i as usize, t),
                panel.genotype(j as usize, t),
            );
            *x = emission.probability(hid, obs, freq)?.ln();
        }
        Ok(())
    }
}

#[cfg(test)]
fn panel_from_rows(rows: &[&[u8]]) -> crate::matrix::Matrix<u8> {
    let mut b = crate::matrix::MatrixBuilder::new(rows[0].len());
    for row in rows {
        for x in row.iter() {
            b.push(*x);
        }
    }
    b.finish().unwrap()
}

#[test]
fn test_push_top() {
    let mut list = vec![];
    for (i, score) in [1.0, 5.0, 3.0, 4.0, 2.0].into_iter().enumerate() {
        let c = Cand {
            score,
            state: i as u32,
            rank: 0,
        };
        push_top(&mut list, c, 3);
    }
    let scores: Vec<_> = list.iter().map(|x| x.score).collect();
    assert_eq!(scores, vec![5.0, 4.0, 3.0]);
}

#[test]
fn test_decode_best_path() {
    use crate::emission::EmissionModel;
    use crate::gmap::ConstantRate;

    // haplotype 0 is all hom-ref, 1 all hom-alt, 2 all het
    let geno = panel_from_rows(&[&[0, 0, 0, 0], &[2, 2, 2, 2], &[1, 1, 1, 1], &[9, 9, 9, 9]]);
    let panel = ReferencePanel::new(&geno, vec![0, 1, 2]);
    let positions = [1_000_000u32, 2_000_000, 3_000_000, 4_000_000];
    let rmap = ConstantRate::new(1.0).unwrap();
    let trans = TransitionModel::new(panel.get_k(), 14000, &rmap, &positions);
    let emiss = EmissionModel::new(0.01, 0.0, 0.01);
    let obs = [1u8, 1, 1, 1];

    let paths = PairViterbi::new()
        .decode(&trans, &emiss, &panel, &obs, 3)
        .unwrap();
    assert_eq!(paths.len(), 3);
    assert_eq!(paths[0], vec![(0, 1); 4]);
    for path in paths.iter() {
        assert_eq!(path.len(), 4);
        assert!(path.iter().all(|(i, j)| i <= j && *j < 3));
    }
    // the n best paths are distinct
    assert_ne!(paths[0], paths[1]);
    assert_ne!(paths[1], paths[2]);
    assert_ne!(paths[0], paths[2]);
}

#[test]
fn test_decode_errors() {
    use crate::emission::EmissionModel;
    use crate::gmap::ConstantRate;

    let geno = panel_from_rows(&[&[0, 0], &[2, 2]]);
    let positions = [1u32, 2];
    let rmap = ConstantRate::new(1.0).unwrap();
    let emiss = EmissionModel::new(0.01, 0.0, 0.01);
    let panel = ReferencePanel::new(&geno, vec![0, 1]);
    let trans = TransitionModel::new(2, 14000, &rmap, &positions);
    let vit = PairViterbi::new();

    assert!(matches!(
        vit.decode(&trans, &emiss, &panel, &[0, 0], 0),
        Err(Error::NoPaths)
    ));
    assert!(matches!(
        vit.decode(&trans, &emiss, &panel, &[0], 1),
        Err(Error::LengthMismatch { .. })
    ));
    // unknown genotype code reaches the emission model
    assert!(matches!(
        vit.decode(&trans, &emiss, &panel, &[0, 7], 1),
        Err(Error::Emission(_))
    ));
    assert!(matches!(
        vit.decode(&trans, &emiss, &panel, &[0, 0], u16::MAX as usize + 1),
        Err(Error::TooManyPaths(_))
    ));
    let empty = ReferencePanel::new(&geno, vec![]);
    assert!(matches!(
        vit.decode(&trans, &emiss, &empty, &[0, 0], 1),
        Err(Error::EmptyPanel)
    ));
}

#[test]
fn test_decode_through_missing_site() {
    use crate::emission::EmissionModel;
    use crate::gmap::ConstantRate;

    // haplotype 0 is hom-ref, 1 hom-alt; sites are 1 bp apart
    let geno = panel_from_rows(&[&[0; 5], &[2; 5]]);
    let panel = ReferencePanel::new(&geno, vec![0, 1]);
    let positions = [100u32, 101, 102, 103, 104];
    let rmap = ConstantRate::new(1.0).unwrap();
    let trans = TransitionModel::new(2, 14000, &rmap, &positions);
    let obs = [2u8, 2, MISSING, 2, 2];

    // zero missing probability must not wipe out the path after the gap
    for m in [0.0, 0.2] {
        let emiss = EmissionModel::new(0.01, m, 0.01);
        let paths = PairViterbi::new()
            .decode(&trans, &emiss, &panel, &obs, 2)
            .unwrap();
        assert_eq!(paths[0], vec![(1, 1); 5]);
    }

    // a query with no observed site still decodes
    let emiss = EmissionModel::new(0.01, 0.0, 0.01);
    let paths = PairViterbi::new()
        .decode(&trans, &emiss, &panel, &[MISSING; 5], 1)
        .unwrap();
    assert_eq!(paths[0].len(), 5);
}

#[test]
fn test_states() {
    assert_eq!(
        PairViterbi::states(3),
        vec![(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)]
    );
}
