use crate::gmap::RecombinationMap;
use std::cell::OnceCell;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transition class requested for site {t}, valid sites are 1..{nsites}")]
    SiteOutOfRange { t: usize, nsites: usize },
}

/// Probability of moving between hidden pairs at adjacent sites, collapsed by
/// how many parents the two pairs share.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionClass {
    pub both_same: f64,
    pub one_same: f64,
    pub both_different: f64,
}

impl TransitionClass {
    pub fn ln(&self) -> [f64; 3] {
        [
            self.both_same.ln(),
            self.one_same.ln(),
            self.both_different.ln(),
        ]
    }
}

/// Transition model over ordered parent pairs where all `k` haplotypes are
/// exchangeable.
///
/// The per-site cache lives in the model, so an instance belongs to a single
/// sample run and is not `Sync`.
pub struct TransitionModel<'a, R: RecombinationMap + ?Sized> {
    k: usize,
    ne: f64,
    rmap: &'a R,
    positions: &'a [u32],
    cache: Vec<OnceCell<TransitionClass>>,
}

impl<'a, R: RecombinationMap + ?Sized> TransitionModel<'a, R> {
    pub fn new(k: usize, ne: u32, rmap: &'a R, positions: &'a [u32]) -> Self {
        let mut cache = Vec::with_capacity(positions.len());
        cache.resize_with(positions.len(), OnceCell::new);
        Self {
            k,
            ne: ne as f64,
            rmap,
            positions,
            cache,
        }
    }

    pub fn get_k(&self) -> usize {
        self.k
    }

    pub fn get_nsites(&self) -> usize {
        self.positions.len()
    }

    /// Transition class between site `t - 1` and site `t`.
    pub fn transition_class(&self, t: usize) -> Result<TransitionClass> {
        if t == 0 || t >= self.positions.len() {
            return Err(Error::SiteOutOfRange {
                t,
                nsites: self.positions.len(),
            });
        }
        Ok(*self.cache[t].get_or_init(|| self.compute(t)))
    }

    fn compute(&self, t: usize) -> TransitionClass {
        let k = self.k as f64;
        // centiMorgans to Morgans
        let d = self.rmap.distance(self.positions[t - 1], self.positions[t]) / 100.0;
        let fac = (-4.0 * self.ne * d / k).exp();
        if fac == 0.0 {
            // limit as fac -> 0, computing 1 - fac would lose all precision
            TransitionClass {
                both_same: 1.0 / (2.0 * k),
                one_same: 2.0 * (1.0 - 1.0 / k) / k,
                both_different: (1.0 - 1.0 / k) * (1.0 - 1.0 / k),
            }
        } else {
            let p = 1.0 - fac;
            TransitionClass {
                both_same: fac * fac,
                one_same: p * fac / k,
                both_different: p * p / (4.0 * k * k),
            }
        }
    }
}

#[cfg(test)]
struct CountingMap {
    cm: f64,
    calls: std::cell::Cell<usize>,
}

#[cfg(test)]
impl RecombinationMap for CountingMap {
    fn distance(&self, _pos_a: u32, _pos_b: u32) -> f64 {
        self.calls.set(self.calls.get() + 1);
        self.cm
    }
}

#[test]
fn test_transition_limits() {
    use crate::gmap::ConstantRate;
    let positions = [1_000_000u32, 1_000_001, 2_000_001, 900_000_000];
    let rmap = ConstantRate::new(1.0).unwrap();
    let model = TransitionModel::new(3, 14000, &rmap, &positions);

    // nearly zero distance: staying put dominates
    let c = model.transition_class(1).unwrap();
    assert!(c.both_same > 0.99);
    assert!(c.one_same < 1e-2);
    assert!(c.both_different < 1e-4);

    // 1 cM with Ne=14000 and k=3: fac is tiny but not zero
    let c = model.transition_class(2).unwrap();
    let fac = (-4.0 * 14000.0 * 0.01 / 3.0f64).exp();
    assert!(fac > 0.0);
    assert!((c.both_same / (fac * fac) - 1.0).abs() < 1e-9);
    assert!((c.one_same / ((1.0 - fac) * fac / 3.0) - 1.0).abs() < 1e-9);
    assert_eq!(c.both_different, 1.0 / 36.0);

    // very far: exact closed-form limit, no NaN
    let c = model.transition_class(3).unwrap();
    assert_eq!(
        c,
        TransitionClass {
            both_same: 1.0 / 6.0,
            one_same: 2.0 * (1.0 - 1.0 / 3.0) / 3.0,
            both_different: (1.0 - 1.0 / 3.0) * (1.0 - 1.0 / 3.0),
        }
    );

    for t in 1..positions.len() {
        let c = model.transition_class(t).unwrap();
        for x in [c.both_same, c.one_same, c.both_different] {
            assert!(x.is_finite());
            assert!((0.0..=1.0).contains(&x));
        }
    }
}

#[test]
fn test_transition_zero_distance() {
    let rmap = CountingMap {
        cm: 0.0,
        calls: Default::default(),
    };
    let positions = [10u32, 20];
    let model = TransitionModel::new(10, 14000, &rmap, &positions);
    let c = model.transition_class(1).unwrap();
    assert_eq!(c.both_same, 1.0);
    assert_eq!(c.one_same, 0.0);
    assert_eq!(c.both_different, 0.0);
}

#[test]
fn test_transition_cache_and_range() {
    let rmap = CountingMap {
        cm: 0.5,
        calls: Default::default(),
    };
    let positions = [10u32, 20, 30];
    let model = TransitionModel::new(4, 100, &rmap, &positions);
    let a = model.transition_class(2).unwrap();
    let b = model.transition_class(2).unwrap();
    assert_eq!(a, b);
    assert_eq!(rmap.calls.get(), 1);

    assert!(matches!(
        model.transition_class(0),
        Err(Error::SiteOutOfRange { t: 0, .. })
    ));
    assert!(model.transition_class(3).is_err());
}
