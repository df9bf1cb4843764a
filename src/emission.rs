//! Emission probabilities of an observed genotype given the genotypes of the
//! two copied parents.
//!
//! Genotypes are coded 0 (hom ref), 1 (het), 2 (hom alt) and 3 (missing),
//! both for the observation and for the hidden parents.

pub type Result<T> = std::result::Result<T, Error>;

pub const MISSING: u8 = 3;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown state combination: hidden={hidden:?}, observed={observed}")]
    UnknownState { hidden: (u8, u8), observed: u8 },
}

pub trait Emission {
    /// Probability of observing `obs` when the parents carry `hid`. `freq` is
    /// the allele frequency at the site; models that do not need it ignore it.
    fn probability(&self, hid: (u8, u8), obs: u8, freq: f64) -> Result<f64>;

    fn mutation_probability(&self) -> f64;

    /// Whether the emission is plausible at all.
    fn allowed(&self, hid: (u8, u8), obs: u8, freq: f64) -> Result<bool> {
        Ok(self.probability(hid, obs, freq)? > self.mutation_probability())
    }
}

/// Mendelian transmission with mutation, stored as a fixed lookup table.
#[derive(Debug, Clone)]
pub struct EmissionModel {
    p: f64,
    table: [Option<f64>; 64],
}

fn table_idx(h1: u8, h2: u8, obs: u8) -> Option<usize> {
    if h1 > 3 || h2 > 3 || obs > 3 {
        return None;
    }
    Some(h1 as usize * 16 + h2 as usize * 4 + obs as usize)
}

impl EmissionModel {
    pub fn new(p: f64, m: f64, triple_het_weight: f64) -> Self {
        let q = 1.0 - m;
        // (h1, h2, obs) with h1 >= h2; mutation only applies to non-Mendelian
        // genotypes
        #[rustfmt::skip]
        let cells: [((u8, u8, u8), f64); 40] = [
            ((0, 0, 0), (1.0 - p - p * p) * q),
            ((0, 0, 1), p * q),
            ((0, 0, 2), p * p * q),
            ((0, 0, 3), m),

            ((1, 0, 0), q * (1.0 - p) / 2.0),
            ((1, 0, 1), q * (1.0 - p) / 2.0),
            ((1, 0, 2), q * p),
            ((1, 0, 3), m),

            ((1, 1, 0), q / 4.0),
            ((1, 1, 1), q * triple_het_weight),
            ((1, 1, 2), q / 4.0),
            ((1, 1, 3), m),

            ((2, 0, 0), q * p),
            ((2, 0, 1), q * (1.0 - 2.0 * p)),
            ((2, 0, 2), q * p),
            ((2, 0, 3), m),

            ((2, 1, 0), q * p),
            ((2, 1, 1), q * (1.0 - p) / 2.0),
            ((2, 1, 2), q * (1.0 - p) / 2.0),
            ((2, 1, 3), m),

            ((2, 2, 0), q * p * p),
            ((2, 2, 1), q * p),
            ((2, 2, 2), q * (1.0 - p - p * p)),
            ((2, 2, 3), m),

            ((3, 0, 0), q * (1.0 - p) / 2.0),
            ((3, 0, 1), q * (1.0 - p) / 2.0),
            ((3, 0, 2), q * p),
            ((3, 0, 3), m),

            ((3, 1, 0), q / 3.0),
            ((3, 1, 1), q / 3.0),
            ((3, 1, 2), q / 3.0),
            ((3, 1, 3), m),

            ((3, 2, 0), q * p),
            ((3, 2, 1), q * (1.0 - p) / 2.0),
            ((3, 2, 2), q * (1.0 - p) / 2.0),
            ((3, 2, 3), m),

            ((3, 3, 0), q / 3.0),
            ((3, 3, 1), q / 3.0),
            ((3, 3, 2), q / 3.0),
            ((3, 3, 3), m),
        ];

        let mut table = [None; 64];
        for ((h1, h2, obs), prob) in cells {
            for (a, b) in [(h1, h2), (h2, h1)] {
                if let Some(idx) = table_idx(a, b, obs) {
                    table[idx] = Some(prob);
                }
            }
        }
        Self { p, table }
    }
}

impl Emission for EmissionModel {
    fn probability(&self, hid: (u8, u8), obs: u8, _freq: f64) -> Result<f64> {
        table_idx(hid.0, hid.1, obs)
            .and_then(|idx| self.table[idx])
            .ok_or(Error::UnknownState {
                hidden: hid,
                observed: obs,
            })
    }

    fn mutation_probability(&self) -> f64 {
        self.p
    }
}

/// Pseudohaploid genotypes (0/2 only). Probabilities depend on the allele
/// frequency `z` at the site and are clamped into `[p, 1 - p]`.
#[derive(Debug, Clone)]
pub struct PseudohaploidEmissionModel {
    p: f64,
    m: f64,
}

impl PseudohaploidEmissionModel {
    pub fn new(p: f64, m: f64) -> Self {
        Self { p, m: m.max(0.01) }
    }
}

impl Emission for PseudohaploidEmissionModel {
    fn probability(&self, hid: (u8, u8), obs: u8, z: f64) -> Result<f64> {
        if obs == MISSING {
            return Ok(self.m);
        }
        let prob = match (hid.0, hid.1, obs) {
            (0, 0, 0) => 1.0 - 0.5 * z,
            (0, 0, 2) => 0.5 * z,
            (0, 2, 0) => 0.75 - 0.5 * z,
            (0, 2, 2) => 0.5 + 0.5 * z,
            (2, 0, 0) => 0.75 - 0.5 * z,
            (2, 0, 2) => 0.25 + 0.5 * z,
            (2, 2, 0) => 0.5 - 0.5 * z,
            (2, 2, 2) => 0.5 + 0.5 * z,
            (3, 0, 0) | (0, 3, 0) => 0.25 + 0.75 * (1.0 - z),
            (3, 0, 2) | (0, 3, 2) => 0.75 * z,
            (3, 2, 0) | (2, 3, 0) => 0.75 * (1.0 - z),
            (3, 2, 2) | (2, 3, 2) => 0.25 + 0.75 * z,
            (3, 3, 0) => 1.0 - z,
            (3, 3, 2) => z,
            _ => {
                return Err(Error::UnknownState {
                    hidden: hid,
                    observed: obs,
                })
            }
        };
        Ok(prob.clamp(self.p, 1.0 - self.p))
    }

    fn mutation_probability(&self) -> f64 {
        self.p
    }
}

#[test]
fn test_emission_symmetry() {
    let model = EmissionModel::new(0.01, 0.05, 0.01);
    for h1 in 0..4u8 {
        for h2 in 0..4u8 {
            for obs in 0..4u8 {
                let a = model.probability((h1, h2), obs, 0.5).unwrap();
                let b = model.probability((h2, h1), obs, 0.5).unwrap();
                assert_eq!(a, b);
                assert!((0.0..=1.0).contains(&a));
            }
        }
    }
}

#[test]
fn test_emission_values() {
    let (p, m, thw) = (0.01, 0.1, 0.2);
    let model = EmissionModel::new(p, m, thw);
    // triple het override
    assert_eq!(model.probability((1, 1), 1, 0.0).unwrap(), (1.0 - m) * thw);
    assert_eq!(
        model.probability((0, 0), 0, 0.0).unwrap(),
        (1.0 - p - p * p) * (1.0 - m)
    );
    assert_eq!(
        model.probability((0, 2), 1, 0.0).unwrap(),
        (1.0 - m) * (1.0 - 2.0 * p)
    );
    // Mendelian-consistent observations sum to 1 - m when no genotype is
    // impossible
    let total: f64 = (0..3)
        .map(|obs| model.probability((2, 2), obs, 0.0).unwrap())
        .sum();
    assert!((total - (1.0 - m)).abs() < 1e-12);
}

#[test]
fn test_emission_missing() {
    let m = 0.07;
    let model = EmissionModel::new(0.01, m, 0.01);
    let pseudo = PseudohaploidEmissionModel::new(0.01, m);
    for h1 in 0..4u8 {
        for h2 in 0..4u8 {
            assert_eq!(model.probability((h1, h2), MISSING, 0.3).unwrap(), m);
            assert_eq!(pseudo.probability((h1, h2), MISSING, 0.3).unwrap(), m);
        }
    }
    // floor on the pseudohaploid missing probability
    let pseudo = PseudohaploidEmissionModel::new(0.01, 0.0);
    assert_eq!(pseudo.probability((0, 0), MISSING, 0.3).unwrap(), 0.01);
}

#[test]
fn test_emission_unknown_state() {
    let model = EmissionModel::new(0.01, 0.0, 0.01);
    assert!(matches!(
        model.probability((4, 0), 0, 0.0),
        Err(Error::UnknownState {
            hidden: (4, 0),
            observed: 0
        })
    ));
    assert!(model.probability((0, 0), 5, 0.0).is_err());

    let pseudo = PseudohaploidEmissionModel::new(0.01, 0.0);
    // heterozygous codes never occur in pseudohaploid data
    assert!(pseudo.probability((0, 0), 1, 0.5).is_err());
    assert!(pseudo.probability((1, 0), 0, 0.5).is_err());
}

#[test]
fn test_pseudohaploid_clamp() {
    let p = 0.01;
    let pseudo = PseudohaploidEmissionModel::new(p, 0.0);
    // z = 0: (0, 0, 2) would be 0
    assert_eq!(pseudo.probability((0, 0), 2, 0.0).unwrap(), p);
    // z = 0: (3, 3, 0) would be 1
    assert_eq!(pseudo.probability((3, 3), 0, 0.0).unwrap(), 1.0 - p);
    let v = pseudo.probability((0, 2), 2, 0.5).unwrap();
    assert!((v - 0.75).abs() < 1e-12);
}

#[test]
fn test_emission_allowed() {
    let p = 0.01;
    let model = EmissionModel::new(p, 0.0, 0.01);
    assert!(model.allowed((0, 0), 0, 0.0).unwrap());
    // exactly p is not above p
    assert!(!model.allowed((0, 0), 1, 0.0).unwrap());
    assert!(!model.allowed((0, 0), 2, 0.0).unwrap());

    let pseudo = PseudohaploidEmissionModel::new(p, 0.0);
    assert!(!pseudo.allowed((0, 0), 2, 0.0).unwrap());
    assert!(pseudo.allowed((2, 2), 2, 0.5).unwrap());
}
