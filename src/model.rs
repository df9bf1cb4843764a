use crate::args::Arguments;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error, source: {source:?}, path: {path:?}")]
    Io {
        source: std::io::Error,
        path: std::path::PathBuf,
    },
    #[error("toml parsing error: {0:?}")]
    TomlParsingError(#[from] toml::de::Error),
    #[error("toml serialize error: {0:?}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("invalid parameter {name}: {value} ({expect})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        expect: &'static str,
    },
}

/// Run parameters shared by every sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// effective population size
    pub effective_population_size: u32,
    /// probability of imperfect copying from a parent
    pub mutation_probability: f64,
    /// probability mass for a missing genotype; estimated from the input
    /// genotypes when absent
    pub missing_probability: Option<f64>,
    /// down-weight of (het, het) parents emitting a het
    pub triple_het_weight: f64,
    /// number of traceback paths voting for the local ancestry
    pub n_traceback_paths: usize,
    /// number of sites in the smoothing window; below 2 disables smoothing
    pub smoothing_window: usize,
    /// genotypes are pseudohaploid, coded 0/2 only
    pub pseudohaploid: bool,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            effective_population_size: 14000,
            mutation_probability: 0.01,
            missing_probability: None,
            triple_het_weight: 0.01,
            n_traceback_paths: 9,
            smoothing_window: 1,
            pseudohaploid: false,
        }
    }
}

impl ModelParameters {
    pub fn from_args(args: &Arguments) -> Result<Self> {
        let params = match args.params.as_ref() {
            Some(path) => Self::from_toml_file(path)?,
            None => Self {
                effective_population_size: args.ne,
                mutation_probability: args.mtp,
                missing_probability: args.missing_probability,
                triple_het_weight: args.thw,
                n_traceback_paths: args.npt,
                smoothing_window: args.window,
                pseudohaploid: args.pseudohaploid,
            },
        };
        params.validate()?;
        Ok(params)
    }

    pub fn from_toml_file<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let mut s = String::new();
        let p: &Path = path.as_ref();
        std::fs::File::open(p)
            .map_err(|e| Error::Io {
                source: e,
                path: p.to_owned(),
            })?
            .read_to_string(&mut s)
            .map_err(|e| Error::Io {
                source: e,
                path: p.to_owned(),
            })?;
        let params: Self = toml::from_str(&s)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |name, value, expect| {
            Err(Error::InvalidParameter {
                name,
                value,
                expect,
            })
        };
        if self.effective_population_size == 0 {
            return invalid("effective_population_size", 0.0, "> 0");
        }
        let p = self.mutation_probability;
        if !(p > 0.0 && p < 1.0) {
            return invalid("mutation_probability", p, "in (0, 1)");
        }
        if let Some(m) = self.missing_probability {
            if !(0.0..1.0).contains(&m) {
                return invalid("missing_probability", m, "in [0, 1)");
            }
        }
        if !(self.triple_het_weight >= 0.0) {
            return invalid("triple_het_weight", self.triple_het_weight, ">= 0");
        }
        let npt = self.n_traceback_paths;
        if npt == 0 || npt > u16::MAX as usize {
            return invalid("n_traceback_paths", npt as f64, "in 1..=65535");
        }
        Ok(())
    }

    /// Missing probability once it has been resolved against the data.
    pub fn get_missing_probability(&self) -> f64 {
        self.missing_probability.unwrap_or(0.0)
    }
}

#[test]
fn test_params_validate() {
    let mut params = ModelParameters::default();
    assert!(params.validate().is_ok());

    params.mutation_probability = 1.0;
    assert!(matches!(
        params.validate(),
        Err(Error::InvalidParameter {
            name: "mutation_probability",
            ..
        })
    ));

    params.mutation_probability = 0.01;
    params.missing_probability = Some(1.0);
    assert!(params.validate().is_err());

    params.missing_probability = Some(0.0);
    params.n_traceback_paths = 0;
    assert!(params.validate().is_err());

    // traceback ranks are stored as u16
    params.n_traceback_paths = u16::MAX as usize;
    assert!(params.validate().is_ok());
    params.n_traceback_paths = u16::MAX as usize + 1;
    assert!(matches!(
        params.validate(),
        Err(Error::InvalidParameter {
            name: "n_traceback_paths",
            ..
        })
    ));
}

#[test]
fn test_params_toml() {
    let params = ModelParameters {
        missing_probability: Some(0.05),
        smoothing_window: 5,
        ..Default::default()
    };
    let s = params.to_toml_string().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.toml");
    std::fs::write(&path, s).unwrap();
    assert_eq!(ModelParameters::from_toml_file(&path).unwrap(), params);
}
