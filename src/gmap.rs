use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("csv error: {0:?}")]
    CsvError(#[from] csv::Error),
    #[error("csv not enough column error: expect {expect} columns, found {actual} columns")]
    CsvNotEnoughColumns { expect: usize, actual: usize },
    #[error("{0:?}")]
    ParseFloatError(#[from] std::num::ParseFloatError),
    #[error("{0:?}")]
    ParseIntError(#[from] std::num::ParseIntError),
    #[error("genetic map should be ordered by position: ({bp}, {cm}) after ({last_bp}, {last_cm})")]
    Unordered {
        bp: u32,
        cm: f64,
        last_bp: u32,
        last_cm: f64,
    },
    #[error("no genetic map records found for chromosome {0}")]
    EmptyChromosome(String),
    #[error("recombination rate should be finite and non-negative, got {0}")]
    InvalidRate(f64),
}

/// Genetic distance between two physical positions on the same chromosome.
pub trait RecombinationMap {
    /// Distance in centiMorgans, never negative.
    fn distance(&self, pos_a: u32, pos_b: u32) -> f64;
}

/// Uniform recombination rate given in cM per Mb.
#[derive(Debug, Clone, Copy)]
pub struct ConstantRate {
    cm_per_bp: f64,
}

impl ConstantRate {
    pub fn new(cm_per_mb: f64) -> Result<Self, Error> {
        if !cm_per_mb.is_finite() || cm_per_mb < 0.0 {
            return Err(Error::InvalidRate(cm_per_mb));
        }
        Ok(Self {
            cm_per_bp: cm_per_mb / 1e6,
        })
    }
}

impl RecombinationMap for ConstantRate {
    fn distance(&self, pos_a: u32, pos_b: u32) -> f64 {
        pos_a.abs_diff(pos_b) as f64 * self.cm_per_bp
    }
}

/// Piecewise linear map from base pairs to centiMorgans for one chromosome.
pub struct GeneticMap(Vec<(u32, f64)>);

impl FromIterator<(u32, f64)> for GeneticMap {
    fn from_iter<T: IntoIterator<Item = (u32, f64)>>(iter: T) -> Self {
        let v: Vec<_> = iter.into_iter().collect();
        Self(v)
    }
}

impl GeneticMap {
    /// Read a PLINK map (`chr id cM bp`, whitespace separated) keeping the
    /// records of `chrom`.
    pub fn from_plink_map(p: impl AsRef<Path>, chrom: &str) -> Result<Self, Error> {
        let mut v = vec![(0, 0.0)];
        let mut record = csv::StringRecord::new();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b' ')
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&p)?;

        let mut found = false;
        while reader.read_record(&mut record)? {
            let fields: Vec<&str> = record.iter().filter(|x| !x.is_empty()).collect();
            if fields.len() < 4 {
                return Err(Error::CsvNotEnoughColumns {
                    expect: 4,
                    actual: fields.len(),
                });
            }
            if fields[0] != chrom {
                continue;
            }
            found = true;
            let cm = fields[2].parse::<f64>()?;
            // use 0-based position
            let bp: u32 = fields[3].parse::<u32>()?.saturating_sub(1);
            if bp == 0 {
                continue;
            }
            let (last_bp, last_cm) = v[v.len() - 1];
            if bp <= last_bp || cm < last_cm {
                return Err(Error::Unordered {
                    bp,
                    cm,
                    last_bp,
                    last_cm,
                });
            }
            v.push((bp, cm));
        }
        if !found {
            return Err(Error::EmptyChromosome(chrom.to_owned()));
        }
        Ok(Self(v))
    }

    pub fn get_cm(&self, bp: u32) -> f64 {
        let idx = self.0.partition_point(|e| e.0 <= bp).saturating_sub(1);
        let (x1, y1) = self.0[idx];
        // flat beyond the last record
        let Some(&(x2, y2)) = self.0.get(idx + 1) else {
            return y1;
        };
        let slope = (y2 - y1) / (x2 - x1) as f64;
        let mut cm = bp.saturating_sub(x1) as f64 * slope + y1;
        if cm < y1 {
            cm = y1;
        } else if cm > y2 {
            cm = y2;
        }
        cm
    }

    pub fn get_cm_len(&self, s: u32, e: u32) -> f64 {
        self.get_cm(e) - self.get_cm(s)
    }

    pub fn get_size_cm(&self) -> f64 {
        let n = self.0.len();
        self.0[n - 1].1 - self.0[0].1
    }
}

impl RecombinationMap for GeneticMap {
    fn distance(&self, pos_a: u32, pos_b: u32) -> f64 {
        self.get_cm_len(pos_a, pos_b).abs()
    }
}

#[test]
fn test_constant_rate() {
    let r = ConstantRate::new(1.0).unwrap();
    assert!((r.distance(1_000_000, 3_000_000) - 2.0).abs() < 1e-12);
    assert_eq!(r.distance(3_000_000, 1_000_000), r.distance(1_000_000, 3_000_000));
    assert!(ConstantRate::new(-1.0).is_err());
}

#[test]
fn test_genetic_map_interpolation() {
    let gmap: GeneticMap = [(0, 0.0), (100, 1.0), (300, 2.0)].into_iter().collect();
    assert!((gmap.get_cm(50) - 0.5).abs() < 1e-12);
    assert!((gmap.get_cm(200) - 1.5).abs() < 1e-12);
    // flat beyond the last record
    assert!((gmap.get_cm(1000) - 2.0).abs() < 1e-12);
    assert!((gmap.distance(200, 50) - 1.0).abs() < 1e-12);
    assert!((gmap.get_size_cm() - 2.0).abs() < 1e-12);
}

#[test]
fn test_read_plink_map() {
    use std::io::Write;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chr1.map");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "1 . 0.5 101").unwrap();
    writeln!(f, "1 . 1.5 201").unwrap();
    writeln!(f, "2 . 9.0 101").unwrap();
    drop(f);

    let gmap = GeneticMap::from_plink_map(&path, "1").unwrap();
    assert!((gmap.distance(100, 200) - 1.0).abs() < 1e-12);
    assert!(matches!(
        GeneticMap::from_plink_map(&path, "3"),
        Err(Error::EmptyChromosome(_))
    ));
}
