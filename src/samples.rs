use itertools::Itertools;
use std::{
    collections::HashMap,
    io::{BufRead, BufReader},
    path::Path,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error, source: {source:?}, path: {path:?}")]
    Io {
        source: std::io::Error,
        path: std::path::PathBuf,
    },
    #[error("duplicated sample name: {0}")]
    DuplicatedSample(String),
    #[error("unknown sample name: {0}")]
    UnknownSample(String),
    #[error("population file line {line}: expect `sample<TAB>label`, found {content:?}")]
    BadLabelLine { line: usize, content: String },
    #[error("sample {0} has no population label")]
    MissingLabel(String),
    #[error("too many distinct population labels: {0}")]
    TooManyLabels(usize),
}

/// Sample names in genotype-file column order.
#[derive(Debug, Clone, Default)]
pub struct Samples {
    v: Vec<String>,
    m: HashMap<String, u32>,
}

impl Samples {
    pub fn from_names<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Result<Self> {
        let mut v = vec![];
        let mut m = HashMap::new();
        for x in names {
            let x = x.as_ref();
            if m.contains_key(x) {
                return Err(Error::DuplicatedSample(x.to_owned()));
            }
            m.insert(x.to_owned(), v.len() as u32);
            v.push(x.to_owned());
        }
        Ok(Self { v, m })
    }

    pub fn v(&self) -> &Vec<String> {
        &self.v
    }
    pub fn m(&self) -> &HashMap<String, u32> {
        &self.m
    }
    pub fn len(&self) -> usize {
        self.v.len()
    }
    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.m
            .get(name)
            .map(|i| *i as usize)
            .ok_or_else(|| Error::UnknownSample(name.to_owned()))
    }

    /// Resolve a list of names into sorted, deduplicated sample indices.
    pub fn indices_of<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        let mut v = names
            .iter()
            .map(|x| self.index_of(x.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        v.sort_unstable();
        v.dedup();
        Ok(v)
    }
}

/// Parse a sample id list: either a path to a file with one id per line or a
/// comma-separated list.
pub fn parse_id_list(s: &str) -> Result<Vec<String>> {
    let p = Path::new(s);
    if p.is_file() {
        let content = std::fs::read_to_string(p).map_err(|source| Error::Io {
            source,
            path: p.to_path_buf(),
        })?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .map(str::to_owned)
            .collect())
    } else {
        Ok(s.split(',')
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

/// Population label of each sample, stored as small integer ids.
#[derive(Debug, Clone)]
pub struct PopulationLabels {
    names: Vec<String>,
    by_sample: Vec<Option<u16>>,
}

impl PopulationLabels {
    /// `labels` maps sample name to population name. Samples absent from
    /// `samples` are ignored. Ids follow the sorted label names, so comparing
    /// ids compares names.
    pub fn from_pairs<S: AsRef<str>, L: AsRef<str>>(
        samples: &Samples,
        labels: impl IntoIterator<Item = (S, L)>,
    ) -> Result<Self> {
        let pairs: Vec<(usize, String)> = labels
            .into_iter()
            .filter_map(|(sample, label)| {
                let isam = *samples.m().get(sample.as_ref())?;
                Some((isam as usize, label.as_ref().to_owned()))
            })
            .collect();

        let names: Vec<String> = pairs
            .iter()
            .map(|(_, label)| label.clone())
            .sorted()
            .dedup()
            .collect();
        if names.len() > u16::MAX as usize + 1 {
            return Err(Error::TooManyLabels(names.len()));
        }
        let ids: HashMap<&str, u16> = names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.as_str(), id as u16))
            .collect();

        let mut by_sample = vec![None; samples.len()];
        for (isam, label) in pairs.iter() {
            by_sample[*isam] = ids.get(label.as_str()).copied();
        }
        Ok(Self { names, by_sample })
    }

    pub fn from_file(p: impl AsRef<Path>, samples: &Samples) -> Result<Self> {
        let p = p.as_ref();
        let f = std::fs::File::open(p)
            .map(BufReader::new)
            .map_err(|source| Error::Io {
                source,
                path: p.to_path_buf(),
            })?;
        let mut pairs = vec![];
        for (iline, line) in f.lines().enumerate() {
            let line = line.map_err(|source| Error::Io {
                source,
                path: p.to_path_buf(),
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(sample), Some(label), None) => {
                    pairs.push((sample.to_owned(), label.to_owned()))
                }
                _ => {
                    return Err(Error::BadLabelLine {
                        line: iline + 1,
                        content: line.to_owned(),
                    })
                }
            }
        }
        Self::from_pairs(samples, pairs)
    }

    /// Fail unless every sample in `indices` carries a label.
    pub fn check_labelled(&self, samples: &Samples, indices: &[usize]) -> Result<()> {
        match indices.iter().find(|i| self.by_sample[**i].is_none()) {
            Some(i) => Err(Error::MissingLabel(samples.v()[*i].clone())),
            None => Ok(()),
        }
    }

    pub fn label_of(&self, sample: usize) -> Option<u16> {
        self.by_sample.get(sample).copied().flatten()
    }

    pub fn name(&self, id: u16) -> &str {
        &self.names[id as usize]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[test]
fn test_samples_and_labels() {
    let samples = Samples::from_names(["s1", "s2", "s3"]).unwrap();
    assert!(matches!(
        Samples::from_names(["a", "a"]),
        Err(Error::DuplicatedSample(_))
    ));
    assert_eq!(samples.indices_of(&["s3", "s1", "s3"][..]).unwrap(), vec![0, 2]);
    assert!(samples.index_of("s9").is_err());

    let labels =
        PopulationLabels::from_pairs(&samples, [("s1", "A"), ("s3", "B"), ("zz", "C")]).unwrap();
    assert_eq!(labels.label_of(0), Some(0));
    assert_eq!(labels.label_of(1), None);
    assert_eq!(labels.name(labels.label_of(2).unwrap()), "B");
    assert_eq!(labels.names().len(), 2);
    assert!(labels.check_labelled(&samples, &[0, 2]).is_ok());
    assert!(matches!(
        labels.check_labelled(&samples, &[0, 1]),
        Err(Error::MissingLabel(name)) if name == "s2"
    ));
}

#[test]
fn test_label_ids_follow_name_order() {
    let samples = Samples::from_names(["r1", "r2", "r3"]).unwrap();
    // file order lists B before A
    let labels =
        PopulationLabels::from_pairs(&samples, [("r3", "B"), ("r1", "A"), ("r2", "A")]).unwrap();
    assert_eq!(labels.names(), &["A".to_owned(), "B".to_owned()][..]);
    let (a, b) = (labels.label_of(0).unwrap(), labels.label_of(2).unwrap());
    assert!(a < b);
    assert_eq!(labels.name(a), "A");
    assert_eq!(labels.name(b), "B");
    assert_eq!(labels.label_of(1), Some(a));
}

#[test]
fn test_parse_id_list() {
    assert_eq!(parse_id_list("a, b,,c").unwrap(), vec!["a", "b", "c"]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ids.txt");
    std::fs::write(&path, "x\n\ny\n").unwrap();
    assert_eq!(
        parse_id_list(path.to_str().unwrap()).unwrap(),
        vec!["x", "y"]
    );
}
