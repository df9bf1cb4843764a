use itertools::Itertools;
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::{
    args::Arguments,
    emission::MISSING,
    gmap::{self, ConstantRate, GeneticMap, RecombinationMap},
    matrix::{self, Matrix, MatrixBuilder},
    model::{self, ModelParameters},
    samples::{self, PopulationLabels, Samples},
    sites::{self, Sites},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error, source {source:?}, file: {file:?}")]
    Io {
        source: std::io::Error,
        file: Option<String>,
    },
    #[error("{0:?}")]
    ParseLineError(#[from] ParseLineError),
    #[error("sites error: {0:?}")]
    Site(#[from] sites::Error),
    #[error("sample error: {0:?}")]
    Sample(#[from] samples::Error),
    #[error("genotype matrix error: {0:?}")]
    Matrix(#[from] matrix::Error),
    #[error("genetic map error: {0:?}")]
    Gmap(#[from] gmap::Error),
    #[error("parameter error: {0:?}")]
    Model(#[from] model::Error),
    #[error("genotype file has no sites")]
    NoSites,
    #[error("line {line}: expect {expect} genotype columns, found {actual}")]
    GenotypeColumns {
        line: usize,
        expect: usize,
        actual: usize,
    },
    #[error(
        "cannot use the pseudohaploid model on data with heterozygous sites; \
         pseudohaploids should be coded as 0 and 2"
    )]
    ConfigHetInPseudohaploid,
    #[error("all genotypes are 0 or 2; use the pseudohaploid model (--pseudohaploid)")]
    ConfigNoHetInDiploid,
    #[error("reference panel for {0} is empty")]
    ConfigEmptyPanel(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseLineError {
    #[error("Cannot read column {0}")]
    ReadColumnError(&'static str),
    #[error("Cannot parse column {column} at line {line}: {value:?}")]
    ParseColumnError {
        column: &'static str,
        line: usize,
        value: String,
    },
    #[error("Cannot read line")]
    ReadLineError,
}

/// Parse one genotype cell; missing can be written as `3`, `-1` or `.`.
pub fn parse_genotype(field: &str) -> Option<u8> {
    match field {
        "0" => Some(0),
        "1" => Some(1),
        "2" => Some(2),
        "3" | "-1" | "." => Some(MISSING),
        _ => None,
    }
}

/// Recombination map chosen on the command line.
pub enum RecMap {
    Constant(ConstantRate),
    Map(GeneticMap),
}

impl RecombinationMap for RecMap {
    fn distance(&self, pos_a: u32, pos_b: u32) -> f64 {
        match self {
            RecMap::Constant(r) => r.distance(pos_a, pos_b),
            RecMap::Map(m) => m.distance(pos_a, pos_b),
        }
    }
}

pub struct InputData {
    /// arguments
    pub args: Arguments,
    /// resolved model parameters (missing probability filled in)
    pub params: ModelParameters,
    /// genotype matrix, one row per sample, one column per site
    pub geno: Matrix<u8>,
    pub sites: Sites,
    pub samples: Samples,
    pub labels: PopulationLabels,
    pub rmap: RecMap,
    /// samples to run as queries
    pub queries: Vec<usize>,
    /// samples usable as reference parents
    pub panel: Vec<usize>,
}

impl InputData {
    pub fn from_args(args: &Arguments) -> Result<Self, Error> {
        let mut params = ModelParameters::from_args(args)?;
        let (mut geno, mut sites, samples) = Self::read_genotype_file(&args.genotypes)?;

        if let Some(max_snps) = args.max_snps {
            sites.truncate(max_snps);
            // still site oriented
            geno.truncate_rows(max_snps);
        }
        if sites.is_empty() {
            return Err(Error::NoSites);
        }

        Self::check_model_vs_genotypes(&geno, params.pseudohaploid)?;

        if params.missing_probability.is_none() {
            let m = Self::missing_fraction(&geno);
            if m > 0.0 {
                log::info!("Found {}% missing genotypes", (m * 100.0).round() as u32);
            }
            params.missing_probability = Some(m);
            params.validate()?;
        }

        // sample oriented
        geno.transpose();

        let labels = PopulationLabels::from_file(&args.populations, &samples)?;
        let queries = match args.individual.as_ref() {
            Some(s) => samples.indices_of(&samples::parse_id_list(s)?[..])?,
            None => (0..samples.len()).collect(),
        };
        let panel = match args.panel.as_ref() {
            Some(s) => samples.indices_of(&samples::parse_id_list(s)?[..])?,
            None => (0..samples.len()).collect(),
        };
        labels.check_labelled(&samples, &panel)?;
        for q in queries.iter() {
            if panel.iter().all(|x| x == q) {
                return Err(Error::ConfigEmptyPanel(samples.v()[*q].clone()));
            }
        }

        let rmap = match args.rec_args.genetic_map.as_ref() {
            Some(p) => {
                let gmap = GeneticMap::from_plink_map(p, sites.get_chrname())?;
                log::info!(
                    "Genetic map of chromosome {} spans {:.2} cM",
                    sites.get_chrname(),
                    gmap.get_size_cm()
                );
                RecMap::Map(gmap)
            }
            None => RecMap::Constant(ConstantRate::new(args.rec_args.rec_rate)?),
        };

        Ok(Self {
            args: args.clone(),
            params,
            geno,
            sites,
            samples,
            labels,
            rmap,
            queries,
            panel,
        })
    }

    /// Read the genotype table. The returned matrix is site oriented.
    pub fn read_genotype_file(
        data_file: impl AsRef<Path>,
    ) -> Result<(Matrix<u8>, Sites, Samples), Error> {
        let file = Some(data_file.as_ref().to_string_lossy().to_string());
        let mut f = File::open(data_file.as_ref())
            .map(BufReader::new)
            .map_err(|source| Error::Io {
                source,
                file: file.clone(),
            })?;

        let mut line = String::with_capacity(100000);
        f.read_line(&mut line).map_err(|source| Error::Io {
            source,
            file: file.clone(),
        })?;
        let samples = Samples::from_names(line.trim().split('\t').skip(2))?;
        line.clear();

        let nsam = samples.len();
        let mut geno = MatrixBuilder::<u8>::new(nsam);
        let mut sites = Sites::new();
        let mut iline = 1;

        while f
            .read_line(&mut line)
            .map_err(|_| ParseLineError::ReadLineError)?
            != 0
        {
            iline += 1;
            if line.trim().is_empty() {
                line.clear();
                continue;
            }
            let mut fields = line.trim().split('\t');
            let chrname = fields
                .next()
                .ok_or(ParseLineError::ReadColumnError("chrom"))?;
            let pos_str = fields.next().ok_or(ParseLineError::ReadColumnError("pos"))?;
            let pos: u32 = pos_str
                .parse()
                .map_err(|_| ParseLineError::ParseColumnError {
                    column: "pos",
                    line: iline,
                    value: pos_str.to_owned(),
                })?;
            sites.add(chrname, pos)?;

            let mut cnt = 0;
            for field in fields {
                let g = parse_genotype(field).ok_or_else(|| ParseLineError::ParseColumnError {
                    column: "genotype",
                    line: iline,
                    value: field.to_owned(),
                })?;
                geno.push(g);
                cnt += 1;
            }
            if cnt != nsam {
                return Err(Error::GenotypeColumns {
                    line: iline,
                    expect: nsam,
                    actual: cnt,
                });
            }
            line.clear();
        }
        sites.finish()?;

        Ok((geno.finish()?, sites, samples))
    }

    fn check_model_vs_genotypes(geno: &Matrix<u8>, pseudohaploid: bool) -> Result<(), Error> {
        let has_het = geno.as_slice().iter().any(|x| *x == 1);
        match (pseudohaploid, has_het) {
            (true, true) => Err(Error::ConfigHetInPseudohaploid),
            (false, false) => Err(Error::ConfigNoHetInDiploid),
            _ => Ok(()),
        }
    }

    pub fn missing_fraction(geno: &Matrix<u8>) -> f64 {
        let data = geno.as_slice();
        if data.is_empty() {
            return 0.0;
        }
        data.iter().filter(|x| **x == MISSING).count() as f64 / data.len() as f64
    }

    pub fn get_nsites(&self) -> usize {
        self.sites.len()
    }

    /// Reference pool of `query`: the panel without the query itself.
    pub fn reference_panel(&self, query: usize) -> ReferencePanel<'_> {
        let members = self.panel.iter().copied().filter(|x| *x != query).collect();
        ReferencePanel::new(&self.geno, members)
    }
}

/// Genotypes of the haplotypes a query can copy from. Pool index `h` refers
/// to sample `members[h]` of the full genotype matrix.
pub struct ReferencePanel<'a> {
    geno: &'a Matrix<u8>,
    members: Vec<usize>,
    freq: Vec<f64>,
}

impl<'a> ReferencePanel<'a> {
    pub fn new(geno: &'a Matrix<u8>, members: Vec<usize>) -> Self {
        let nsites = geno.get_ncols();
        let mut sum = vec![0u32; nsites];
        let mut cnt = vec![0u32; nsites];
        for m in members.iter() {
            for (t, g) in geno[*m].iter().enumerate() {
                if *g != MISSING {
                    sum[t] += *g as u32;
                    cnt[t] += 1;
                }
            }
        }
        let freq = sum
            .iter()
            .zip(cnt.iter())
            .map(|(s, c)| match c {
                0 => 0.5,
                c => *s as f64 / *c as f64 / 2.0,
            })
            .collect();
        Self {
            geno,
            members,
            freq,
        }
    }

    pub fn get_k(&self) -> usize {
        self.members.len()
    }

    pub fn get_nsites(&self) -> usize {
        self.geno.get_ncols()
    }

    pub fn genotype(&self, h: usize, t: usize) -> u8 {
        self.geno.get_at(self.members[h], t)
    }

    /// Mean non-missing panel genotype at `t` divided by 2.
    pub fn allele_freq(&self, t: usize) -> f64 {
        self.freq[t]
    }

    /// Sample index in the full genotype matrix.
    pub fn sample_index(&self, h: usize) -> usize {
        self.members[h]
    }
}

pub struct SegRecord<'a> {
    pub sample: &'a str,
    pub chrname: &'a str,
    pub start_pos: u32,
    pub end_pos: u32,
    pub first: &'a str,
    pub second: &'a str,
    pub n_snp: usize,
}

/// Tab-delimited segment writer.
pub struct SegWriter {
    file: BufWriter<File>,
    path: String,
}

impl SegWriter {
    pub fn create(path: String, columns: (&str, &str)) -> Result<Self, Error> {
        let mut file = File::create(&path)
            .map(BufWriter::new)
            .map_err(|source| Error::Io {
                source,
                file: Some(path.clone()),
            })?;
        writeln!(
            &mut file,
            "sample\tchr\tstart\tend\t{}\t{}\tNsnp",
            columns.0, columns.1
        )
        .map_err(|source| Error::Io {
            source,
            file: Some(path.clone()),
        })?;
        Ok(Self { file, path })
    }

    pub fn add_seg(&mut self, seg: &SegRecord) -> Result<(), Error> {
        writeln!(
            self.file,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            seg.sample, seg.chrname, seg.start_pos, seg.end_pos, seg.first, seg.second, seg.n_snp,
        )
        .map_err(|source| Error::Io {
            source,
            file: Some(self.path.clone()),
        })
    }

    /// Write runs of identical consecutive pairs as segments.
    pub fn add_track<T: PartialEq>(
        &mut self,
        sample: &str,
        chrname: &str,
        pos: &[u32],
        track: &[(T, T)],
        name: impl Fn(&T) -> String,
    ) -> Result<(), Error> {
        for (_key, group) in &track
            .iter()
            .zip(pos.iter())
            .group_by(|(pair, _)| *pair)
        {
            let group: Vec<_> = group.collect();
            let (pair, start_pos) = group[0];
            let end_pos = group[group.len() - 1].1;
            let first = name(&pair.0);
            let second = name(&pair.1);
            self.add_seg(&SegRecord {
                sample,
                chrname,
                start_pos: *start_pos,
                end_pos: *end_pos,
                first: &first,
                second: &second,
                n_snp: group.len(),
            })?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.file.flush().map_err(|source| Error::Io {
            source,
            file: Some(self.path.clone()),
        })
    }
}

/// Output files named from the `--output` prefix.
pub struct OutputFiles {
    pub ancestry: SegWriter,
    pub best_parents: Option<SegWriter>,
}

impl OutputFiles {
    pub fn new_from_args(args: &Arguments) -> Result<Self, Error> {
        let prefix = &args.output;
        let ancestry = SegWriter::create(
            format!("{prefix}.ancestry.txt"),
            ("ancestry1", "ancestry2"),
        )?;
        let best_parents = match args.best_parents {
            true => Some(SegWriter::create(
                format!("{prefix}.best_parents.txt"),
                ("parent1", "parent2"),
            )?),
            false => None,
        };
        Ok(Self {
            ancestry,
            best_parents,
        })
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.ancestry.flush()?;
        if let Some(bp) = self.best_parents.as_mut() {
            bp.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn write_test_inputs(dir: &Path, genotypes: &str, labels: &str) -> Arguments {
    let geno_path = dir.join("geno.txt");
    let pop_path = dir.join("pops.txt");
    std::fs::write(&geno_path, genotypes).unwrap();
    std::fs::write(&pop_path, labels).unwrap();
    let mut args = Arguments::new_for_test();
    args.genotypes = geno_path.to_string_lossy().to_string();
    args.populations = pop_path.to_string_lossy().to_string();
    args.output = dir.join("out").to_string_lossy().to_string();
    args
}

#[test]
fn read_inputdata() {
    let dir = tempfile::tempdir().unwrap();
    let args = write_test_inputs(
        dir.path(),
        "chrom\tpos\ts1\ts2\ts3\n1\t100\t0\t1\t2\n1\t200\t3\t3\t-1\n1\t300\t2\t.\t0\n",
        "s1\tA\ns2\tA\ns3\tB\n",
    );
    let input = InputData::from_args(&args).unwrap();
    assert_eq!(input.get_nsites(), 3);
    assert_eq!(input.samples.v(), &vec!["s1", "s2", "s3"]);
    // sample oriented
    assert_eq!(&input.geno[0], &[0, 3, 2]);
    assert_eq!(&input.geno[2], &[2, 3, 0]);
    let m = input.params.get_missing_probability();
    assert!((m - 4.0 / 9.0).abs() < 1e-12);

    let panel = input.reference_panel(0);
    assert_eq!(panel.get_k(), 2);
    assert_eq!(panel.sample_index(0), 1);
    assert_eq!(panel.genotype(1, 0), 2);
    assert!((panel.allele_freq(0) - 0.75).abs() < 1e-12);
    // every panel genotype missing
    assert!((panel.allele_freq(1) - 0.5).abs() < 1e-12);
}

#[test]
fn read_inputdata_max_snps_and_subsets() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = write_test_inputs(
        dir.path(),
        "chrom\tpos\ts1\ts2\ts3\n1\t100\t0\t1\t2\n1\t200\t0\t1\t2\n1\t300\t2\t1\t0\n",
        "s1\tA\ns2\tA\ns3\tB\n",
    );
    args.max_snps = Some(2);
    args.individual = Some("s3".into());
    args.panel = Some("s1,s2".into());
    let input = InputData::from_args(&args).unwrap();
    assert_eq!(input.get_nsites(), 2);
    assert_eq!(input.geno.get_ncols(), 2);
    assert_eq!(input.queries, vec![2]);
    assert_eq!(input.panel, vec![0, 1]);
    assert_eq!(input.reference_panel(2).get_k(), 2);
}

#[test]
fn read_inputdata_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    let geno_het = "chrom\tpos\ts1\ts2\n1\t100\t0\t1\n1\t200\t2\t1\n";
    let geno_hom = "chrom\tpos\ts1\ts2\n1\t100\t0\t2\n1\t200\t2\t0\n";
    let labels = "s1\tA\ns2\tB\n";

    let mut args = write_test_inputs(dir.path(), geno_het, labels);
    args.pseudohaploid = true;
    assert!(matches!(
        InputData::from_args(&args),
        Err(Error::ConfigHetInPseudohaploid)
    ));

    let args = write_test_inputs(dir.path(), geno_hom, labels);
    assert!(matches!(
        InputData::from_args(&args),
        Err(Error::ConfigNoHetInDiploid)
    ));

    // panel sample without a label
    let args = write_test_inputs(dir.path(), geno_het, "s1\tA\n");
    assert!(matches!(
        InputData::from_args(&args),
        Err(Error::Sample(samples::Error::MissingLabel(_)))
    ));

    // unsorted positions
    let args = write_test_inputs(
        dir.path(),
        "chrom\tpos\ts1\ts2\n1\t200\t0\t1\n1\t100\t2\t1\n",
        labels,
    );
    assert!(matches!(
        InputData::from_args(&args),
        Err(Error::Site(sites::Error::Unsorted { .. }))
    ));

    // bad genotype code
    let args = write_test_inputs(dir.path(), "chrom\tpos\ts1\ts2\n1\t100\t0\t5\n", labels);
    assert!(matches!(
        InputData::from_args(&args),
        Err(Error::ParseLineError(_))
    ));
}

#[test]
fn write_segments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seg.txt").to_string_lossy().to_string();
    let mut w = SegWriter::create(path.clone(), ("ancestry1", "ancestry2")).unwrap();
    let track = [(0u16, 0u16), (0, 0), (0, 1), (0, 0)];
    let names = ["A", "B"];
    w.add_track("q", "1", &[10, 20, 30, 40], &track, |x| {
        names[*x as usize].to_owned()
    })
    .unwrap();
    w.flush().unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines[0], "sample\tchr\tstart\tend\tancestry1\tancestry2\tNsnp");
    assert_eq!(lines[1], "q\t1\t10\t20\tA\tA\t2");
    assert_eq!(lines[2], "q\t1\t30\t30\tA\tB\t1");
    assert_eq!(lines[3], "q\t1\t40\t40\tA\tA\t1");
    assert_eq!(lines.len(), 4);
}
