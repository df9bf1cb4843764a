use crate::{
    ancestry::{self, combine_ancestry, reconcile_phase, smooth_ancestry},
    data::InputData,
    emission::{Emission, EmissionModel, PseudohaploidEmissionModel},
    transition::TransitionModel,
    viterbi::{self, PairViterbi},
};
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("viterbi error: {0}")]
    Viterbi(#[from] viterbi::Error),
    #[error("ancestry error: {0}")]
    Ancestry(#[from] ancestry::Error),
    #[error("reference sample {0} has no population label")]
    MissingLabel(String),
}

/// Inference result for one query sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    /// sample indices of the two parents along the best path, phase corrected
    pub best_parents: Vec<(usize, usize)>,
    /// population label ids of the two parents per site
    pub local_ancestry: Vec<(u16, u16)>,
}

pub struct HmmRunner<'a> {
    data: &'a InputData,
}

impl<'a> HmmRunner<'a> {
    pub fn new(data: &'a InputData) -> Self {
        Self { data }
    }

    /// Decode the parents of `query` and call its local ancestry.
    pub fn run_on_sample(&self, query: usize) -> Result<SampleResult> {
        let data = self.data;
        let params = &data.params;
        let name = &data.samples.v()[query];
        let panel = data.reference_panel(query);
        let k = panel.get_k();
        log::debug!("{name}: decoding against {k} reference samples");

        let transition = TransitionModel::new(
            k,
            params.effective_population_size,
            &data.rmap,
            data.sites.get_pos_slice(),
        );
        let p = params.mutation_probability;
        let m = params.get_missing_probability();
        let emission: Box<dyn Emission> = match params.pseudohaploid {
            true => Box::new(PseudohaploidEmissionModel::new(p, m)),
            false => Box::new(EmissionModel::new(p, m, params.triple_het_weight)),
        };

        let paths = PairViterbi::new().decode(
            &transition,
            &*emission,
            &panel,
            &data.geno[query],
            params.n_traceback_paths,
        )?;
        log::trace!("{name}: {} traceback paths", paths.len());

        let paths: Vec<Vec<(usize, usize)>> = paths
            .iter()
            .map(|path| {
                reconcile_phase(path)
                    .into_iter()
                    .map(|(a, b)| {
                        (
                            panel.sample_index(a as usize),
                            panel.sample_index(b as usize),
                        )
                    })
                    .collect()
            })
            .collect();

        let ancestries = paths
            .iter()
            .map(|path| {
                path.iter()
                    .map(|&(a, b)| -> Result<(u16, u16)> {
                        Ok((self.label(a)?, self.label(b)?))
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        let local_ancestry =
            smooth_ancestry(combine_ancestry(ancestries)?, params.smoothing_window);

        let best_parents = paths.into_iter().next().unwrap_or_default();
        Ok(SampleResult {
            best_parents,
            local_ancestry,
        })
    }

    /// Like `run_on_sample` but a failure (error or panic) is logged and
    /// turned into `None` so the other samples can go on.
    pub fn run_on_sample_safe(&self, query: usize) -> Option<SampleResult> {
        let name = &self.data.samples.v()[query];
        match catch_unwind(AssertUnwindSafe(|| self.run_on_sample(query))) {
            Ok(Ok(res)) => Some(res),
            Ok(Err(e)) => {
                log::error!("{name}: skipped, {e}");
                None
            }
            Err(_) => {
                log::error!("{name}: skipped, inference panicked");
                None
            }
        }
    }

    fn label(&self, sample: usize) -> Result<u16> {
        self.data
            .labels
            .label_of(sample)
            .ok_or_else(|| Error::MissingLabel(self.data.samples.v()[sample].clone()))
    }
}

#[cfg(test)]
fn toy_input(dir: &std::path::Path) -> InputData {
    use crate::data::write_test_inputs;
    let mut args = write_test_inputs(
        dir,
        "chrom\tpos\tq\tr1\tr2\tr3\n\
         1\t1000000\t0\t0\t2\t1\n\
         1\t2000000\t1\t0\t2\t1\n\
         1\t3000000\t2\t0\t2\t1\n",
        "r1\tA\nr2\tA\nr3\tB\n",
    );
    args.panel = Some("r1,r2,r3".into());
    args.individual = Some("q".into());
    args.missing_probability = Some(0.0);
    args.npt = 3;
    InputData::from_args(&args).unwrap()
}

#[test]
fn test_run_on_sample() {
    let dir = tempfile::tempdir().unwrap();
    let input = toy_input(dir.path());
    let runner = HmmRunner::new(&input);
    let res = runner.run_on_sample(0).unwrap();

    assert_eq!(res.local_ancestry.len(), 3);
    assert_eq!(res.best_parents.len(), 3);
    let a = input.labels.label_of(1).unwrap();
    let b = input.labels.label_of(3).unwrap();
    for &(x, y) in res.local_ancestry.iter() {
        assert!([a, b].contains(&x) && [a, b].contains(&y));
    }
    // parents come from the panel, never the query itself
    for &(x, y) in res.best_parents.iter() {
        assert!((1..4).contains(&x) && (1..4).contains(&y));
    }
    for w in res.best_parents.windows(2) {
        assert!(w[0].0 == w[1].0 || w[0].1 == w[1].1);
    }
    // the het site is best explained by the two homozygous parents
    let (x, y) = res.best_parents[1];
    assert_eq!((x.min(y), x.max(y)), (1, 2));

    assert_eq!(runner.run_on_sample_safe(0), Some(res));
}

#[test]
fn test_run_on_sample_safe() {
    let dir = tempfile::tempdir().unwrap();
    let mut input = toy_input(dir.path());
    input.params.n_traceback_paths = 0;
    let runner = HmmRunner::new(&input);
    assert!(matches!(
        runner.run_on_sample(0),
        Err(Error::Viterbi(viterbi::Error::NoPaths))
    ));
    assert_eq!(runner.run_on_sample_safe(0), None);
}

#[test]
fn test_ancestry_pairs_sorted_by_label_name() {
    use crate::data::write_test_inputs;
    let dir = tempfile::tempdir().unwrap();
    let mut args = write_test_inputs(
        dir.path(),
        "chrom\tpos\tq\tr1\tr2\tr3\n\
         1\t1000000\t1\t0\t2\t1\n\
         1\t2000000\t1\t0\t2\t1\n\
         1\t3000000\t2\t0\t2\t1\n",
        "r3\tB\nr1\tA\nr2\tA\n",
    );
    args.panel = Some("r1,r2,r3".into());
    args.individual = Some("q".into());
    args.missing_probability = Some(0.0);
    args.npt = 3;
    let input = InputData::from_args(&args).unwrap();
    let res = HmmRunner::new(&input).run_on_sample(0).unwrap();

    let names: Vec<_> = res
        .local_ancestry
        .iter()
        .map(|&(x, y)| (input.labels.name(x), input.labels.name(y)))
        .collect();
    for (x, y) in names.iter() {
        assert!(x <= y, "call ({x},{y}) is not ordered by name");
    }
}

#[test]
fn test_zero_missing_probability() {
    use crate::data::write_test_inputs;
    let dir = tempfile::tempdir().unwrap();
    let mut args = write_test_inputs(
        dir.path(),
        "chrom\tpos\tq\tr1\tr2\tr3\n\
         1\t100\t2\t0\t2\t1\n\
         1\t101\t2\t0\t2\t1\n\
         1\t102\t3\t0\t2\t1\n\
         1\t103\t2\t0\t2\t1\n\
         1\t104\t2\t0\t2\t1\n",
        "r1\tA\nr2\tA\nr3\tB\n",
    );
    args.panel = Some("r1,r2,r3".into());
    args.individual = Some("q".into());
    args.missing_probability = Some(0.0);
    args.npt = 3;
    let input = InputData::from_args(&args).unwrap();
    let res = HmmRunner::new(&input).run_on_sample(0).unwrap();
    // the hom-alt parent is kept across the missing call
    assert_eq!(res.best_parents, vec![(2, 2); 5]);
}
