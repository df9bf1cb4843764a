use anyhow::Result;
use clap::Parser;
use lace_rs::args::Arguments;
use lace_rs::data::{InputData, OutputFiles};
use lace_rs::hmm::{HmmRunner, SampleResult};
use log::LevelFilter;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

fn main() -> Result<()> {
    let cli = Arguments::parse();
    let filter_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    let start = std::time::Instant::now();
    let input = InputData::from_args(&cli)?;
    log::info!(
        "Loaded {} samples x {} sites on chromosome {}",
        input.samples.len(),
        input.get_nsites(),
        input.sites.get_chrname()
    );
    log::info!("Model parameters:\n{}", input.params.to_toml_string()?);
    log::debug!("{:#?}", &input.args);

    // local pool so --num-threads does not leak into the global rayon pool
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cli.num_threads)
        .build()?;

    let runner = HmmRunner::new(&input);
    let ndone = AtomicUsize::new(0);
    let nqueries = input.queries.len();
    let report = |name: &str| {
        let n = ndone.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!(
            "PROGRESS\t{n}/{nqueries}\t{name}\t{}s",
            start.elapsed().as_secs()
        );
    };

    let results: HashMap<usize, SampleResult> = pool.install(|| -> Result<_> {
        let res: HashMap<usize, SampleResult> = match cli.safe {
            true => input
                .queries
                .par_iter()
                .filter_map(|q| {
                    let res = runner.run_on_sample_safe(*q)?;
                    report(&input.samples.v()[*q]);
                    Some((*q, res))
                })
                .collect(),
            false => input
                .queries
                .par_iter()
                .map(|q| -> Result<(usize, SampleResult)> {
                    let res = runner.run_on_sample(*q)?;
                    report(&input.samples.v()[*q]);
                    Ok((*q, res))
                })
                .collect::<Result<_>>()?,
        };
        Ok(res)
    })?;

    // written in query order regardless of completion order
    let mut out = OutputFiles::new_from_args(&cli)?;
    let chrname = input.sites.get_chrname();
    let pos = input.sites.get_pos_slice();
    for q in input.queries.iter() {
        let Some(res) = results.get(q) else {
            continue;
        };
        let name = &input.samples.v()[*q];
        out.ancestry
            .add_track(name, chrname, pos, &res.local_ancestry, |x| {
                input.labels.name(*x).to_owned()
            })?;
        if let Some(bp) = out.best_parents.as_mut() {
            bp.add_track(name, chrname, pos, &res.best_parents, |x| {
                input.samples.v()[*x].clone()
            })?;
        }
    }
    out.flush()?;

    log::info!(
        "Done: {}/{} samples in {}s",
        results.len(),
        nqueries,
        start.elapsed().as_secs()
    );
    Ok(())
}
