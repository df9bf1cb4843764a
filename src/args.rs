use clap::{Args, Parser};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about, name = "lace-rs", color=clap::ColorChoice::Always, styles=get_styles())]
pub struct Arguments {
    /// File of genotype data.
    /// Format: tab-delimited text file with one single nucleotide
    /// polymorphism (SNP) per line. The first two columns are the chromosome
    /// and position, followed by one sample per column. A header line giving
    /// the sample names is required. Genotypes are coded as 0 (hom ref), 1
    /// (het), 2 (hom alt) and 3 for missing data (-1 and `.` are read as
    /// missing too). Sites must be on a single chromosome and sorted by
    /// position.
    #[arg(short = 'i', long, required = true, help_heading = "input data")]
    pub genotypes: String,

    /// File of population labels. Format: no header, two whitespace-delimited
    /// columns per row: sample id and population label. Every sample used as a
    /// reference parent needs a label.
    #[arg(short = 'p', long, required = true, help_heading = "input data")]
    pub populations: String,

    /// Optional: samples to infer local ancestry for, either a file with one
    /// id per row or a comma-separated list. All samples by default.
    #[arg(long, help_heading = "input data option")]
    pub individual: Option<String>,

    /// Optional: samples allowed as reference parents, either a file with one
    /// id per row or a comma-separated list. All samples by default. A query is
    /// never used as its own parent.
    #[arg(long, help_heading = "input data option")]
    pub panel: Option<String>,

    /// Optional: only use the first `max_snps` sites of the genotype file
    #[arg(short = 'x', long, help_heading = "input data option")]
    pub max_snps: Option<usize>,

    /// output prefix. Local ancestry is written to `<prefix>.ancestry.txt`
    #[arg(short = 'o', long, default_value = "lace.out", help_heading = "output data")]
    pub output: String,

    /// also write the parents of the best traceback path to
    /// `<prefix>.best_parents.txt`
    #[arg(short = 'b', long, default_value_t = false, help_heading = "output option")]
    pub best_parents: bool,

    /// window size (in sites) of the majority filter applied to the ancestry
    /// track; values below 2 disable smoothing
    #[arg(short = 'w', long, default_value_t = 1, help_heading = "output option")]
    pub window: usize,

    // ---- hmm options
    /// genotypes are pseudohaploid (coded 0 and 2 only)
    #[arg(short = 's', long, default_value_t = false, help_heading = "hmm option")]
    pub pseudohaploid: bool,

    /// effective population size
    #[arg(long, default_value_t = 14000, help_heading = "hmm option")]
    pub ne: u32,

    /// mutation probability, also the floor of pseudohaploid emissions
    #[arg(long, default_value_t = 0.01, help_heading = "hmm option")]
    pub mtp: f64,

    /// weight of a heterozygous query copied from two heterozygous parents
    #[arg(long, default_value_t = 0.01, help_heading = "hmm option")]
    pub thw: f64,

    /// number of traceback paths voted on for the ancestry call
    #[arg(long, default_value_t = 9, help_heading = "hmm option")]
    pub npt: usize,

    /// Optional: emission probability of a missing genotype. Estimated as the
    /// fraction of missing genotypes when not given.
    #[arg(long, help_heading = "hmm option")]
    pub missing_probability: Option<f64>,

    /// Optional: TOML file with all model parameters. When given, the
    /// parameter options above are ignored.
    #[arg(long, help_heading = "hmm option")]
    pub params: Option<String>,

    // ---- recombination rate and rate map
    #[command(flatten)]
    pub rec_args: RecombinationArg,

    // ---- robustness
    /// keep going when a sample fails; the failure is logged and the sample is
    /// left out of the output
    #[arg(long, default_value_t = false, help_heading = "runtime option")]
    pub safe: bool,

    // ---- parallelization
    /// number of threads. 0 : use all cpus; non-zero: use the given numbers of threads
    #[arg(long, default_value_t = 0, help_heading = "parallelization option")]
    pub num_threads: usize,

    /// verbosity: -v for debug, -vv for trace
    #[arg(short = 'v', long, action = clap::ArgAction::Count, help_heading = "runtime option")]
    pub verbose: u8,
}

impl Arguments {
    pub fn new_for_test() -> Self {
        Self {
            genotypes: String::from("testdata/genotypes.txt"),
            populations: String::from("testdata/populations.txt"),
            individual: None,
            panel: None,
            max_snps: None,
            output: String::from("lace.out"),
            best_parents: false,
            window: 1,
            pseudohaploid: false,
            ne: 14000,
            mtp: 0.01,
            thw: 0.01,
            npt: 9,
            missing_probability: None,
            params: None,
            rec_args: RecombinationArg {
                rec_rate: 1.0,
                genetic_map: None,
            },
            safe: false,
            num_threads: 1,
            verbose: 0,
        }
    }
}

#[derive(Args, Debug, Clone)]
#[group(required = false, multiple = false)]
pub struct RecombinationArg {
    /// constant recombination rate in cM/Mb. When used --genetic-map should not be specified.
    #[arg(
        short = 'r',
        long,
        default_value_t = 1.0,
        group = "recombination_options",
        help_heading = "hmm option"
    )]
    pub rec_rate: f64,
    /// PLINK genetic map (chrom, id, cM, bp) covering the chromosome of the
    /// genotype file. When used --rec-rate should not be specified.
    #[arg(long, group = "recombination_options", help_heading = "hmm option")]
    pub genetic_map: Option<String>,
}

pub fn get_styles() -> clap::builder::Styles {
    let yellow = anstyle::Color::Ansi(anstyle::AnsiColor::Yellow);
    let green = anstyle::Color::Ansi(anstyle::AnsiColor::Green);
    let red = anstyle::Color::Ansi(anstyle::AnsiColor::Red);
    clap::builder::Styles::styled()
        .usage(anstyle::Style::new().bold().underline().fg_color(Some(yellow)))
        .header(anstyle::Style::new().bold().underline().fg_color(Some(yellow)))
        .literal(anstyle::Style::new().fg_color(Some(green)))
        .invalid(anstyle::Style::new().bold().fg_color(Some(red)))
        .error(anstyle::Style::new().bold().fg_color(Some(red)))
        .valid(anstyle::Style::new().bold().underline().fg_color(Some(green)))
        .placeholder(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
}

#[test]
fn parse_command_line() {
    let args = Arguments::try_parse_from([
        "lace-rs", "-i", "g.txt", "-p", "p.txt", "-b", "-w", "5", "--npt", "3", "-vv",
    ])
    .unwrap();
    assert_eq!(args.genotypes, "g.txt");
    assert!(args.best_parents);
    assert_eq!(args.window, 5);
    assert_eq!(args.npt, 3);
    assert_eq!(args.verbose, 2);
    assert_eq!(args.output, "lace.out");
    assert_eq!(args.rec_args.rec_rate, 1.0);
    assert!(args.rec_args.genetic_map.is_none());

    // rate and map are exclusive
    let res = Arguments::try_parse_from([
        "lace-rs", "-i", "g.txt", "-p", "p.txt", "-r", "2.0", "--genetic-map", "m.map",
    ]);
    assert!(res.is_err());
}
