use clap::Parser;
use cwas_power::SimulationBuilder;
use polars::prelude::*;
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Monte Carlo power simulation for connectome-wide association studies", long_about = None)]
struct Cli {
    /// Path to the input CSV connectivity table (one row per subject)
    #[arg(short, long)]
    data: PathBuf,

    /// The name of the subject identifier column
    #[arg(long, default_value = "Subject")]
    subject_col: String,

    /// The name of the categorical site column
    #[arg(long, default_value = "Site")]
    site_col: String,

    /// Number of subjects to sample per trial (split into two groups)
    #[arg(short, long)]
    n_subjects: usize,

    /// Fraction of connections that receive the injected effect
    #[arg(long, default_value_t = 0.1)]
    pi: f64,

    /// Injected effect size in pooled standard deviations
    #[arg(long, default_value_t = 0.5)]
    effect_size: f64,

    /// False-discovery-rate threshold
    #[arg(short, long, default_value_t = 0.05)]
    q: f64,

    /// Number of Monte Carlo trials
    #[arg(long, default_value_t = 100)]
    num_samples: usize,

    /// Seed for the random number generator (omit for a fresh draw)
    #[arg(long)]
    seed: Option<u64>,

    /// Apply the Fisher z-transform (atanh) to the connectivity values
    #[arg(long, default_value_t = false)]
    fisher: bool,

    /// Path to export aggregate results as JSON
    #[arg(long)]
    output_json: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let df = LazyCsvReader::new(&cli.data)
        .with_has_header(true)
        .finish()?
        .collect()?;

    let mut builder = SimulationBuilder::new(df, cli.n_subjects);
    builder
        .subject_column(&cli.subject_col)
        .site_column(&cli.site_col)
        .injection_fraction(cli.pi)
        .effect_size(cli.effect_size)
        .fdr_threshold(cli.q)
        .num_samples(cli.num_samples)
        .fisher_transform(cli.fisher);
    if let Some(seed) = cli.seed {
        builder.seed(seed);
    }

    let results = builder.run()?;
    results.summary();
    println!("{}", results.summary_message());

    if let Some(path) = cli.output_json {
        let json = results
            .to_json()
            .map_err(|e| format!("Failed to serialize to JSON: {}", e))?;
        std::fs::write(path, json)?;
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
