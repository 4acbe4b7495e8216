use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use cellphase::config::{AnalysisConfig, ExclusionStrategyKind};
use cellphase::output::{OutputFormat, Summary, build_reports, create_formatter};
use cellphase::table::{load_float_table, load_int_table, save_float_table, save_int_table};
use cellphase::{AnalysisPipeline, Recording};

#[derive(Parser, Debug)]
#[command(name = "cellphase")]
#[command(about = "Classify slow-wave phase and fast spikes of calcium-imaging cells", long_about = None)]
struct Args {
    /// Series table: one row per sample, time in column 0, one column per cell
    series: PathBuf,

    /// Settings file (TOML, or JSON by extension); defaults to the sample settings
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Cell positions table with two columns
    #[arg(short = 'p', long)]
    positions: Option<PathBuf>,

    /// Directory for filtered and binarized tables
    #[arg(short = 'o', long)]
    output_dir: Option<PathBuf>,

    /// Output format: text, csv, json
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Exclusion strategy override: simple, advanced, strict, lenient
    #[arg(short = 's', long, value_enum)]
    strategy: Option<ExclusionStrategyKind>,

    /// Slow band lower cutoff in Hz
    #[arg(long)]
    slow_low: Option<f64>,

    /// Slow band upper cutoff in Hz
    #[arg(long)]
    slow_high: Option<f64>,

    /// Fast band lower cutoff in Hz
    #[arg(long)]
    fast_low: Option<f64>,

    /// Fast band upper cutoff in Hz
    #[arg(long)]
    fast_high: Option<f64>,

    /// Directory holding filtered_slow.txt and filtered_fast.txt to reuse
    #[arg(long)]
    restore_filtered: Option<PathBuf>,

    /// Good-cells table (one 0/1 flag per cell) overriding the classification
    #[arg(long)]
    good_cells: Option<PathBuf>,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = load_config(&args)?;

    let rows = load_float_table(&args.series)
        .with_context(|| format!("Failed to read series {}", args.series.display()))?;
    let mut recording = Recording::from_time_series(&rows, config.sampling_hz)
        .context("Invalid series table")?;
    if let Some(path) = &args.positions {
        let table = load_float_table(path)
            .with_context(|| format!("Failed to read positions {}", path.display()))?;
        let positions = table
            .iter()
            .map(|row| match row.as_slice() {
                [x, y, ..] => Ok([*x, *y]),
                _ => bail!("positions table needs two columns"),
            })
            .collect::<Result<Vec<_>>>()?;
        recording = recording.with_positions(positions)?;
    }
    log::info!(
        "Loaded {} cells x {} samples at {} Hz",
        recording.cell_count(),
        recording.sample_count(),
        recording.sampling_hz()
    );

    let mut pipeline = AnalysisPipeline::new(recording, config)?;

    if let Some(dir) = &args.restore_filtered {
        let slow = load_float_table(&dir.join("filtered_slow.txt"))
            .context("Failed to read filtered_slow.txt")?;
        let fast = load_float_table(&dir.join("filtered_fast.txt"))
            .context("Failed to read filtered_fast.txt")?;
        pipeline.restore_filtered(slow, fast)?;
        log::info!("Restored filtered traces from {}", dir.display());
    }

    pipeline.run()?;

    if let Some(path) = &args.good_cells {
        let flags: Vec<bool> = load_int_table(path)
            .with_context(|| format!("Failed to read good cells {}", path.display()))?
            .into_iter()
            .flatten()
            .map(|flag| flag != 0)
            .collect();
        pipeline.import_good_cells(flags)?;
    }

    if let Some(dir) = &args.output_dir {
        save_outputs(&pipeline, dir)?;
    }

    let formatter = create_formatter(args.format, args.verbose > 0);
    let reports = build_reports(&pipeline);
    if let Some(header) = formatter.header() {
        println!("{}", header);
    }
    for report in &reports {
        println!("{}", formatter.format(report));
    }
    if let Some(summary) = formatter.summary(&Summary::from_reports(&reports)) {
        println!("{}", summary);
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("Failed to load settings {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    let [slow_low, slow_high] = &mut config.filter.slow_band_hz;
    *slow_low = args.slow_low.unwrap_or(*slow_low);
    *slow_high = args.slow_high.unwrap_or(*slow_high);
    let [fast_low, fast_high] = &mut config.filter.fast_band_hz;
    *fast_low = args.fast_low.unwrap_or(*fast_low);
    *fast_high = args.fast_high.unwrap_or(*fast_high);

    config.validate().context("Invalid settings")?;
    Ok(config)
}

fn save_outputs(pipeline: &AnalysisPipeline, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    save_float_table(
        &dir.join("mean_trace.txt"),
        &pipeline.recording().mean_trace_rows(),
    )?;
    if let Some(filtered) = pipeline.filtered() {
        save_float_table(&dir.join("filtered_slow.txt"), &filtered.slow)?;
        save_float_table(&dir.join("filtered_fast.txt"), &filtered.fast)?;
    }
    if let Some(binarized) = pipeline.binarized() {
        save_int_table(&dir.join("binarized_slow.txt"), &binarized.slow)?;
        save_int_table(&dir.join("binarized_fast.txt"), &binarized.fast)?;
    }
    let flags: Vec<Vec<u8>> = pipeline
        .quality_flags()
        .iter()
        .map(|&good| vec![u8::from(good)])
        .collect();
    save_int_table(&dir.join("good_cells.txt"), &flags)?;

    log::info!("Wrote tables to {}", dir.display());
    Ok(())
}
