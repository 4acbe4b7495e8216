use anyhow::{Context, Result};
use clap::Parser;
use cellphase::AnalysisConfig;
use cellphase::simulation::{CalciumCellSpec, generate_recording, grid_positions};
use cellphase::table::save_float_table;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "generate_recording")]
#[command(about = "Generate a synthetic calcium-imaging recording with matching settings")]
struct Args {
    /// TOML file with a `[[cell]]` array of cell specs
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "data/synthetic")]
    output_dir: PathBuf,

    /// Number of responding cells (ignored when a config lists cells)
    #[arg(long, default_value_t = 12)]
    active: usize,

    /// Number of silent cells (ignored when a config lists cells)
    #[arg(long, default_value_t = 4)]
    silent: usize,

    /// Recording length in samples
    #[arg(short = 'n', long, default_value_t = 3000)]
    samples: usize,

    /// Sampling rate in Hz
    #[arg(long, default_value_t = 10.0)]
    sampling_hz: f64,

    /// Stimulation frame
    #[arg(long, default_value_t = 1200)]
    stimulation: usize,

    /// Frame at which responding cells start spiking
    #[arg(long, default_value_t = 1500)]
    fast_onset: usize,

    /// Noise standard deviation (CLI override)
    #[arg(long)]
    noise: Option<f64>,

    /// Distance between neighbouring cells in micrometres
    #[arg(long, default_value_t = 10.0)]
    spacing: f64,

    /// Base seed for reproducibility
    #[arg(short, long, default_value_t = 0)]
    seed: u64,
}

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    cell: Vec<CalciumCellSpec>,
}

fn load_toml_config(path: &PathBuf) -> Result<TomlConfig> {
    let content = fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&content).context("Failed to parse config file")
}

fn build_cells(toml: TomlConfig, args: &Args) -> Vec<CalciumCellSpec> {
    let mut cells = if toml.cell.is_empty() {
        let count = args.active + args.silent;
        (0..count)
            .map(|i| {
                let phase = std::f64::consts::TAU * i as f64 / count.max(1) as f64;
                let spec = if i < args.active {
                    CalciumCellSpec::default()
                        .with_slow(0.02, 1.0)
                        .with_fast_window(args.fast_onset, None)
                } else {
                    CalciumCellSpec::silent().with_slow(0.02, 1.0)
                };
                spec.with_phase(phase)
            })
            .collect()
    } else {
        toml.cell
    };

    if let Some(noise) = args.noise {
        for cell in &mut cells {
            cell.noise_std = noise;
        }
    }
    cells
}

fn settings_for(args: &Args) -> AnalysisConfig {
    let mut settings = AnalysisConfig {
        sampling_hz: args.sampling_hz,
        stimulation_frame: [args.stimulation, 0],
        distance_um: args.spacing,
        ..AnalysisConfig::default()
    };
    settings.filter.slow_band_hz = [0.01, 0.05];
    settings
}

fn main() -> Result<()> {
    let args = Args::parse();

    fs::create_dir_all(&args.output_dir).context("Failed to create output directory")?;

    let toml_config = if let Some(ref config_path) = args.config {
        load_toml_config(config_path)?
    } else {
        TomlConfig::default()
    };
    let cells = build_cells(toml_config, &args);

    let recording = generate_recording(&cells, args.samples, args.sampling_hz, args.seed)
        .context("Failed to generate recording")?;

    let time = recording.time();
    let series: Vec<Vec<f64>> = (0..recording.sample_count())
        .map(|i| {
            std::iter::once(time[i])
                .chain(recording.cells().iter().map(|cell| cell[i]))
                .collect()
        })
        .collect();
    let series_path = args.output_dir.join("series.txt");
    save_float_table(&series_path, &series).context("Failed to write series")?;

    let positions: Vec<Vec<f64>> = grid_positions(cells.len(), 1.0)
        .into_iter()
        .map(|p| p.to_vec())
        .collect();
    save_float_table(&args.output_dir.join("positions.txt"), &positions)
        .context("Failed to write positions")?;

    let settings = settings_for(&args);
    settings.validate().context("Generated settings are invalid")?;
    fs::write(
        args.output_dir.join("settings.toml"),
        settings.to_toml_string()?,
    )
    .context("Failed to write settings")?;

    eprintln!(
        "Generated {} cells x {} samples in {}",
        recording.cell_count(),
        recording.sample_count(),
        args.output_dir.display()
    );
    Ok(())
}
