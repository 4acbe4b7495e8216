use cellphase::config::{AnalysisConfig, ExclusionStrategyKind, SpikeThresholdRule};
use cellphase::simulation::{CalciumCellSpec, generate_recording};
use cellphase::{AnalysisPipeline, Recording};

pub const SAMPLING_HZ: f64 = 10.0;
pub const SAMPLES: usize = 3000;
pub const STIMULATION_FRAME: usize = 1200;
pub const FAST_ONSET_FRAME: usize = 1500;

/// Settings matching [`recording`]: 10 Hz, stimulation at frame 1200
pub fn test_config() -> AnalysisConfig {
    let mut config = AnalysisConfig {
        sampling_hz: SAMPLING_HZ,
        stimulation_frame: [STIMULATION_FRAME, 0],
        strategy: ExclusionStrategyKind::Simple,
        spike_threshold: SpikeThresholdRule::NoiseStd { multiplier: 3.0 },
        ..AnalysisConfig::default()
    };
    config.filter.slow_band_hz = [0.01, 0.05];
    config.filter.fast_band_hz = [0.04, 0.4];
    config
}

/// Default settings (advanced score, inflection threshold) with the slow
/// band moved up to suit a 300 s recording
pub fn default_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.filter.slow_band_hz = [0.01, 0.05];
    config
}

/// Cell that starts a 0.2 Hz fast oscillation at frame 1500
pub fn active_cell() -> CalciumCellSpec {
    CalciumCellSpec::default()
        .with_slow(0.02, 1.0)
        .with_fast(0.2, 1.0)
        .with_fast_window(FAST_ONSET_FRAME, None)
        .with_noise(0.05)
}

/// Cell with the slow oscillation and noise only
pub fn silent_cell() -> CalciumCellSpec {
    CalciumCellSpec::silent().with_slow(0.02, 1.0).with_noise(0.05)
}

/// Cell without any oscillation
pub fn noise_cell() -> CalciumCellSpec {
    CalciumCellSpec::silent().with_slow(0.02, 0.0).with_noise(0.05)
}

pub fn recording(cells: &[CalciumCellSpec], seed: u64) -> Recording {
    generate_recording(cells, SAMPLES, SAMPLING_HZ, seed).expect("Failed to generate recording")
}

/// `[silent, active]` pipeline, not yet run
pub fn silent_and_active_pipeline(seed: u64) -> AnalysisPipeline {
    let recording = recording(&[silent_cell(), active_cell()], seed);
    AnalysisPipeline::new(recording, test_config()).expect("Failed to build pipeline")
}
