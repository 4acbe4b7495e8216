mod test_signals;

use approx::assert_relative_eq;
use cellphase::AnalysisPipeline;
use cellphase::analysis::{
    CombinedStrategy, DistributionScoreStrategy, ExclusionStrategy, NoiseDistributionModel,
    SkewStdStrategy, describe,
};
use cellphase::config::{ExcludeConfig, ExclusionStrategyKind, RootSelection};
use cellphase::signal_processing::Histogram;
use test_signals::{active_cell, recording, silent_cell, test_config};

const SAMPLES: usize = 20_000;
const SLOPE: f64 = 1.0;
const CURVATURE: f64 = 3.95;

/// `ln S(x) = -SLOPE x - CURVATURE ((x - 1)^3 + 1)`: a steep noise body, a
/// flat shoulder at x = 1 and a steep tail
fn log_survival(x: f64) -> f64 {
    -SLOPE * x - CURVATURE * ((x - 1.0).powi(3) + 1.0)
}

/// Deterministic sample whose survival function follows [`log_survival`]
fn cubic_quantile_samples() -> Vec<f64> {
    (0..SAMPLES)
        .map(|i| {
            let target = ((i as f64 + 0.5) / SAMPLES as f64).ln();
            let (mut lo, mut hi) = (0.0, 3.0);
            for _ in 0..80 {
                let mid = 0.5 * (lo + hi);
                if log_survival(mid) > target {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            0.5 * (lo + hi)
        })
        .collect()
}

#[test]
fn test_inflection_of_cubic_log_survival() {
    let samples = cubic_quantile_samples();
    assert!(samples.iter().all(|&x| x >= 0.0));
    let bin_width = Histogram::new(&samples, 50).unwrap().bin_width();

    let model = NoiseDistributionModel::new(5, RootSelection::Smallest)
        .fit(&samples)
        .expect("Distribution fit failed");

    // Counts at left edges are fitted at bin centres: half a bin of shift
    let expected = 1.0 + bin_width / 2.0;
    assert!(
        (model.p_root - expected).abs() < bin_width,
        "Inflection {} should be within one bin ({}) of {}",
        model.p_root,
        bin_width,
        expected
    );
}

#[test]
fn test_score_and_spike_estimate() {
    let samples = cubic_quantile_samples();
    let model = NoiseDistributionModel::new(5, RootSelection::Smallest)
        .fit(&samples)
        .unwrap();

    let q_root = model.q_root.expect("Noise body should have a finite scale");
    assert!(q_root > 0.0 && q_root < model.p_root);

    let phi = model.p_prime.eval(model.p_root).abs().atan() / std::f64::consts::FRAC_PI_2;
    assert_relative_eq!(
        model.score,
        (1.0 - phi) * model.p_root / q_root,
        max_relative = 1e-12
    );
    assert!(model.score > 0.0);

    let above = samples.iter().filter(|&&x| x >= model.p_root).count() as f64;
    assert!(
        (model.spike_count_estimate - above).abs() < 0.15 * above,
        "Estimated {} samples above the inflection, counted {}",
        model.spike_count_estimate,
        above
    );
}

#[test]
fn test_advanced_strategy_thresholds() {
    let samples = cubic_quantile_samples();
    let model = NoiseDistributionModel::new(5, RootSelection::Smallest);
    let cell = describe(&samples, SAMPLES / 2, &model).unwrap();
    let fitted = cell.model().expect("Cell should be scored");
    let fraction = fitted.spike_count_estimate / SAMPLES as f64;

    let keep = ExcludeConfig {
        score_threshold: fitted.score - 0.1,
        spike_fraction: 0.5 * fraction,
    };
    assert!(!DistributionScoreStrategy.excludes(&cell, &keep, SAMPLES));

    let low_score = ExcludeConfig {
        score_threshold: fitted.score + 0.1,
        ..keep.clone()
    };
    assert!(DistributionScoreStrategy.excludes(&cell, &low_score, SAMPLES));

    let few_spikes = ExcludeConfig {
        spike_fraction: 1.5 * fraction,
        ..keep
    };
    assert!(DistributionScoreStrategy.excludes(&cell, &few_spikes, SAMPLES));
}

#[test]
fn test_unscored_cell_excluded_by_advanced_strategy() {
    let negative: Vec<f64> = (0..400).map(|i| -1.0 - (i % 7) as f64).collect();
    let model = NoiseDistributionModel::new(5, RootSelection::Smallest);
    let cell = describe(&negative, 200, &model).unwrap();
    assert!(cell.model().is_none());
    assert_eq!(cell.score(), None);

    let exclude = ExcludeConfig {
        score_threshold: -1.0,
        spike_fraction: 0.0,
    };
    assert!(DistributionScoreStrategy.excludes(&cell, &exclude, 400));
}

#[test]
fn test_combined_strategies_follow_their_parts() {
    let mut pipeline = AnalysisPipeline::new(
        recording(&[silent_cell(), active_cell(), silent_cell()], 17),
        test_config(),
    )
    .unwrap();
    pipeline.filter().unwrap();
    pipeline.compute_distributions().unwrap();

    let exclude = pipeline.config().exclude.clone();
    let samples = pipeline.recording().sample_count();
    let strict = CombinedStrategy {
        require_both: false,
    };
    let lenient = CombinedStrategy { require_both: true };
    assert_eq!(strict.name(), "strict");
    assert_eq!(lenient.name(), "lenient");

    for cell in pipeline.distributions().unwrap() {
        let simple = SkewStdStrategy.excludes(cell, &exclude, samples);
        let advanced = DistributionScoreStrategy.excludes(cell, &exclude, samples);
        assert_eq!(strict.excludes(cell, &exclude, samples), simple || advanced);
        assert_eq!(lenient.excludes(cell, &exclude, samples), simple && advanced);
    }
}

#[test]
fn test_auto_classify_never_reincludes() {
    let mut pipeline = AnalysisPipeline::new(
        recording(&[silent_cell(), active_cell()], 19),
        test_config(),
    )
    .unwrap();
    pipeline.filter().unwrap();
    pipeline.compute_distributions().unwrap();

    pipeline.exclude(1).unwrap();
    let newly_excluded = pipeline.auto_classify().unwrap();
    assert_eq!(newly_excluded, 1, "Only the silent cell is newly excluded");
    assert!(pipeline.good_cells().is_empty());

    assert_eq!(pipeline.auto_classify().unwrap(), 0);
}

#[test]
fn test_strategy_kind_changes_classification() {
    let mut config = test_config();
    config.strategy = ExclusionStrategyKind::Lenient;
    config.exclude.score_threshold = f64::INFINITY;
    let mut pipeline =
        AnalysisPipeline::new(recording(&[silent_cell(), active_cell()], 23), config).unwrap();
    pipeline.filter().unwrap();
    pipeline.compute_distributions().unwrap();

    // Advanced excludes everything at an infinite threshold, so lenient
    // follows the skew heuristic alone
    pipeline.auto_classify().unwrap();
    assert_eq!(pipeline.good_cells(), vec![1]);

    let mut config = pipeline.config().clone();
    config.strategy = ExclusionStrategyKind::Strict;
    pipeline.set_config(config).unwrap();
    pipeline.filter().unwrap();
    pipeline.compute_distributions().unwrap();
    pipeline.auto_classify().unwrap();
    assert!(pipeline.good_cells().is_empty());
}
