mod test_signals;

use cellphase::pipeline::FailureStage;
use cellphase::{AnalysisError, AnalysisPipeline, AnalysisStage};
use test_signals::{
    active_cell, default_config, noise_cell, recording, silent_and_active_pipeline, silent_cell,
    test_config,
};

#[test]
fn test_silent_cell_excluded_active_cell_kept() {
    let mut pipeline = silent_and_active_pipeline(7);
    pipeline.run().expect("Pipeline run failed");

    assert!(pipeline.is_analyzed());
    assert_eq!(pipeline.stage(), AnalysisStage::Binarized);
    assert_eq!(
        pipeline.good_cells(),
        vec![1],
        "Only the responding cell should survive, flags {:?}",
        pipeline.quality_flags()
    );
}

#[test]
fn test_activity_window_of_active_cell() {
    let mut pipeline = silent_and_active_pipeline(11);
    pipeline.run().expect("Pipeline run failed");

    let windows = pipeline.activity().expect("Activity not computed");
    let window = windows[1].as_ref().expect("Active cell fit failed");
    assert!(
        (135.0..=155.0).contains(&window.onset),
        "Onset {} s should be near the 150 s response",
        window.onset
    );
    assert!(
        window.offset > 290.0,
        "Offset {} s should reach the end of the recording",
        window.offset
    );
    assert!(window.amplitude > 0.1 && window.amplitude < 1.0);
}

#[test]
fn test_stages_are_idempotent() {
    let mut pipeline = silent_and_active_pipeline(3);
    pipeline.run().expect("Pipeline run failed");
    let filtered = pipeline.filtered().cloned();
    let binarized = pipeline.binarized().cloned();
    let flags = pipeline.quality_flags().to_vec();

    pipeline.run().expect("Second run failed");
    assert_eq!(pipeline.filtered().cloned(), filtered);
    assert_eq!(pipeline.binarized().cloned(), binarized);
    assert_eq!(pipeline.quality_flags(), flags.as_slice());
}

#[test]
fn test_filter_output_is_deterministic() {
    let mut a = silent_and_active_pipeline(5);
    let mut b = silent_and_active_pipeline(5);
    a.filter().unwrap();
    b.filter().unwrap();
    assert_eq!(a.filtered(), b.filtered());

    let filtered = a.filtered().unwrap();
    assert_eq!(filtered.slow.len(), 2);
    assert!(filtered.fast.iter().all(|trace| trace.len() == 3000));
}

#[test]
fn test_stage_precondition() {
    let mut pipeline = silent_and_active_pipeline(1);
    assert_eq!(
        pipeline.binarize(),
        Err(AnalysisError::StagePrecondition {
            required: AnalysisStage::DistributionsComputed,
            current: AnalysisStage::Imported,
        })
    );
    assert!(matches!(
        pipeline.estimate_activity(),
        Err(AnalysisError::StagePrecondition { .. })
    ));
    assert!(matches!(
        pipeline.event_raster(),
        Err(AnalysisError::StagePrecondition { .. })
    ));

    pipeline.filter().unwrap();
    assert_eq!(pipeline.stage(), AnalysisStage::Filtered);
    assert!(matches!(
        pipeline.auto_classify(),
        Err(AnalysisError::StagePrecondition { .. })
    ));
}

#[test]
fn test_reset_clears_artifacts_and_flags() {
    let mut pipeline = silent_and_active_pipeline(2);
    pipeline.run().unwrap();
    assert!(pipeline.quality_flags().contains(&false));

    pipeline.reset();
    assert_eq!(pipeline.stage(), AnalysisStage::Imported);
    assert!(pipeline.filtered().is_none());
    assert!(pipeline.distributions().is_none());
    assert!(pipeline.binarized().is_none());
    assert!(pipeline.activity().is_none());
    assert!(pipeline.quality_flags().iter().all(|&good| good));
    assert!(!pipeline.is_analyzed());
}

#[test]
fn test_set_config_rejects_mismatched_sampling_rate() {
    let mut pipeline = silent_and_active_pipeline(4);
    pipeline.filter().unwrap();

    let mut config = test_config();
    config.sampling_hz = 20.0;
    assert!(matches!(
        pipeline.set_config(config),
        Err(AnalysisError::InvalidConfiguration(_))
    ));
    assert_eq!(pipeline.stage(), AnalysisStage::Filtered, "Rejected config must not reset");

    let mut config = test_config();
    config.filter.fast_band_hz = [0.05, 0.3];
    pipeline.set_config(config).unwrap();
    assert_eq!(pipeline.stage(), AnalysisStage::Imported);
}

#[test]
fn test_slow_labels_cover_both_half_cycles() {
    let mut pipeline = silent_and_active_pipeline(6);
    pipeline.run().unwrap();
    let binarized = pipeline.binarized().unwrap();

    for (cell, labels) in binarized.slow.iter().enumerate() {
        assert_eq!(labels.len(), 3000);
        assert!(labels.iter().all(|&l| l <= 12), "Cell {} has a label above 12", cell);
        assert!(labels.iter().any(|&l| (1..=6).contains(&l)), "Cell {} never rises", cell);
        assert!(labels.iter().any(|&l| (7..=12).contains(&l)), "Cell {} never falls", cell);
    }
    for train in &binarized.fast {
        assert!(train.iter().all(|&s| s <= 1));
    }
}

#[test]
fn test_event_raster_lists_good_cells_only() {
    let mut pipeline = silent_and_active_pipeline(8);
    pipeline.run().unwrap();

    let raster = pipeline.event_raster().unwrap();
    assert_eq!(raster.len(), 1);
    let (cell, times) = &raster[0];
    assert_eq!(*cell, 1);

    let spikes = pipeline.binarized().unwrap().fast[1]
        .iter()
        .filter(|&&s| s == 1)
        .count();
    assert_eq!(times.len(), spikes);
    assert!(times.windows(2).all(|w| w[0] < w[1]));
    assert!(times.iter().all(|&t| (0.0..300.0).contains(&t)));
}

#[test]
fn test_cancelled_fits_are_reported_as_failures() {
    let mut pipeline = silent_and_active_pipeline(9);
    pipeline.filter().unwrap();
    pipeline.compute_distributions().unwrap();
    pipeline.binarize().unwrap();

    pipeline.cancel_all();
    pipeline.estimate_activity().unwrap();

    let failures = pipeline.failures();
    let activity_failures: Vec<_> = failures
        .iter()
        .filter(|f| f.stage == FailureStage::Activity)
        .collect();
    assert_eq!(activity_failures.len(), 2, "Both fits should fail: {:?}", failures);
    assert!(
        activity_failures
            .iter()
            .all(|f| matches!(f.error, AnalysisError::FitFailed(_)))
    );
    assert!(pipeline.good_cells().is_empty());
}

#[test]
fn test_cancelling_one_cell_leaves_the_other() {
    let mut pipeline = silent_and_active_pipeline(9);
    pipeline.filter().unwrap();
    pipeline.compute_distributions().unwrap();
    pipeline.binarize().unwrap();

    pipeline.cancel_token(0).unwrap().cancel();
    pipeline.estimate_activity().unwrap();

    let windows = pipeline.activity().unwrap();
    assert!(matches!(windows[0], Err(AnalysisError::FitFailed(_))));
    assert!(windows[1].is_ok(), "Active cell fit should run: {:?}", windows[1]);
    assert_eq!(pipeline.good_cells(), vec![1]);
}

#[test]
fn test_reset_replaces_cancel_tokens() {
    let mut pipeline = silent_and_active_pipeline(10);
    let stale = pipeline.cancel_token(1).unwrap();
    pipeline.reset();
    assert!(stale.is_cancelled());
    assert!(!pipeline.cancel_token(1).unwrap().is_cancelled());
}

#[test]
fn test_manual_override_and_import() {
    let mut pipeline = silent_and_active_pipeline(12);
    pipeline.run().unwrap();

    pipeline.include(0).unwrap();
    pipeline.exclude(1).unwrap();
    assert_eq!(pipeline.good_cells(), vec![0]);
    assert!(matches!(
        pipeline.exclude(2),
        Err(AnalysisError::IndexOutOfRange { index: 2, count: 2 })
    ));

    pipeline.import_good_cells(vec![true, true]).unwrap();
    assert_eq!(pipeline.good_cells(), vec![0, 1]);
    assert!(matches!(
        pipeline.import_good_cells(vec![true]),
        Err(AnalysisError::ShapeMismatch(_))
    ));
}

#[test]
fn test_manual_include_survives_repeated_run() {
    let mut pipeline = silent_and_active_pipeline(7);
    pipeline.run().unwrap();
    assert_eq!(pipeline.quality_flags(), &[false, true]);

    pipeline.include(0).unwrap();
    pipeline.run().unwrap();
    assert_eq!(
        pipeline.quality_flags(),
        &[true, true],
        "A repeated run must keep the manual include"
    );

    pipeline.reset();
    pipeline.run().unwrap();
    assert_eq!(pipeline.quality_flags(), &[false, true]);
}

#[test]
fn test_non_finite_sample_rejected_at_import() {
    let mut signal: Vec<Vec<f64>> = recording(&[silent_cell(), active_cell()], 14)
        .cells()
        .to_vec();
    signal[0][1500] = f64::NAN;
    assert!(matches!(
        cellphase::Recording::new(signal, 10.0),
        Err(AnalysisError::ShapeMismatch(_))
    ));
}

#[test]
fn test_restored_filter_output_reproduces_binarization() {
    let mut original = silent_and_active_pipeline(13);
    original.run().unwrap();
    let filtered = original.filtered().unwrap().clone();

    let mut restored = silent_and_active_pipeline(13);
    restored
        .restore_filtered(filtered.slow.clone(), filtered.fast.clone())
        .unwrap();
    assert_eq!(restored.stage(), AnalysisStage::Filtered);
    restored.run().unwrap();

    assert_eq!(restored.binarized(), original.binarized());
    assert_eq!(restored.good_cells(), original.good_cells());

    let truncated: Vec<Vec<f64>> = filtered.fast.iter().map(|t| t[..100].to_vec()).collect();
    assert!(matches!(
        restored.restore_filtered(filtered.slow, truncated),
        Err(AnalysisError::ShapeMismatch(_))
    ));
}

#[test]
fn test_stimulation_outside_recording_is_rejected() {
    let mut config = test_config();
    config.stimulation_frame = [5000, 0];
    assert!(matches!(
        AnalysisPipeline::new(recording(&[active_cell()], 0), config),
        Err(AnalysisError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_default_settings_classify_by_distribution() {
    let cells = [silent_cell(), active_cell(), noise_cell()];
    let mut pipeline = AnalysisPipeline::new(recording(&cells, 15), default_config()).unwrap();
    pipeline.run().expect("Pipeline run failed");

    assert_eq!(
        pipeline.good_cells(),
        vec![1],
        "Only the responding cell should score, flags {:?}",
        pipeline.quality_flags()
    );

    let distributions = pipeline.distributions().unwrap();
    let binarized = pipeline.binarized().unwrap();
    let filtered = pipeline.filtered().unwrap();
    for (cell, distribution) in distributions.iter().enumerate() {
        let p_root = distribution.model().map(|model| model.p_root);
        assert_eq!(binarized.thresholds[cell], p_root, "Cell {} threshold", cell);
        if let Some(threshold) = p_root {
            let above = filtered.fast[cell].iter().filter(|&&x| x > threshold).count();
            let spikes = binarized.fast[cell].iter().filter(|&&s| s == 1).count();
            assert_eq!(spikes, above, "Cell {} train does not follow its threshold", cell);
        }
    }

    let active = distributions[1].model().expect("Active cell should be scored");
    assert!(active.score > pipeline.config().exclude.score_threshold);
}

#[test]
fn test_default_settings_without_stimulation() {
    let mut config = default_config();
    config.stimulation_frame = [0, 0];
    let mut pipeline =
        AnalysisPipeline::new(recording(&[silent_cell(), active_cell()], 16), config).unwrap();
    pipeline.run().expect("Pipeline run failed");

    assert!(pipeline.is_analyzed());
    assert!(pipeline.distributions().unwrap().iter().all(|d| d.windows.is_none()));
    assert_eq!(pipeline.good_cells(), vec![1]);
}

#[test]
fn test_many_cells_keep_cell_order() {
    let cells: Vec<_> = (0..6)
        .map(|i| if i % 2 == 0 { silent_cell() } else { active_cell() })
        .collect();
    let mut pipeline = AnalysisPipeline::new(recording(&cells, 21), test_config()).unwrap();
    pipeline.run().unwrap();

    assert_eq!(pipeline.good_cells(), vec![1, 3, 5]);
    let distributions = pipeline.distributions().unwrap();
    for (cell, distribution) in distributions.iter().enumerate() {
        let responding = cell % 2 == 1;
        assert_eq!(
            distribution.spikes().unwrap().std > 2.0 * distribution.noise().unwrap().std,
            responding,
            "Cell {} spread does not match its kind",
            cell
        );
    }
}
