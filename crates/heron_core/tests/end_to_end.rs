//! End-to-end scenarios across control and render contexts

use heron_core::{
    ChebyshevParams, EngineConfig, EngineError, EqEngine, Event, FilterKind, InterpolationMode,
    PeakParams, Stage, Submission, EVENT_QUEUE_CAPACITY,
};

fn gain(value: f64) -> Stage {
    Stage::new(value, 0.0, 0.0, 0.0, 0.0)
}

#[test]
fn test_flat_shelf_with_one_peak_impulse() {
    let mut engine = EqEngine::with_config(EngineConfig {
        max_stages: 10,
        channels: 1,
        sample_rate: 44100.0,
        ..Default::default()
    })
    .unwrap();
    engine.set_interpolation_mode(InterpolationMode::Steady);

    engine
        .request_shelf_update([0.0, 0.0, 0.0], [1000.0, 1000.0])
        .unwrap();
    engine
        .request_peak_update(vec![PeakParams::new(1000.0, 1.0, 0.0, 6.0, 3.0)])
        .unwrap();

    let coeffs = engine.current_coefficients();
    assert_eq!(coeffs.len(), 2);
    assert!(coeffs.stages().iter().all(Stage::is_stable));

    let mut block = vec![0.0; 64];
    block[0] = 1.0;
    engine.render(&mut [&mut block[..]]).unwrap();
    assert!((block[0] - coeffs.impulse_head()).abs() < 1e-15);

    // The tail dies out
    let mut tail = vec![0.0; 64];
    for _ in 0..200 {
        tail.fill(0.0);
        engine.render(&mut [&mut tail[..]]).unwrap();
    }
    assert!(tail.iter().all(|y| y.abs() < 1e-9));
}

#[test]
fn test_second_block_reports_no_change() {
    let mut engine = EqEngine::new().unwrap();
    engine
        .request_peak_update(vec![PeakParams::new(2000.0, 0.5, 0.0, -6.0, -3.0)])
        .unwrap();

    let mut block = vec![0.1; 32];
    engine.render(&mut [&mut block[..]]).unwrap();
    engine.render(&mut [&mut block[..]]).unwrap();
    engine.render(&mut [&mut block[..]]).unwrap();

    assert_eq!(engine.stats().blocks_rendered(), 3);
    assert_eq!(engine.stats().epochs_adopted(), 1);
}

#[test]
fn test_back_to_back_publishes_only_show_the_latest() {
    let engine = EqEngine::new().unwrap();
    let (controller, mut renderer) = engine.split();

    assert_eq!(
        controller.request_biquads_update(vec![gain(2.0)]).unwrap(),
        Submission::Published
    );
    controller.request_biquads_update(vec![gain(3.0)]).unwrap();
    assert_eq!(controller.publications(), 2);

    // Interpolated ramp from identity straight to 3.0; 2.0 never shows up
    let mut block = vec![1.0; 64];
    renderer.render(&mut [&mut block[..]]).unwrap();
    let groups = 64.0 / 4.0;
    assert_eq!(block[0], 1.0 + 2.0 / groups);
    assert_eq!(block[63], 3.0);
    for pair in block.windows(2) {
        assert!(pair[1] >= pair[0]);
    }

    let mut next = vec![1.0; 64];
    renderer.render(&mut [&mut next[..]]).unwrap();
    assert!(next.iter().all(|&y| y == 3.0));
    assert_eq!(controller.stats().epochs_adopted(), 1);
}

#[test]
fn test_reset_is_idempotent() {
    let mut engine = EqEngine::new().unwrap();
    engine.set_max_stages(16).unwrap();
    engine
        .request_shelf_update([4.0, 0.0, -2.0], [150.0, 6000.0])
        .unwrap();
    engine
        .request_peak_update(vec![PeakParams::new(800.0, 1.0, 0.0, 5.0, 2.0)])
        .unwrap();
    let mut block: Vec<f64> = (0..128).map(|i| (i as f64 * 0.3).sin()).collect();
    engine.render(&mut [&mut block[..]]).unwrap();

    let snapshot = |engine: &EqEngine| {
        (
            engine.max_stages(),
            engine.design_state(),
            engine.current_coefficients(),
            engine.render_state().is_clear(),
            engine.interpolation_mode(),
        )
    };

    engine.reset().unwrap();
    let once = snapshot(&engine);
    engine.reset().unwrap();
    let twice = snapshot(&engine);

    assert_eq!(once, twice);
    assert_eq!(once.0, 10);
    assert!(once.3);
    assert_eq!(once.2.stages(), &[Stage::IDENTITY]);

    // The first block after a reset is a clean passthrough
    let input: Vec<f64> = (0..64).map(|i| (i as f64 * 0.3).sin()).collect();
    let mut block = input.clone();
    engine.render(&mut [&mut block[..]]).unwrap();
    assert_eq!(block, input);
}

#[test]
fn test_chebyshev_order_boundaries() {
    let engine = EqEngine::new().unwrap();

    let err = engine
        .request_chebyshev_update(1000.0, Some(3), Some(0.5), FilterKind::Lowpass)
        .unwrap_err();
    assert!(matches!(err, EngineError::DspError(_)));
    assert!(matches!(
        engine.poll_event(),
        Some(Event::RequestRejected { .. })
    ));

    engine
        .request_chebyshev_update(0.49 * 44100.0, Some(8), Some(0.5), FilterKind::Lowpass)
        .unwrap();
    assert_eq!(engine.current_coefficients().len(), 4);
    assert_eq!(
        engine.design_state().source,
        heron_core::DesignSource::Chebyshev(ChebyshevParams::new(
            0.49 * 44100.0,
            8,
            0.5,
            FilterKind::Lowpass
        ))
    );
}

#[test]
fn test_published_report_matches_coefficients() {
    let engine = EqEngine::new().unwrap();
    engine
        .request_peak_update(vec![
            PeakParams::new(250.0, 1.0, 0.0, 3.0, 1.5),
            PeakParams::new(4000.0, 2.0, 0.0, -4.0, -2.0),
        ])
        .unwrap();

    let rows = engine.current_coefficients().to_rows();
    let event = engine.poll_event().unwrap();
    assert_eq!(
        event,
        Event::CoefficientsPublished {
            stages: rows.clone()
        }
    );

    let json = serde_json::to_string(&event).unwrap();
    let decoded: Event = serde_json::from_str(&json).unwrap();
    match decoded {
        Event::CoefficientsPublished { stages } => {
            assert_eq!(stages.len(), 3);
            for (got, want) in stages.iter().flatten().zip(rows.iter().flatten()) {
                assert!((got - want).abs() <= want.abs() * 1e-15);
            }
        }
        other => panic!("Wrong variant: {:?}", other),
    }
}

#[test]
fn test_event_backlog_is_bounded_without_a_consumer() {
    let engine = EqEngine::new().unwrap();
    for k in 0..10_000 {
        engine
            .request_biquads_update(vec![gain(1.0 + k as f64 / 16384.0)])
            .unwrap();
    }
    assert_eq!(engine.controller().publications(), 10_000);

    let events = engine.drain_events();
    assert_eq!(events.len(), EVENT_QUEUE_CAPACITY);
    assert_eq!(
        events.last(),
        Some(&Event::CoefficientsPublished {
            stages: engine.current_coefficients().to_rows()
        })
    );
}

#[test]
fn test_stereo_channels_filtered_identically() {
    let mut engine = EqEngine::with_config(EngineConfig::stereo()).unwrap();
    engine
        .request_shelf_update([-3.0, 0.0, 3.0], [300.0, 3000.0])
        .unwrap();

    let input: Vec<f64> = (0..256).map(|i| (i as f64 * 0.05).sin()).collect();
    let mut left = input.clone();
    let mut right = input.clone();
    engine
        .render(&mut [&mut left[..], &mut right[..]])
        .unwrap();
    assert_eq!(left, right);
    assert_ne!(left, input);
}

#[test]
fn test_concurrent_publish_and_render_never_tear() {
    const EPOCHS: usize = 2_000;

    let engine = EqEngine::with_config(EngineConfig {
        max_stages: 4,
        interpolation: InterpolationMode::Steady,
        ..Default::default()
    })
    .unwrap();
    let (controller, mut renderer) = engine.split();

    // Pure gain stages: epoch k renders a constant g_k^len_k
    let epoch = |k: usize| {
        let g = 1.0 + k as f64 / 1024.0;
        vec![gain(g); 1 + k % 3]
    };
    let expected: Vec<f64> = (1..=EPOCHS)
        .map(|k| epoch(k).iter().fold(1.0, |acc, s| acc * s.a0))
        .collect();
    let last = *expected.last().unwrap();

    std::thread::scope(|scope| {
        let controller = &controller;
        scope.spawn(move || {
            for k in 1..=EPOCHS {
                controller.request_biquads_update(epoch(k)).unwrap();
            }
        });

        let mut last_index = 0;
        loop {
            let mut block = vec![1.0; 32];
            renderer.render(&mut [&mut block[..]]).unwrap();
            let value = block[0];
            assert!(block.iter().all(|&y| y == value), "block mixed two epochs");
            if value == 1.0 {
                std::thread::yield_now();
                continue;
            }

            // Different epochs can render the same value, so search forward only
            let offset = expected[last_index..]
                .iter()
                .position(|&e| e == value)
                .expect("output from no published epoch, or epochs went backwards");
            last_index += offset;
            if value == last {
                break;
            }
        }
    });
}
