use spectra_core::{
    AudioFrame, AutomationKind, Orchestrator, ParamOwner, PlaybackState, Resolution,
};

fn audio(level: f32) -> AudioFrame {
    let frequency_data = (0..1024).map(|i| level * (1.0 - i as f32 / 1024.0)).collect();
    AudioFrame::new(frequency_data, vec![0.0; 2048])
}

fn set_expression(engine: &mut Orchestrator, id: spectra_core::AutomationId, expression: &str) {
    match engine.automations_mut().get_mut(id).map(|a| a.kind_mut()) {
        Some(AutomationKind::Math(math)) => math.set_expression(expression),
        other => panic!("expected a math automation, got {other:?}"),
    }
}

/// Canvas ring and bars plus an ortho particle field, with one math and one
/// audio-impact automation bound.
fn busy_engine() -> Orchestrator {
    let mut engine = Orchestrator::new(Resolution::new(640.0, 360.0));
    let canvas = engine.add_scene("canvas").unwrap();
    let ring = engine.add_item(canvas, "spectrumRing").unwrap();
    let bars = engine.add_item(canvas, "bars").unwrap();
    let ortho = engine.add_scene("ortho").unwrap();
    engine.add_item(ortho, "particles").unwrap();

    let wobble = engine.add_automation("math").unwrap();
    set_expression(&mut engine, wobble, "1.0 + 0.1 * sin(t * 3.0)");
    engine.bind(ParamOwner::Item(canvas, ring), "scale", wobble).unwrap();

    let punch = engine.add_automation("audio").unwrap();
    engine.bind(ParamOwner::Item(canvas, bars), "heightScale", punch).unwrap();
    engine
}

#[test]
fn redraw_is_idempotent() {
    let mut engine = busy_engine();
    engine.play(0.0);
    for frame in 0..12 {
        let level = if frame % 3 == 0 { 220.0 } else { 60.0 };
        engine.update(frame as f64 / 60.0, audio(level), true);
    }
    let last = engine.output().clone();
    assert!(last.op_count() > 0);

    let first_redo = engine.redo_update().clone();
    assert_eq!(first_redo, last);
    for _ in 0..5 {
        assert_eq!(engine.redo_update(), &first_redo);
    }
    assert_eq!(engine.state(), PlaybackState::Running);
}

#[test]
fn non_incrementing_updates_do_not_accumulate() {
    let mut engine = busy_engine();
    engine.play(0.0);
    engine.update(0.5, audio(200.0), true);
    let held = engine.update(0.5, audio(10.0), false).clone();
    let again = engine.update(0.5, audio(250.0), false).clone();
    assert_eq!(held, again);
}

#[test]
fn invalid_math_expression_keeps_previous_value() {
    let mut engine = Orchestrator::new(Resolution::default());
    let id = engine.add_automation("math").unwrap();
    set_expression(&mut engine, id, "t * 2.0");

    engine.play(0.0);
    engine.update(0.25, AudioFrame::empty(), true);
    assert_eq!(engine.automations().value(id), Some(0.5));

    set_expression(&mut engine, id, "t +* (");
    engine.update(0.4, AudioFrame::empty(), true);
    assert_eq!(engine.automations().value(id), Some(0.5));

    set_expression(&mut engine, id, "t");
    engine.update(0.4, AudioFrame::empty(), true);
    assert_eq!(engine.automations().value(id), Some(0.4));
}

#[test]
fn failing_scene_does_not_stop_the_others() {
    let mut engine = Orchestrator::new(Resolution::default());
    let canvas = engine.add_scene("canvas").unwrap();
    engine.add_item(canvas, "bars").unwrap();
    let broken = engine.add_scene("ortho").unwrap();
    let image = engine.add_item(broken, "image").unwrap();
    let after = engine.add_scene("perspective").unwrap();
    engine.add_item(after, "particles").unwrap();

    engine
        .graph_mut()
        .scene_mut(broken)
        .and_then(|scene| scene.item_mut(image))
        .unwrap()
        .params_mut()
        .set("source", "movie.mkv")
        .unwrap();

    engine.play(0.0);
    let output = engine.update(0.0, audio(120.0), true);
    assert_eq!(output.failures.len(), 1);
    assert_eq!(output.failures[0].layer, broken);
    assert_eq!(output.layers.len(), 2);

    let output = engine.update(1.0 / 60.0, audio(120.0), true);
    assert_eq!(output.failures.len(), 1);
    assert_eq!(output.layers.len(), 2);
}

#[test]
fn seek_then_update_resumes_running() {
    let mut engine = busy_engine();
    engine.play(0.0);
    engine.seek_time(3.0);
    assert_eq!(engine.state(), PlaybackState::Seeking);
    assert_eq!(engine.last_time(), 3.0);

    engine.update(3.1, audio(100.0), true);
    assert_eq!(engine.state(), PlaybackState::Running);

    engine.stop();
    assert_eq!(engine.state(), PlaybackState::Stopped);
    assert!(engine.output().layers.is_empty());
}
