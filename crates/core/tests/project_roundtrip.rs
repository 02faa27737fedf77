use spectra_core::automation::ControlPoint;
use spectra_core::scene::Visual;
use spectra_core::{
    AudioFrame, AutomationKind, Orchestrator, ParamOwner, PlaybackState, ProjectCodec, Resolution,
};

fn populated() -> Orchestrator {
    let mut engine = Orchestrator::new(Resolution::new(800.0, 600.0));
    engine.settings_mut().project_name = "Night Drive".to_string();
    engine.settings_mut().postprocessing_enabled = true;
    engine.set_fft_size(4096).unwrap();

    let canvas = engine.add_scene("canvas").unwrap();
    let ring = engine.add_item(canvas, "spectrumRing").unwrap();
    engine.add_item(canvas, "bars").unwrap();
    engine.add_scene("bloom").unwrap();
    let perspective = engine.add_scene("perspective").unwrap();
    let particles = engine.add_item(perspective, "particles").unwrap();

    {
        let scene = engine.graph_mut().scene_mut(canvas).unwrap();
        scene.camera.zoom = 2.5;
        scene.controls_enabled = false;
        let item = scene.item_mut(ring).unwrap();
        item.name = "Main ring".to_string();
        item.set_window(1.5, 90.0).unwrap();
        item.params_mut().set("drawType", "stroke").unwrap();
        item.params_mut().set("alpha", 0.75).unwrap();
        if let Visual::SpectrumRing(visual) = item.visual_mut() {
            visual.colors_mut()[2].enabled = false;
            visual.analyser_mut().config_mut().spectrum_size = 48;
        }
    }

    let curve = engine.add_automation("point").unwrap();
    if let Some(AutomationKind::Point(points)) =
        engine.automations_mut().get_mut(curve).map(|a| a.kind_mut())
    {
        points.add_point(ControlPoint::new(0.0, 0.2));
        points.add_point(ControlPoint::new(4.0, 0.9));
    }
    engine.bind(ParamOwner::Scene(canvas), "opacity", curve).unwrap();

    let math = engine.add_automation("math").unwrap();
    engine.bind(ParamOwner::Item(perspective, particles), "speed", math).unwrap();
    engine.add_automation("audio").unwrap();
    engine
}

#[test]
fn save_and_load_preserve_the_document() {
    let mut engine = populated();
    engine.play(0.0);
    engine.update(0.5, AudioFrame::new(vec![90.0; 2048], vec![0.0; 4096]), true);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("night-drive.json");
    ProjectCodec::save(&engine, &path).unwrap();

    let mut restored = Orchestrator::new(Resolution::new(800.0, 600.0));
    let report = ProjectCodec::load_file(&mut restored, &path).unwrap();
    assert!(report.is_clean(), "{:?}", report.issues);
    assert_eq!(report.automations, 3);
    assert_eq!(report.layers, 3);

    assert_eq!(ProjectCodec::serialize(&restored), ProjectCodec::serialize(&engine));
    assert_eq!(restored.settings(), engine.settings());
}

#[test]
fn load_restores_structure_and_resets_transients() {
    let mut engine = populated();
    engine.play(0.0);
    engine.update(0.5, AudioFrame::new(vec![90.0; 2048], vec![0.0; 4096]), true);
    let json = ProjectCodec::to_json(&ProjectCodec::serialize(&engine)).unwrap();

    let mut restored = Orchestrator::new(Resolution::new(800.0, 600.0));
    let document = ProjectCodec::from_json(&json).unwrap();
    ProjectCodec::load(&mut restored, &document);

    let tags: Vec<_> = restored.graph().layers().iter().map(|l| l.tag()).collect();
    assert_eq!(tags, vec!["canvas", "bloom", "perspective"]);
    assert_eq!(restored.graph().composition().len(), 3);
    assert_eq!(restored.state(), PlaybackState::Stopped);
    assert_eq!(restored.last_audio().frequency_data.len(), 2048);

    let canvas = restored.graph().scenes().next().unwrap();
    assert_eq!(canvas.camera.zoom, 2.5);
    assert!(!canvas.controls_enabled);
    let ring = &canvas.items()[0];
    assert_eq!(ring.name, "Main ring");
    assert_eq!((ring.start_time(), ring.end_time()), (1.5, 90.0));
    assert_eq!(ring.params().text("drawType"), "stroke");
    assert_eq!(ring.params().number("alpha"), 0.75);
    let analyser = ring.visual().analyser().unwrap();
    assert_eq!(analyser.config().spectrum_size, 48);
    assert!(analyser.previous_output().is_empty());

    for automation in engine.automations().iter() {
        let copy = restored.automations().get(automation.id()).unwrap();
        assert_eq!(copy.tag(), automation.tag());
        assert_eq!(copy.name, automation.name);
    }
}

#[test]
fn loading_replaces_existing_state() {
    let mut engine = populated();
    let empty = Orchestrator::new(Resolution::default());
    ProjectCodec::load(&mut engine, &ProjectCodec::serialize(&empty));

    assert!(engine.graph().is_empty());
    assert!(engine.automations().is_empty());
}
