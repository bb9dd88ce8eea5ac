use patchbay::plugin::{PluginModule, PluginRegistry, TrustPolicy};
use patchbay::{
    AudioFrame, AudioNode, EngineError, FactoryError, GraphEngine, NodeBuildError, NodeCategory, NodeContext,
    NodeFactory, NodeInfo, NodeParams, NodeSpec, Position, ProcessingError, RoutingSpec,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

/// Unit impulse at the first sample of block 0, silence afterwards.
struct ImpulseNode {
    node_info: NodeInfo,
}

impl AudioNode for ImpulseNode {
    fn node_info(&self) -> &NodeInfo {
        &self.node_info
    }

    fn process(&mut self, frame_length: usize, timestamp: f64, _inputs: &[&AudioFrame]) -> Result<AudioFrame, ProcessingError> {
        let first = timestamp == 0.0;
        Ok(AudioFrame::from_fn(
            frame_length,
            self.node_info.channels,
            self.node_info.sample_rate,
            timestamp,
            |frame, _| if first && frame == 0 { 1.0 } else { 0.0 },
        ))
    }
}

fn impulse(ctx: &NodeContext, _params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
    Ok(Box::new(ImpulseNode {
        node_info: NodeInfo::new(ctx, NodeCategory::Generator),
    }))
}

/// Seeded white noise.
struct NoiseNode {
    node_info: NodeInfo,
    rng: StdRng,
}

impl AudioNode for NoiseNode {
    fn node_info(&self) -> &NodeInfo {
        &self.node_info
    }

    fn process(&mut self, frame_length: usize, timestamp: f64, _inputs: &[&AudioFrame]) -> Result<AudioFrame, ProcessingError> {
        let rng = &mut self.rng;
        Ok(AudioFrame::from_fn(
            frame_length,
            self.node_info.channels,
            self.node_info.sample_rate,
            timestamp,
            |_, _| rng.gen_range(-0.25..0.25),
        ))
    }
}

fn noise(ctx: &NodeContext, _params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
    Ok(Box::new(NoiseNode {
        node_info: NodeInfo::new(ctx, NodeCategory::Generator),
        rng: StdRng::seed_from_u64(7),
    }))
}

/// Breaks the node contract by returning one frame too few.
struct ShortNode {
    node_info: NodeInfo,
}

impl AudioNode for ShortNode {
    fn node_info(&self) -> &NodeInfo {
        &self.node_info
    }

    fn process(&mut self, frame_length: usize, timestamp: f64, _inputs: &[&AudioFrame]) -> Result<AudioFrame, ProcessingError> {
        Ok(self.node_info.silence(frame_length.saturating_sub(1), timestamp))
    }
}

fn short(ctx: &NodeContext, _params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
    Ok(Box::new(ShortNode {
        node_info: NodeInfo::new(ctx, NodeCategory::Processor),
    }))
}

fn test_registry() -> PluginRegistry {
    let registry = PluginRegistry::new();
    registry
        .register(
            PluginModule::new("patchbay_plugins.testing")
                .with_kind("impulse", impulse)
                .with_kind("noise", noise)
                .with_kind("short", short),
        )
        .unwrap();
    registry
}

fn build(spec: &RoutingSpec) -> Result<GraphEngine, EngineError> {
    let registry = test_registry();
    let factory = NodeFactory::with_registry(TrustPolicy::default(), &registry);
    GraphEngine::with_factory(spec, &factory)
}

fn plugin_node(id: &str, class: &str) -> NodeSpec {
    NodeSpec::new(id, "plugin").with_params(
        NodeParams::new().with("plugin", json!({ "module": "patchbay_plugins.testing", "class": class })),
    )
}

#[test]
fn test_sine_into_gain_end_to_end() {
    let spec = RoutingSpec::from_yaml_str(
        "\
sample_rate: 48000
frame_size: 1024
nodes:
  - id: source
    kind: sine
    params: { frequency_hz: 440, amplitude: 0.2, channels: 2 }
  - id: gain
    kind: gain
    params: { gain_db: -3.0 }
connections:
  - { from: source, to: gain }
",
    )
    .unwrap();
    let mut engine = build(&spec).unwrap();
    assert_eq!(engine.execution_order(), &["source".to_string(), "gain".to_string()]);

    let outputs = engine.process_block(0).unwrap();
    let source_peak = outputs["source"].peak();
    let gain_peak = outputs["gain"].peak();
    assert_eq!(outputs["source"].shape(), (1024, 2));
    assert_eq!(outputs["gain"].shape(), (1024, 2));
    assert!((source_peak - 0.2).abs() < 0.002);
    assert!(gain_peak < source_peak);
    assert!((gain_peak - 0.2 * 10f32.powf(-3.0 / 20.0)).abs() < 0.002);
}

#[test]
fn test_zero_db_gain_is_exact() {
    let spec = RoutingSpec::new(48000, 512)
        .with_node(NodeSpec::new("osc", "sine").with_params(NodeParams::new().with("frequency_hz", 1234.5)))
        .with_node(NodeSpec::new("amp", "gain").with_params(NodeParams::new().with("gain_db", 0.0)))
        .connect("osc", "amp");
    let mut engine = build(&spec).unwrap();
    for block in 0..3 {
        let outputs = engine.process_block(block).unwrap();
        assert_eq!(outputs["amp"].samples(), outputs["osc"].samples());
    }
}

#[test]
fn test_random_dags_are_ordered_topologically() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..20 {
        let count = rng.gen_range(2..16);
        let mut ranks: Vec<usize> = (0..count).collect();
        // shuffle declaration order so it differs from the dependency order
        for i in (1..count).rev() {
            ranks.swap(i, rng.gen_range(0..=i));
        }

        let mut spec = RoutingSpec::new(8000, 16).with_default_channels(1);
        for rank in &ranks {
            spec = spec.with_node(NodeSpec::new(format!("n{}", rank), "passthrough"));
        }
        for from in 0..count {
            for to in from + 1..count {
                if rng.gen_bool(0.3) {
                    spec = spec.connect(format!("n{}", from), format!("n{}", to));
                }
            }
        }

        let engine = build(&spec).unwrap();
        let order = engine.execution_order();
        assert_eq!(order.len(), count);
        let index = |id: &str| order.iter().position(|n| n == id).unwrap();
        for connection in engine.connections() {
            assert!(index(connection.from.as_str()) < index(connection.to.as_str()));
        }
    }
}

#[test]
fn test_cycle_fails_construction() {
    let spec = RoutingSpec::new(48000, 64)
        .with_node(NodeSpec::new("a", "passthrough"))
        .with_node(NodeSpec::new("b", "gain"))
        .with_node(NodeSpec::new("c", "delay"))
        .connect("a", "b")
        .connect("b", "c")
        .connect("c", "b");
    match build(&spec) {
        Err(EngineError::CycleDetected { remaining }) => {
            assert_eq!(remaining, vec!["b".to_string(), "c".to_string()]);
        }
        other => panic!("expected a cycle error, got {:?}", other),
    }
}

#[test]
fn test_duplicate_node_id() {
    let spec = RoutingSpec::new(48000, 64)
        .with_node(NodeSpec::new("x", "sine"))
        .with_node(NodeSpec::new("x", "gain"));
    assert!(matches!(
        build(&spec),
        Err(EngineError::DuplicateNodeId { node_id }) if node_id == "x"
    ));
}

#[test]
fn test_connection_to_missing_node() {
    let spec = RoutingSpec::new(48000, 64)
        .with_node(NodeSpec::new("osc", "sine"))
        .connect("osc", "ghost");
    assert!(matches!(
        build(&spec),
        Err(EngineError::UnknownConnectionEndpoint { missing, .. }) if missing == "ghost"
    ));
}

#[test]
fn test_unknown_kind_names_builtins() {
    let spec = RoutingSpec::new(48000, 64).with_node(NodeSpec::new("verb", "reverb"));
    let err = build(&spec).unwrap_err();
    match &err {
        EngineError::NodeCreation {
            node_id,
            kind,
            source: FactoryError::UnknownKind { available, .. },
        } => {
            assert_eq!(node_id, "verb");
            assert_eq!(kind, "reverb");
            assert!(available.contains(&"eq".to_string()));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("verb"));
}

#[test]
fn test_malformed_parameter_fails_construction() {
    let spec = RoutingSpec::new(48000, 64)
        .with_node(NodeSpec::new("amp", "gain").with_params(NodeParams::new().with("gain_db", "loud")));
    assert!(matches!(
        build(&spec),
        Err(EngineError::NodeCreation {
            source: FactoryError::Build(NodeBuildError::Parameter(_)),
            ..
        })
    ));
}

#[test]
fn test_fan_in_sums_and_fan_out_broadcasts() {
    let spec = RoutingSpec::new(48000, 128)
        .with_node(NodeSpec::new("low", "sine").with_params(NodeParams::new().with("amplitude", 0.1)))
        .with_node(NodeSpec::new("high", "sine").with_params(NodeParams::new().with("frequency_hz", 880).with("amplitude", 0.3)))
        .with_node(NodeSpec::new("bus", "passthrough"))
        .with_node(NodeSpec::new("left", "gain"))
        .with_node(NodeSpec::new("right", "gain"))
        .connect("low", "bus")
        .connect("high", "bus")
        .connect("bus", "left")
        .connect("bus", "right");
    let mut engine = build(&spec).unwrap();
    let outputs = engine.process_block(1).unwrap();

    for (frame, channel) in [(0, 0), (17, 1), (127, 0)] {
        let expected = outputs["low"].sample(frame, channel) + outputs["high"].sample(frame, channel);
        assert!((outputs["bus"].sample(frame, channel) - expected).abs() < 1e-6);
    }
    assert_eq!(outputs["left"].samples(), outputs["bus"].samples());
    assert_eq!(outputs["right"].samples(), outputs["bus"].samples());
}

#[test]
fn test_every_output_has_configured_shape() {
    let spec = RoutingSpec::new(44100, 300)
        .with_node(NodeSpec::new("osc", "sine").with_params(NodeParams::new().with("channels", 1)))
        .with_node(NodeSpec::new("eq", "eq").with_params(NodeParams::new().with("channels", 3)))
        .with_node(NodeSpec::new("echo", "delay"))
        .with_node(NodeSpec::new("idle", "passthrough").with_params(NodeParams::new().with("channels", "6")))
        .connect("osc", "eq")
        .connect("eq", "echo");
    let mut engine = build(&spec).unwrap();
    for block in 0..4 {
        let outputs = engine.process_block(block).unwrap();
        assert_eq!(outputs["osc"].shape(), (300, 1));
        assert_eq!(outputs["eq"].shape(), (300, 3));
        assert_eq!(outputs["echo"].shape(), (300, 2));
        assert_eq!(outputs["idle"].shape(), (300, 6));
        assert!(outputs["idle"].is_silent());
    }
}

#[test]
fn test_shape_violation_fails_block() {
    let spec = RoutingSpec::new(48000, 64).with_node(plugin_node("bad", "short"));
    let mut engine = build(&spec).unwrap();
    match engine.process_block(0) {
        Err(EngineError::Processing {
            node_id,
            source: ProcessingError::ShapeMismatch { expected, found },
            ..
        }) => {
            assert_eq!(node_id, "bad");
            assert_eq!(expected, (64, 2));
            assert_eq!(found, (63, 2));
        }
        other => panic!("expected shape mismatch, got {:?}", other.map(|o| o.len())),
    }
}

#[test]
fn test_delay_impulse_response() {
    let spec = RoutingSpec::new(48000, 1024)
        .with_node(plugin_node("click", "impulse"))
        .with_node(NodeSpec::new("echo", "delay").with_params(
            NodeParams::new().with("delay_ms", 10.0).with("feedback", 0.0).with("mix", 1.0),
        ))
        .connect("click", "echo");
    let mut engine = build(&spec).unwrap();
    let outputs = engine.process_block(0).unwrap();
    let echo = &outputs["echo"];
    assert!(echo.sample(0, 0).abs() < 1e-6);
    assert!(echo.sample(480, 0) > 0.5);
    assert!(echo.sample(480, 1) > 0.5);
}

#[test]
fn test_high_band_boost_raises_rms() {
    let eq = |gain: f64| NodeParams::new().with("high_gain_db", gain).with("high_cut_hz", 2000.0);
    let spec = RoutingSpec::new(48000, 1024)
        .with_node(plugin_node("noise", "noise"))
        .with_node(NodeSpec::new("flat", "eq").with_params(eq(0.0)))
        .with_node(NodeSpec::new("bright", "eq").with_params(eq(9.0)))
        .connect("noise", "flat")
        .connect("noise", "bright");
    let mut engine = build(&spec).unwrap();
    for block in 0..3 {
        let outputs = engine.process_block(block).unwrap();
        assert!(outputs["bright"].rms() > outputs["flat"].rms());
    }
}

#[test]
fn test_run_keeps_only_tracked_nodes() {
    let spec = RoutingSpec::new(48000, 64)
        .with_node(NodeSpec::new("osc", "sine"))
        .with_node(NodeSpec::new("amp", "gain"))
        .connect("osc", "amp");
    let mut engine = build(&spec).unwrap();

    let blocks = engine.run(5, Some(&["amp"][..])).unwrap();
    assert_eq!(blocks.len(), 5);
    assert!(blocks.iter().all(|b| b.len() == 1 && b.contains_key("amp")));
    assert!((blocks[4]["amp"].timestamp() - 4.0 * 64.0 / 48000.0).abs() < 1e-12);

    let all = engine.run(2, None).unwrap();
    assert_eq!(all[0].len(), 2);
}

#[test]
fn test_run_last_keeps_final_block() {
    let spec = RoutingSpec::new(48000, 64)
        .with_node(NodeSpec::new("osc", "sine"))
        .with_node(NodeSpec::new("amp", "gain"))
        .connect("osc", "amp");
    let mut engine = build(&spec).unwrap();

    let last = engine.run_last(7, Some(&["amp"][..])).unwrap().unwrap();
    assert_eq!(last.len(), 1);
    assert!((last["amp"].timestamp() - 6.0 * 64.0 / 48000.0).abs() < 1e-12);

    assert!(engine.run_last(0, None).unwrap().is_none());
    assert!(matches!(
        engine.run_last(3, Some(&["ghost"][..])),
        Err(EngineError::NodeNotFound { .. })
    ));
}

#[test]
fn test_huge_block_count_does_not_preallocate() {
    let spec = RoutingSpec::new(48000, 64).with_node(plugin_node("bad", "short"));
    let mut engine = build(&spec).unwrap();
    let none: &[&str] = &[];

    // block 0 fails, so the run returns before processing more
    assert!(matches!(
        engine.run(u64::MAX, Some(none)),
        Err(EngineError::Processing { block_index: 0, .. })
    ));
    assert!(matches!(
        engine.run_last(u64::MAX, Some(none)),
        Err(EngineError::Processing { block_index: 0, .. })
    ));
}

#[test]
fn test_layout_positions() {
    let spec = RoutingSpec::new(48000, 64)
        .with_node(NodeSpec::new("osc", "sine").with_position(Position::new(1.0, 2.0)))
        .with_node(NodeSpec::new("out", "passthrough"));
    let mut engine = build(&spec).unwrap();

    assert_eq!(engine.layout_version(), 0);
    assert_eq!(engine.node_position("osc"), Position::new(1.0, 2.0));
    assert_eq!(engine.node_position("out"), Position::default());

    assert_eq!(engine.set_node_position("out", Position::new(3.0, 4.0)).unwrap(), 1);
    assert_eq!(engine.set_node_position("out", Position::new(5.0, 6.0)).unwrap(), 2);
    assert_eq!(engine.node_position("out"), Position::new(5.0, 6.0));

    assert!(matches!(
        engine.set_node_position("ghost", Position::default()),
        Err(EngineError::NodeNotFound { .. })
    ));
    assert_eq!(engine.layout_version(), 2);
}

#[test]
fn test_file_playback_through_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ramp.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..100 {
        writer.write_sample((i + 1) as f32 / 100.0).unwrap();
    }
    writer.finalize().unwrap();

    let spec = RoutingSpec::new(48000, 64).with_node(
        NodeSpec::new("player", "audio_file").with_params(NodeParams::new().with("file_path", path.to_string_lossy().into_owned())),
    );
    let mut engine = build(&spec).unwrap();

    let first = engine.process_block(0).unwrap();
    assert!((first["player"].sample(0, 1) - 0.01).abs() < 1e-6);

    let second = engine.process_block(1).unwrap();
    assert!((second["player"].sample(35, 0) - 1.0).abs() < 1e-6);
    assert_eq!(second["player"].sample(36, 0), 0.0);

    for block in 2..5 {
        assert!(engine.process_block(block).unwrap()["player"].is_silent());
    }

    let info = engine.file_info("player").unwrap();
    assert_eq!(info.total_samples, 100);
    assert!((info.progress_percent - 100.0).abs() < 1e-9);
    assert!(engine.file_info("ghost").is_none());
}

#[test]
fn test_unavailable_devices_degrade_to_silence() {
    let device = NodeParams::new().with("device", "patchbay-test-no-such-device");
    let spec = RoutingSpec::new(48000, 128)
        .with_node(NodeSpec::new("mic", "audio_input").with_params(device.clone()))
        .with_node(NodeSpec::new("osc", "sine"))
        .with_node(NodeSpec::new("speaker", "audio_output").with_params(device))
        .with_node(NodeSpec::new("after", "passthrough"))
        .connect("mic", "speaker")
        .connect("osc", "speaker")
        .connect("speaker", "after");
    let mut engine = build(&spec).unwrap();
    for block in 0..3 {
        let outputs = engine.process_block(block).unwrap();
        assert!(outputs["mic"].is_silent());
        assert!(outputs["speaker"].is_silent());
        assert!(outputs["after"].is_silent());
        assert_eq!(outputs["speaker"].shape(), (128, 2));
    }
}
