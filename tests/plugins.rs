use std::fs;
use std::path::{Path, PathBuf};

use patchbay::nodes::SineNode;
use patchbay::plugin::{hash_directory, PluginModule, PluginRegistry, TrustPolicy};
use patchbay::{
    AudioNode, EngineError, FactoryError, GraphEngine, NodeBuildError, NodeContext, NodeFactory, NodeParams, NodeSpec,
    PluginError, RoutingSpec,
};
use serde_json::json;
use tempfile::{tempdir, TempDir};

const MODULE: &str = "patchbay_plugins.tone_pack";

fn tone(ctx: &NodeContext, params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
    SineNode::build(ctx, params)
}

fn mislabelled(ctx: &NodeContext, params: &NodeParams) -> Result<Box<dyn AudioNode>, NodeBuildError> {
    let renamed = NodeContext::new("someone-else", ctx.kind.clone(), ctx.sample_rate, ctx.channels);
    SineNode::build(&renamed, params)
}

fn registry() -> PluginRegistry {
    let registry = PluginRegistry::new();
    registry
        .register(
            PluginModule::new(MODULE)
                .with_kind("tone", tone)
                .with_kind("mislabelled", mislabelled),
        )
        .unwrap();
    registry
}

/// Plugin package `tone_pack` under a fresh plugin root, plus its manifest
/// next to (not inside) the package directory.
struct Package {
    root: TempDir,
    manifest: PathBuf,
}

impl Package {
    fn plugin_dir(&self) -> PathBuf {
        self.root.path().join("tone_pack")
    }

    fn policy(&self) -> TrustPolicy {
        TrustPolicy::new(self.root.path())
    }
}

fn package_with(module: &str, kinds: &[&str]) -> Package {
    let root = tempdir().unwrap();
    let plugin_dir = root.path().join("tone_pack");
    fs::create_dir_all(plugin_dir.join("presets")).unwrap();
    fs::write(plugin_dir.join("README.md"), "Tone pack\n").unwrap();
    fs::write(plugin_dir.join("presets").join("bright.yaml"), "frequency_hz: 880\n").unwrap();

    let digest = hash_directory(&plugin_dir).unwrap();
    let manifest = root.path().join("tone_pack.yaml");
    fs::write(
        &manifest,
        format!(
            "name: tone_pack\nversion: 1.2.0\nmodule: {}\nhash:\n  algorithm: sha256\n  value: {}\nallowed_node_kinds: [{}]\n",
            module,
            digest,
            kinds.join(", ")
        ),
    )
    .unwrap();

    Package { root, manifest }
}

fn package() -> Package {
    package_with(MODULE, &["tone", "mislabelled"])
}

fn routing(kind: &str, manifest: &Path) -> RoutingSpec {
    RoutingSpec::new(48000, 256).with_node(
        NodeSpec::new("voice", kind)
            .with_params(NodeParams::new().with("amplitude", 0.5))
            .with_manifest(manifest),
    )
}

fn build(spec: &RoutingSpec, policy: TrustPolicy, registry: &PluginRegistry) -> Result<GraphEngine, EngineError> {
    GraphEngine::with_factory(spec, &NodeFactory::with_registry(policy, registry))
}

fn plugin_error(result: Result<GraphEngine, EngineError>) -> PluginError {
    match result {
        Err(EngineError::NodeCreation {
            source: FactoryError::Plugin(err),
            ..
        }) => err,
        Err(other) => panic!("expected a plugin error, got {}", other),
        Ok(_) => panic!("expected a plugin error, graph was built"),
    }
}

#[test]
fn test_verified_manifest_resolves_registered_kind() {
    let package = package();
    let registry = registry();
    let mut engine = build(&routing("tone", &package.manifest), package.policy(), &registry).unwrap();

    let outputs = engine.process_block(0).unwrap();
    assert_eq!(outputs["voice"].shape(), (256, 2));
    assert!((outputs["voice"].peak() - 0.5).abs() < 0.01);
    assert_eq!(engine.node("voice").unwrap().node_info().kind, "tone");
}

#[test]
fn test_kind_matching_is_case_insensitive() {
    let package = package();
    let registry = registry();
    assert!(build(&routing("TONE", &package.manifest), package.policy(), &registry).is_ok());
}

#[test]
fn test_tampered_package_is_refused() {
    let package = package();
    let registry = registry();
    let preset = package.plugin_dir().join("presets").join("bright.yaml");

    fs::write(&preset, "frequency_hz: 881\n").unwrap();
    assert!(matches!(
        plugin_error(build(&routing("tone", &package.manifest), package.policy(), &registry)),
        PluginError::HashMismatch { .. }
    ));

    fs::write(&preset, "frequency_hz: 880\n").unwrap();
    assert!(build(&routing("tone", &package.manifest), package.policy(), &registry).is_ok());
}

#[test]
fn test_added_file_is_refused() {
    let package = package();
    let registry = registry();
    fs::write(package.plugin_dir().join("payload.so"), [0u8, 1, 2]).unwrap();
    assert!(matches!(
        plugin_error(build(&routing("tone", &package.manifest), package.policy(), &registry)),
        PluginError::HashMismatch { .. }
    ));
}

#[test]
fn test_hidden_files_do_not_count() {
    let package = package();
    let registry = registry();
    fs::write(package.plugin_dir().join(".editor-swap"), "scratch").unwrap();
    assert!(build(&routing("tone", &package.manifest), package.policy(), &registry).is_ok());
}

#[test]
fn test_manifest_name_cannot_leave_plugin_root() {
    let package = package();
    let registry = registry();
    let outside = tempdir().unwrap();
    fs::write(outside.path().join("README.md"), "elsewhere\n").unwrap();
    let digest = hash_directory(outside.path()).unwrap();

    let escape = package.root.path().join("escape.yaml");
    fs::write(
        &escape,
        format!(
            "name: '{}'\nversion: 1.0.0\nmodule: {}\nhash:\n  algorithm: sha256\n  value: {}\nallowed_node_kinds: [tone]\n",
            outside.path().display(),
            MODULE,
            digest
        ),
    )
    .unwrap();
    assert!(matches!(
        plugin_error(build(&routing("tone", &escape), package.policy(), &registry)),
        PluginError::InvalidManifest { .. }
    ));
}

#[test]
fn test_foreign_namespace_is_refused() {
    let package = package_with("os.tone_pack", &["tone"]);
    let registry = registry();
    assert!(matches!(
        plugin_error(build(&routing("tone", &package.manifest), package.policy(), &registry)),
        PluginError::NamespaceNotAllowed { .. }
    ));
}

#[test]
fn test_kind_outside_manifest_is_refused() {
    let package = package_with(MODULE, &["tone"]);
    let registry = registry();
    match plugin_error(build(&routing("mislabelled", &package.manifest), package.policy(), &registry)) {
        PluginError::KindNotAllowed { kind, plugin, allowed } => {
            assert_eq!(kind, "mislabelled");
            assert_eq!(plugin, "tone_pack");
            assert_eq!(allowed, vec!["tone".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_kind_missing_from_module() {
    let package = package_with(MODULE, &["tone", "chime"]);
    let registry = registry();
    assert!(matches!(
        plugin_error(build(&routing("chime", &package.manifest), package.policy(), &registry)),
        PluginError::KindNotInModule { .. }
    ));
}

#[test]
fn test_missing_manifest_is_refused() {
    let package = package();
    let registry = registry();
    let missing = package.root.path().join("absent.yaml");
    assert!(matches!(
        plugin_error(build(&routing("tone", &missing), package.policy(), &registry)),
        PluginError::ManifestNotFound { .. }
    ));
}

#[test]
fn test_invalid_manifest_is_refused() {
    let package = package();
    let registry = registry();
    fs::write(
        &package.manifest,
        "name: tone_pack\nversion: 1\nmodule: tonepack\nhash: {algorithm: sha256, value: 0123456789abcdef0123456789abcdef}\nallowed_node_kinds: [tone]\n",
    )
    .unwrap();
    assert!(matches!(
        plugin_error(build(&routing("tone", &package.manifest), package.policy(), &registry)),
        PluginError::InvalidManifest { .. }
    ));
}

#[test]
fn test_wrong_plugin_root_is_refused() {
    let package = package();
    let registry = registry();
    let elsewhere = tempdir().unwrap();
    assert!(matches!(
        plugin_error(build(&routing("tone", &package.manifest), TrustPolicy::new(elsewhere.path()), &registry)),
        PluginError::PluginDirNotFound { .. }
    ));
}

#[test]
fn test_unregistered_module_needs_a_library() {
    let package = package();
    let empty = PluginRegistry::new();
    assert!(matches!(
        plugin_error(build(&routing("tone", &package.manifest), package.policy(), &empty)),
        PluginError::Load { .. }
    ));
    assert!(!empty.contains_module(MODULE));
}

#[cfg(unix)]
#[test]
fn test_symlinked_library_is_refused() {
    let package = package();
    let empty = PluginRegistry::new();
    let plugin_dir = package.plugin_dir();
    let library = patchbay::plugin::library_path(&plugin_dir, MODULE);
    fs::write(plugin_dir.join("benign.so"), "benign").unwrap();
    fs::write(package.root.path().join("evil.so"), "evil").unwrap();

    std::os::unix::fs::symlink(plugin_dir.join("benign.so"), &library).unwrap();
    assert!(matches!(
        plugin_error(build(&routing("tone", &package.manifest), package.policy(), &empty)),
        PluginError::Hashing { .. }
    ));

    fs::remove_file(&library).unwrap();
    std::os::unix::fs::symlink(package.root.path().join("evil.so"), &library).unwrap();
    assert!(matches!(
        plugin_error(build(&routing("tone", &package.manifest), package.policy(), &empty)),
        PluginError::Hashing { .. }
    ));
    assert!(!empty.contains_module(MODULE));
}

#[test]
fn test_toml_manifest() {
    let package = package();
    let registry = registry();
    let digest = hash_directory(package.plugin_dir()).unwrap();
    let manifest = package.root.path().join("tone_pack.toml");
    fs::write(
        &manifest,
        format!(
            "name = \"tone_pack\"\nversion = \"1.2.0\"\nmodule = \"{}\"\nallowed_node_kinds = [\"tone\"]\n\n[hash]\nalgorithm = \"SHA256\"\nvalue = \"{}\"\n",
            MODULE, digest
        ),
    )
    .unwrap();
    assert!(build(&routing("tone", &manifest), package.policy(), &registry).is_ok());
}

#[test]
fn test_contract_violation_is_structural_error() {
    let package = package();
    let registry = registry();
    assert!(matches!(
        plugin_error(build(&routing("mislabelled", &package.manifest), package.policy(), &registry)),
        PluginError::ContractViolation { .. }
    ));
}

#[test]
fn test_legacy_inline_reference() {
    let registry = registry();
    let inline = |module: &str| {
        RoutingSpec::new(48000, 128).with_node(
            NodeSpec::new("voice", "plugin")
                .with_params(NodeParams::new().with("plugin", json!({ "module": module, "class": "Tone" }))),
        )
    };

    let mut engine = build(&inline(MODULE), TrustPolicy::default(), &registry).unwrap();
    assert!(!engine.process_block(0).unwrap()["voice"].is_silent());

    assert!(matches!(
        plugin_error(build(&inline("subprocess.tone"), TrustPolicy::default(), &registry)),
        PluginError::NamespaceNotAllowed { .. }
    ));
}

#[test]
fn test_sealed_registry_rejects_late_modules() {
    let registry = registry();
    registry.seal();
    assert!(matches!(
        registry.register(PluginModule::new("patchbay_plugins.late").with_kind("late", tone)),
        Err(PluginError::RegistrySealed { .. })
    ));
    assert_eq!(registry.modules().len(), 1);
}
