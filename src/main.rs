mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

use patchbay::nodes::builtin_parameters;
use patchbay::plugin::hash_directory;
use patchbay::{load_routing_file, GraphEngine, ParameterDescriptor, TrustPolicy, BUILTIN_KINDS};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

fn run_graph(config: PathBuf, blocks: u64, track: Vec<String>) -> Result<()> {
    let spec = load_routing_file(&config)?;
    let mut engine = GraphEngine::new(&spec)
        .with_context(|| format!("failed to build routing graph from {}", config.display()))?;

    let track: Vec<&str> = track.iter().map(String::as_str).collect();
    let tracked = if track.is_empty() { None } else { Some(track.as_slice()) };
    let last = engine.run_last(blocks, tracked)?;

    println!("Execution order: {}", engine.execution_order().join(" -> "));
    let Some(last) = last else {
        println!("No blocks processed");
        return Ok(());
    };

    println!("Block {} ({} frames @ {} Hz):", blocks - 1, engine.frame_length(), engine.sample_rate());
    for id in engine.execution_order() {
        if let Some(frame) = last.get(id) {
            let (frames, channels) = frame.shape();
            println!(
                "  {:<16} {:>6}x{:<2} peak {:.4}  rms {:.4}",
                id,
                frames,
                channels,
                frame.peak(),
                frame.rms()
            );
        }
    }

    for id in engine.node_ids() {
        if let Some(info) = engine.file_info(id) {
            println!(
                "  {:<16} {} {:.2}/{:.2}s ({:.1}%)",
                id, info.file_path, info.current_time, info.duration, info.progress_percent
            );
        }
    }
    Ok(())
}

fn verify_manifest(manifest: PathBuf, plugin_root: Option<PathBuf>) -> Result<()> {
    let policy = match plugin_root {
        Some(root) => TrustPolicy::new(root),
        None => TrustPolicy::from_env(),
    };
    let verified = policy
        .admit(&manifest)
        .with_context(|| format!("plugin manifest {} rejected", manifest.display()))?;

    println!("OK {} {} ({})", verified.name, verified.version, verified.module);
    println!("  directory: {}", policy.plugin_dir(&verified).display());
    println!("  kinds: {}", verified.allowed_node_kinds.join(", "));
    Ok(())
}

fn list_kinds() {
    for kind in BUILTIN_KINDS {
        println!("{}", kind);
        for param in builtin_parameters(kind) {
            println!(
                "  {:<14} default {}",
                param.name(),
                param.format_value(param.default_value())
            );
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, blocks, track } => run_graph(config, blocks, track)?,
        Commands::Hash { dir } => {
            let digest = hash_directory(&dir).with_context(|| format!("failed to hash {}", dir.display()))?;
            println!("{}", digest);
        }
        Commands::Verify { manifest, plugin_root } => verify_manifest(manifest, plugin_root)?,
        Commands::Kinds => list_kinds(),
    }

    Ok(())
}
