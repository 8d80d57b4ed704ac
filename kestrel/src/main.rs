use anyhow::{Context, Result};
use glam::Vec4;
use kestrel_engine::prelude::*;
use kestrel_materials::prelude::*;
use kestrel_resources::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const FRAMES: u64 = 3;

/// `KESTREL_LOG` picks the max level, info otherwise
fn log_level() -> Level {
    std::env::var("KESTREL_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(Level::INFO)
}

fn demo_broker() -> Arc<MemoryBroker> {
    let broker = MemoryBroker::new();
    broker.insert(
        "textures",
        "brick_albedo",
        ImageAsset::solid([180, 72, 50, 255]),
    );
    broker.insert(
        "materials",
        "brick",
        MaterialAsset {
            base_colour: MaterialInput::mapped(
                Vec4::ONE,
                TextureMap::new("textures", "brick_albedo"),
            ),
            roughness: MaterialInput::value(0.8),
            ..MaterialAsset::default()
        },
    );
    Arc::new(broker)
}

/// Loads every file in `<root>/<package>` as a binary resource, then releases them again
fn load_package(engine: &mut Engine<HeadlessBinder>, root: &Path, package: &str) -> Result<()> {
    let dir = root.join(package);
    let entries =
        std::fs::read_dir(&dir).with_context(|| format!("Reading {}", dir.display()))?;
    let mut loaded = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let info = RequestInfo::new()
            .with_asset(AssetInfo::new(AssetType::Binary, package, file_name.as_str()))
            .synchronous(true);
        match engine
            .cache_mut()
            .request(file_name.as_str(), ResourceType::Binary, info)
        {
            Ok(handle) => {
                let size = engine
                    .cache()
                    .payload::<BinaryResource>(&handle)
                    .map(|binary| binary.bytes.len())
                    .unwrap_or_default();
                tracing::info!("Loaded {}/{} ({} bytes)", package, file_name, size);
                loaded.push(file_name);
            }
            Err(e) => tracing::warn!("Skipping {}/{}: {}", package, file_name, e),
        }
    }
    engine.dump();
    for file_name in loaded {
        engine.cache_mut().release(file_name.as_str())?;
    }
    Ok(())
}

/// Two instances sharing one material, applied over a few frames
fn run_materials(engine: &mut Engine<HeadlessBinder>, material: &str) -> Result<()> {
    let a = engine.acquire_material(material)?;
    let b = engine.acquire_material(material)?;
    for frame in 0..FRAMES {
        engine.frame();
        if frame == 1 {
            engine
                .materials_mut()
                .set_base_colour(b, Vec4::new(0.2, 0.4, 0.8, 1.0))?;
        }
        engine.apply_material(a)?;
        engine.apply_material(b)?;
    }
    if let Some(stats) = engine
        .binder()
        .shader_for(MaterialKind::Standard)
        .and_then(|shader| engine.binder().stats(shader))
    {
        tracing::info!(
            "{} binds, {} group uploads, {} per-draw uploads over {} frames",
            stats.binds,
            stats.group_uploads,
            stats.per_draw_uploads,
            FRAMES
        );
    }
    engine.dump();
    engine.release_material(a)?;
    engine.release_material(b)?;
    Ok(())
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level())
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Installing log subscriber")?;

    let mut args = std::env::args().skip(1);
    let asset_root = args.next().map(PathBuf::from);
    let binder = HeadlessBinder::default();
    match asset_root {
        Some(root) => {
            let package = args.next().unwrap_or_else(|| String::from("data"));
            let config = EngineConfig::default().with_asset_root(&root);
            let mut engine = Engine::with_asset_root(config, binder)?;
            load_package(&mut engine, &root, &package)?;
            run_materials(&mut engine, DEFAULT_MATERIAL_NAME)?;
            engine.shutdown();
        }
        None => {
            let mut engine = Engine::new(EngineConfig::default(), demo_broker(), binder)?;
            run_materials(&mut engine, "brick")?;
            engine.shutdown();
        }
    }
    Ok(())
}
