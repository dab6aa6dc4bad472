mod aabb;
mod config;
mod geometry;
mod host;
mod light;
mod material;
mod npy;
mod orchestrator;
mod preview;
mod properties;
mod renderer;
mod sampler;
mod scene;
mod serializer;
#[cfg(test)]
mod tests;

use anyhow::Context;
use clap::Parser;

use crate::config::{Cli, Command};
use crate::host::HostRenderer;
use crate::orchestrator::PatchOrchestrator;
use crate::preview::write_preview;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().into_command()? {
        Command::Preview { npy, png } => write_preview(&npy, &png)
            .with_context(|| format!("failed converting {} to {}", npy.display(), png.display())),
        Command::Run(config) => {
            let scene = config.scene.clone();
            let mut orchestrator = PatchOrchestrator::new(config, HostRenderer::new());
            let outputs = orchestrator
                .run()
                .with_context(|| format!("failed rendering {}", scene.display()))?;
            log::info!("{} patch(es) written", outputs.len());
            Ok(())
        }
    }
}
