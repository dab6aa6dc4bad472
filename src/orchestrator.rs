use std::path::{Path, PathBuf};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::aabb::resolve_bounds;
use crate::config::RunConfig;
use crate::light::corner_lights;
use crate::renderer::{RenderError, Renderer};
use crate::sampler::{randomize_materials, sample_camera, RandomStream};
use crate::scene::{Scene, SceneError};
use crate::serializer::{write_buffer, Layout, SerializeError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

/// `<stem>_<patch>.npy` next to `base`, or `base` itself for a single patch.
pub fn patch_path(base: &Path, patch: Option<u32>) -> PathBuf {
    match patch {
        None => base.to_path_buf(),
        Some(r) => {
            let stem = base.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
            base.with_file_name(format!("{}_{}.npy", stem, r))
        }
    }
}

/// Files written for one patch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchOutput {
    pub features: Option<PathBuf>,
    pub reference: Option<PathBuf>,
}

pub struct PatchOrchestrator<R: Renderer> {
    config: RunConfig,
    renderer: R,
    rng: RandomStream,
}

impl<R: Renderer> PatchOrchestrator<R> {
    pub fn new(config: RunConfig, renderer: R) -> PatchOrchestrator<R> {
        let rng = match config.seed {
            Some(seed) => RandomStream::from_seed(seed),
            None => RandomStream::from_time(),
        };
        PatchOrchestrator {
            config,
            renderer,
            rng,
        }
    }

    /// Runs every patch. The renderer is torn down whatever the outcome.
    pub fn run(&mut self) -> Result<Vec<PatchOutput>, PipelineError> {
        let result = self.run_patches();
        self.renderer.teardown();
        result
    }

    fn run_patches(&mut self) -> Result<Vec<PatchOutput>, PipelineError> {
        let mut scene = Scene::from_file(&self.config.scene)?;
        self.config.apply_film(&mut scene.properties);
        let geometry = self.renderer.load_scene(&scene)?;
        self.renderer.set_feature_frames(self.config.feature_frames);

        let mut lights_changed = false;
        if let Some(envmap) = scene.properties.envmap.clone() {
            let light = self.renderer.load_environment(&scene.dir.join(envmap))?;
            scene.set_environment_light(light);
            lights_changed = true;
        }
        if self.config.debug_lights {
            scene.lights.extend(corner_lights(&geometry));
            lights_changed = true;
        }
        if lights_changed {
            self.renderer.update_lights(&scene.lights)?;
        }

        log::info!("[Mode] {}", self.config.mode.describe());
        if !self.config.is_multi_patch() {
            let camera = scene.properties.initial_camera(&geometry);
            self.renderer.set_camera(&camera, scene.properties.vfov);
            return Ok(vec![self.render_patch(&scene, None)?]);
        }

        let bounds = resolve_bounds(&self.config.scene, &geometry);
        log::info!("random stream seeded with {}", self.rng.seed());
        let progress = ProgressBar::new(self.config.patches as u64);
        progress.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} patches")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut outputs = Vec::with_capacity(self.config.patches as usize);
        for r in 0..self.config.patches {
            let sample = sample_camera(&mut self.rng, &bounds.aabb, bounds.kind);
            self.renderer.set_camera(&sample.camera, sample.vfov);
            randomize_materials(&mut self.rng, &mut scene.materials);
            self.renderer.update_materials(&scene.materials)?;

            outputs.push(self.render_patch(&scene, Some(r))?);
            progress.inc(1);
        }
        progress.finish_and_clear();
        Ok(outputs)
    }

    fn accumulate(&mut self, frames: u32, width: u32, height: u32) -> Result<(), RenderError> {
        for frame in 0..frames {
            self.renderer.launch(frame, width, height)?;
        }
        Ok(())
    }

    fn render_patch(
        &mut self,
        scene: &Scene,
        patch: Option<u32>,
    ) -> Result<PatchOutput, PipelineError> {
        let (width, height) = (scene.properties.width, scene.properties.height);
        let (spp, mspp) = (self.config.feature_frames, self.config.reference_frames);
        let mode = self.config.mode;
        match (mode.wants_features(), mode.wants_reference()) {
            (true, true) => log::info!("[Frames] (feat) {}, (ref) {}", spp, mspp),
            (true, false) => log::info!("[Frames] {}", spp),
            _ => log::info!("[Frames] {}", mspp),
        }
        log::info!("[Film size] {}, {}", width, height);

        let mut output = PatchOutput::default();
        if let Some(base) = self.config.feature_path.clone() {
            let start = Instant::now();
            self.accumulate(spp, width, height)?;
            log::info!("[Elapsed time] (feat) {:.2}s", start.elapsed().as_secs_f64());
            let path = patch_path(&base, patch);
            write_buffer(
                &path,
                self.renderer.feature_buffer(),
                Layout::Feature {
                    frames: spp as usize,
                },
            )?;
            output.features = Some(path);
        }
        if let Some(base) = self.config.reference_path.clone() {
            let start = Instant::now();
            self.accumulate(mspp, width, height)?;
            log::info!("[Elapsed time] (ref) {:.2}s", start.elapsed().as_secs_f64());
            let path = patch_path(&base, patch);
            write_buffer(&path, self.renderer.output_buffer(), Layout::Reference)?;
            output.reference = Some(path);
        }
        Ok(output)
    }
}

#[cfg(test)]
impl<R: Renderer> PatchOrchestrator<R> {
    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}
