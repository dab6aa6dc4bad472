use std::fs;
use std::path::{Path, PathBuf};

use crate::aabb::Aabb;
use crate::config::{Mode, RunConfig};
use crate::geometry::{Fp, Vec3f};
use crate::host::HostRenderer;
use crate::light::LightParameter;
use crate::material::MaterialParameter;
use crate::npy::NpyArray;
use crate::orchestrator::{PatchOrchestrator, PipelineError};
use crate::properties::CameraParams;
use crate::renderer::{DeviceBuffer, RenderError, Renderer};
use crate::sampler::CAMERA_MARGIN;
use crate::scene::{Scene, SceneError};

const ROOM: &str = "\
# two crates in a room
properties {
    width 640
    height 480
    fov 45
}

material wood {
    color 0.6 0.4 0.2
    albedoTex \"wood.png\"
}

material mirror {
    brdf ROUGHDIELECTRIC
    roughness 0.2
}

mesh {
    file crate_a.obj
    material wood
}

mesh {
    file crate_b.obj
    transform 2 0 0 3 0 2 0 0 0 0 2 0 0 0 0 1
    material mirror
}

light {
    type Sphere
    position 0 4 0
    radius 0.5
    emission 10 10 10
}
";

fn write_scene(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("room.scene");
    fs::write(&path, content).unwrap();
    path
}

fn config(dir: &Path, scene: PathBuf, mode: Mode, patches: u32) -> RunConfig {
    RunConfig {
        mode,
        scene,
        feature_path: mode.wants_features().then(|| dir.join("feat.npy")),
        reference_path: mode.wants_reference().then(|| dir.join("ref.npy")),
        patches,
        feature_frames: 2,
        reference_frames: 3,
        film_width: Some(8),
        seed: Some(2024),
        debug_lights: false,
    }
}

/// Delegates to the host back-end, recording teardowns and light uploads,
/// and optionally failing a launch.
struct Probe {
    inner: HostRenderer,
    teardowns: u32,
    fail_on_launch: Option<u32>,
    uploaded_lights: Vec<LightParameter>,
    feature_frames: Option<u32>,
}

impl Probe {
    fn new(fail_on_launch: Option<u32>) -> Probe {
        Probe {
            inner: HostRenderer::new(),
            teardowns: 0,
            fail_on_launch,
            uploaded_lights: vec![],
            feature_frames: None,
        }
    }
}

impl Renderer for Probe {
    fn load_scene(&mut self, scene: &Scene) -> Result<Aabb, RenderError> {
        self.inner.load_scene(scene)
    }

    fn load_environment(&mut self, path: &Path) -> Result<LightParameter, RenderError> {
        self.inner.load_environment(path)
    }

    fn set_feature_frames(&mut self, frames: u32) {
        self.feature_frames = Some(frames);
        self.inner.set_feature_frames(frames)
    }

    fn set_camera(&mut self, camera: &CameraParams, vfov: Fp) {
        self.inner.set_camera(camera, vfov)
    }

    fn update_materials(&mut self, materials: &[MaterialParameter]) -> Result<(), RenderError> {
        self.inner.update_materials(materials)
    }

    fn update_lights(&mut self, lights: &[LightParameter]) -> Result<(), RenderError> {
        self.uploaded_lights = lights.to_vec();
        self.inner.update_lights(lights)
    }

    fn launch(&mut self, frame: u32, width: u32, height: u32) -> Result<(), RenderError> {
        if self.fail_on_launch == Some(self.inner.launches()) {
            return Err(RenderError::Launch {
                frame,
                reason: "device lost".to_string(),
            });
        }
        self.inner.launch(frame, width, height)
    }

    fn output_buffer(&mut self) -> &mut dyn DeviceBuffer {
        self.inner.output_buffer()
    }

    fn feature_buffer(&mut self) -> &mut dyn DeviceBuffer {
        self.inner.feature_buffer()
    }

    fn teardown(&mut self) {
        self.teardowns += 1;
        self.inner.teardown()
    }
}

#[test]
fn single_patch_writes_both_arrays() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), ROOM);
    let cfg = config(dir.path(), scene, Mode::All, 1);
    let mut orchestrator = PatchOrchestrator::new(cfg, Probe::new(None));
    let outputs = orchestrator.run().unwrap();

    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].features, Some(dir.path().join("feat.npy")));
    assert_eq!(outputs[0].reference, Some(dir.path().join("ref.npy")));

    let features = NpyArray::load(&dir.path().join("feat.npy")).unwrap();
    assert_eq!(features.shape, vec![8, 8, 2, 108]);
    let reference = NpyArray::load(&dir.path().join("ref.npy")).unwrap();
    assert_eq!(reference.shape, vec![8, 8, 3]);
    assert!(reference.data.iter().all(|x| x.is_finite()));

    let probe = orchestrator.renderer();
    // feature frames, then reference frames
    assert_eq!(probe.inner.launches(), 2 + 3);
    assert_eq!(probe.teardowns, 1);
}

#[test]
fn every_feature_frame_fills_its_own_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), ROOM);
    let mut orchestrator =
        PatchOrchestrator::new(config(dir.path(), scene, Mode::Feature, 1), Probe::new(None));
    orchestrator.run().unwrap();
    assert_eq!(orchestrator.renderer().feature_frames, Some(2));

    let features = NpyArray::load(&dir.path().join("feat.npy")).unwrap();
    assert_eq!(features.shape, vec![8, 8, 2, 108]);
    for element in features.data.chunks_exact(216) {
        for chunk in element.chunks_exact(108) {
            // radiance is positive for hits and sky alike
            assert!(chunk[2..5].iter().sum::<f32>() > 0.0);
            assert!(chunk[13..].iter().all(|x| *x == 0.0));
        }
    }
}

#[test]
fn single_patch_uses_the_derived_camera() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), ROOM);
    let mut orchestrator =
        PatchOrchestrator::new(config(dir.path(), scene, Mode::Reference, 1), Probe::new(None));
    orchestrator.run().unwrap();

    // proxies span [-1, 5] x [-2, 2] x [-2, 2]
    let (camera, vfov) = orchestrator.renderer().inner.camera();
    assert_eq!(camera.eye, Vec3f::new(0.0, 6.0, 6.0));
    assert_eq!(camera.lookat, Vec3f::new(2.0, 0.0, 0.0));
    assert_eq!(vfov, 45.0);
    assert!(!dir.path().join("feat.npy").exists());
}

#[test]
fn multi_patch_suffixes_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), ROOM);
    let mut orchestrator =
        PatchOrchestrator::new(config(dir.path(), scene, Mode::Feature, 3), Probe::new(None));
    let outputs = orchestrator.run().unwrap();

    assert_eq!(outputs.len(), 3);
    for (r, output) in outputs.iter().enumerate() {
        let path = dir.path().join(format!("feat_{}.npy", r));
        assert_eq!(output.features.as_ref(), Some(&path));
        assert_eq!(NpyArray::load(&path).unwrap().shape, vec![8, 8, 2, 108]);
    }
    assert!(!dir.path().join("feat.npy").exists());
    assert_eq!(orchestrator.renderer().inner.launches(), 3 * 2);
}

#[test]
fn fixed_seed_reproduces_a_run() {
    let render = || {
        let dir = tempfile::tempdir().unwrap();
        let scene = write_scene(dir.path(), ROOM);
        let mut orchestrator =
            PatchOrchestrator::new(config(dir.path(), scene, Mode::Reference, 2), Probe::new(None));
        orchestrator.run().unwrap();
        (0..2)
            .map(|r| NpyArray::load(&dir.path().join(format!("ref_{}.npy", r))).unwrap())
            .collect::<Vec<_>>()
    };
    let first = render();
    assert_eq!(first, render());
    // one continuing stream: the patches differ
    assert_ne!(first[0], first[1]);
}

#[test]
fn sidecar_bounds_drive_the_sampled_camera() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), ROOM);
    fs::write(
        dir.path().join("aabb.txt"),
        "type indoor\nxmin -10\nxmax 10\nymin 0\nymax 4\nzmin -10\nzmax 10\n",
    )
    .unwrap();
    let mut orchestrator =
        PatchOrchestrator::new(config(dir.path(), scene, Mode::Reference, 2), Probe::new(None));
    orchestrator.run().unwrap();

    let (camera, vfov) = orchestrator.renderer().inner.camera();
    let center = Vec3f::new(0.0, 2.0, 0.0);
    let inner = Vec3f::new(10.0, 2.0, 10.0) * CAMERA_MARGIN;
    for p in [camera.eye, camera.lookat] {
        for axis in 0..3 {
            assert!((p[axis] - center[axis]).abs() <= inner[axis] + 1e-4);
        }
    }
    assert!((30.0..=60.0).contains(&vfov));
}

#[test]
fn failed_launch_still_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), ROOM);
    let mut orchestrator =
        PatchOrchestrator::new(config(dir.path(), scene, Mode::All, 1), Probe::new(Some(1)));
    let err = orchestrator.run().unwrap_err();

    assert!(matches!(err, PipelineError::Render(RenderError::Launch { frame: 1, .. })));
    assert_eq!(orchestrator.renderer().teardowns, 1);
    assert!(!dir.path().join("feat.npy").exists());
}

#[test]
fn unresolved_material_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), &ROOM.replace("material mirror\n}", "material steel\n}"));
    let mut orchestrator =
        PatchOrchestrator::new(config(dir.path(), scene, Mode::Reference, 1), Probe::new(None));
    let err = orchestrator.run().unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Scene(SceneError::UnknownMaterial { mesh: 1, .. })
    ));
    assert_eq!(orchestrator.renderer().teardowns, 1);
    assert_eq!(orchestrator.renderer().inner.launches(), 0);
}

#[test]
fn envmap_light_is_uploaded_first() {
    let dir = tempfile::tempdir().unwrap();
    image::RgbImage::from_pixel(4, 2, image::Rgb([128, 128, 255]))
        .save(dir.path().join("sky.png"))
        .unwrap();
    let content = ROOM.replace("    fov 45\n", "    fov 45\n    envmap sky.png\n");
    let scene = write_scene(dir.path(), &content);
    let mut orchestrator =
        PatchOrchestrator::new(config(dir.path(), scene, Mode::Reference, 1), Probe::new(None));
    orchestrator.run().unwrap();

    let lights = &orchestrator.renderer().uploaded_lights;
    assert_eq!(lights.len(), 2);
    assert!(lights[0].is_envmap());
    assert!(matches!(lights[1], LightParameter::Sphere { .. }));
}

#[test]
fn missing_envmap_is_a_render_error() {
    let dir = tempfile::tempdir().unwrap();
    let content = ROOM.replace("    fov 45\n", "    fov 45\n    envmap nowhere.hdr\n");
    let scene = write_scene(dir.path(), &content);
    let mut orchestrator =
        PatchOrchestrator::new(config(dir.path(), scene, Mode::Reference, 1), Probe::new(None));
    let err = orchestrator.run().unwrap_err();
    assert!(matches!(err, PipelineError::Render(RenderError::LoadScene(_))));
    assert_eq!(orchestrator.renderer().teardowns, 1);
}

#[test]
fn debug_lights_mark_the_geometry_corners() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), ROOM);
    let mut cfg = config(dir.path(), scene, Mode::Reference, 1);
    cfg.debug_lights = true;
    let mut orchestrator = PatchOrchestrator::new(cfg, Probe::new(None));
    orchestrator.run().unwrap();

    let lights = &orchestrator.renderer().uploaded_lights;
    assert_eq!(lights.len(), 1 + 8);
    assert!(lights[1..].iter().all(|light| matches!(
        light,
        LightParameter::Sphere { radius, .. } if *radius == 0.1
    )));
    assert!(lights[1..].contains(&LightParameter::sphere(
        Vec3f::new(5.0, 2.0, -2.0),
        0.1,
        Vec3f::repeat(10000.0)
    )));
}
