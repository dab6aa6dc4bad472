//! CPU back-end. Meshes are not loaded: each one is drawn as the box its
//! transform makes of the unit cube, which is enough to exercise cameras,
//! materials and the buffer layouts without a GPU.

use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use crate::aabb::Aabb;
use crate::geometry::{Fp, Ray, Vec3f, EPS};
use crate::light::{GpuLight, LightParameter};
use crate::material::{BrdfKind, GpuMaterial, MaterialParameter, TextureId};
use crate::properties::{CameraFrame, CameraParams};
use crate::renderer::{
    DeviceBuffer, HostBuffer, RenderError, Renderer, FEATURE_FLOATS, FEATURE_SLOTS, OUTPUT_FLOATS,
};
use crate::scene::Scene;

/// Offsets into one feature record.
pub mod record {
    pub const SUBPIXEL: usize = 0;
    pub const RADIANCE: usize = 2;
    pub const ALBEDO: usize = 5;
    pub const NORMAL: usize = 8;
    pub const DEPTH: usize = 11;
    pub const HAS_HIT: usize = 12;
    /// Leading floats that carry data; the rest of a chunk stays zero.
    pub const LEN: usize = 13;
}

fn unit_cube() -> Aabb {
    Aabb::new(Vec3f::new(-1.0, -1.0, -1.0), Vec3f::new(1.0, 1.0, 1.0))
}

#[derive(Clone, Debug, Default)]
struct Sample {
    radiance: Vec3f,
    albedo: Vec3f,
    normal: Vec3f,
    depth: Fp,
    has_hit: bool,
}

impl Sample {
    fn record(&self, subpixel: (Fp, Fp)) -> [f32; record::LEN] {
        let mut rec = [0.0; record::LEN];
        rec[record::SUBPIXEL] = subpixel.0;
        rec[record::SUBPIXEL + 1] = subpixel.1;
        rec[record::RADIANCE..record::RADIANCE + 3].copy_from_slice(self.radiance.as_slice());
        rec[record::ALBEDO..record::ALBEDO + 3].copy_from_slice(self.albedo.as_slice());
        rec[record::NORMAL..record::NORMAL + 3].copy_from_slice(self.normal.as_slice());
        rec[record::DEPTH] = self.depth;
        rec[record::HAS_HIT] = if self.has_hit { 1.0 } else { 0.0 };
        rec
    }
}

/// Slab test against an axis-aligned box. Returns the entry distance and
/// the outward normal of the entered face.
fn intersect_box(ray: &Ray, aabb: &Aabb) -> Option<(Fp, Vec3f)> {
    let mut t_min = 0.0;
    let mut t_max = Fp::INFINITY;
    let mut normal = Vec3f::zeros();
    for axis in 0..3 {
        let inv = 1.0 / ray.direction[axis];
        let mut t0 = (aabb.min[axis] - ray.origin[axis]) * inv;
        let mut t1 = (aabb.max[axis] - ray.origin[axis]) * inv;
        let mut sign = -1.0;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
            sign = 1.0;
        }
        if t0 > t_min {
            t_min = t0;
            normal = Vec3f::zeros();
            normal[axis] = sign;
        }
        t_max = Fp::min(t_max, t1);
        if t_min > t_max {
            return None;
        }
    }
    // origin inside the box
    if normal == Vec3f::zeros() {
        return None;
    }
    Some((t_min, normal))
}

fn intersect_sphere(ray: &Ray, center: &Vec3f, radius: Fp) -> Option<Fp> {
    let o = ray.origin - center;
    let a = ray.direction.dot(&ray.direction);
    let b = 2.0 * o.dot(&ray.direction);
    let c = o.dot(&o) - radius * radius;
    let discr = b * b - 4.0 * a * c;
    if discr < 0.0 {
        return None;
    }
    let sqrt = discr.sqrt();
    [(-b - sqrt) / (2.0 * a), (-b + sqrt) / (2.0 * a)]
        .into_iter()
        .find(|t| *t > EPS)
}

fn sky(direction: &Vec3f) -> Vec3f {
    let t = 0.5 * (direction.y + 1.0);
    Vec3f::repeat(1.0 - t) + Vec3f::new(0.5, 0.7, 1.0) * t
}

const SPHERE_LIGHT: i32 = 1;

struct Tracer<'a> {
    boxes: &'a [Aabb],
    materials: &'a [GpuMaterial],
    lights: &'a [GpuLight],
    background: Option<Vec3f>,
}

impl Tracer<'_> {
    fn trace(&self, ray: &Ray) -> Sample {
        let nearest_box = self
            .boxes
            .iter()
            .zip(self.materials)
            .filter_map(|(aabb, material)| {
                intersect_box(ray, aabb).map(|(t, normal)| (t, normal, material))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));
        let nearest_light = self
            .lights
            .iter()
            .filter(|light| light.light_type == SPHERE_LIGHT)
            .filter_map(|light| {
                intersect_sphere(ray, &Vec3f::from(light.position), light.radius)
                    .map(|t| (t, Vec3f::from(light.emission)))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let direction = ray.direction.normalize();
        match (nearest_box, nearest_light) {
            (_, Some((t_light, emission)))
                if nearest_box.map_or(true, |(t_box, _, _)| t_light < t_box) =>
            {
                Sample {
                    radiance: emission,
                    depth: t_light * ray.direction.norm(),
                    has_hit: true,
                    ..Default::default()
                }
            }
            (Some((t, normal, material)), _) => {
                let facing = normal.dot(&-direction).max(0.0);
                let color = Vec3f::from(material.color);
                let transmissive = material.brdf == BrdfKind::Glass.tag()
                    || material.brdf == BrdfKind::RoughDielectric.tag();
                // transmissive lobes let the background through, tinted
                let radiance = if transmissive {
                    self.background(&direction).component_mul(&color)
                } else {
                    color * (0.25 + 0.75 * facing)
                };
                Sample {
                    radiance: radiance + Vec3f::from(material.emission),
                    albedo: color,
                    normal,
                    depth: t * ray.direction.norm(),
                    has_hit: true,
                }
            }
            _ => Sample {
                radiance: self.background(&direction),
                ..Default::default()
            },
        }
    }

    fn background(&self, direction: &Vec3f) -> Vec3f {
        self.background.unwrap_or_else(|| sky(direction))
    }
}

pub struct HostRenderer {
    boxes: Vec<Aabb>,
    materials: Vec<GpuMaterial>,
    lights: Vec<GpuLight>,
    background: Option<Vec3f>,
    camera: CameraParams,
    vfov: Fp,
    output: HostBuffer,
    features: HostBuffer,
    feature_frames: u32,
    launches: u32,
}

impl Default for HostRenderer {
    fn default() -> Self {
        HostRenderer {
            boxes: vec![],
            materials: vec![],
            lights: vec![],
            background: None,
            camera: CameraParams {
                eye: Vec3f::new(0.0, 0.0, 1.0),
                lookat: Vec3f::zeros(),
                up: Vec3f::y(),
            },
            vfov: 35.0,
            output: HostBuffer::new(0, 0, OUTPUT_FLOATS),
            features: HostBuffer::new(0, 0, FEATURE_FLOATS),
            feature_frames: FEATURE_SLOTS as u32,
            launches: 0,
        }
    }
}

impl HostRenderer {
    pub fn new() -> HostRenderer {
        HostRenderer::default()
    }
}

#[cfg(test)]
impl HostRenderer {
    /// Total launches since creation.
    pub fn launches(&self) -> u32 {
        self.launches
    }

    pub fn camera(&self) -> (&CameraParams, Fp) {
        (&self.camera, self.vfov)
    }
}

impl Renderer for HostRenderer {
    fn load_scene(&mut self, scene: &Scene) -> Result<Aabb, RenderError> {
        if scene.meshes.is_empty() {
            return Err(RenderError::LoadScene("scene has no meshes".to_string()));
        }
        self.boxes = scene
            .meshes
            .iter()
            .map(|mesh| {
                log::debug!("mesh {} drawn as its unit cube proxy", mesh.path.display());
                unit_cube().transform(&mesh.transform)
            })
            .collect();
        let mut bounds = Aabb::default();
        for aabb in &self.boxes {
            bounds.include_aabb(aabb);
        }
        self.update_materials(&scene.materials)?;
        self.update_lights(&scene.lights)?;
        for id in 0..scene.textures.len() as u32 {
            if let Some(path) = scene.texture_path(TextureId(id)) {
                log::debug!("texture {} is {}", id, path.display());
            }
        }
        log::debug!(
            "host back-end loaded {} mesh proxies, traces depth 1 of {}",
            self.boxes.len(),
            scene.properties.max_depth
        );
        Ok(bounds)
    }

    fn load_environment(&mut self, path: &Path) -> Result<LightParameter, RenderError> {
        let image = image::open(path)
            .map_err(|e| RenderError::LoadScene(format!("envmap {}: {}", path.display(), e)))?
            .into_rgb32f();
        let texels = (image.width() as usize * image.height() as usize).max(1);
        let sum = image
            .pixels()
            .fold(Vec3f::zeros(), |acc, p| acc + Vec3f::new(p.0[0], p.0[1], p.0[2]));
        let mean = sum / texels as Fp;
        self.background = Some(mean);
        log::info!("envmap {} ({}x{})", path.display(), image.width(), image.height());
        Ok(LightParameter::Envmap {
            texture_id: 0,
            cdf_u: 1,
            cdf_v: 2,
            integral: 0.3 * mean.x + 0.6 * mean.y + 0.1 * mean.z,
        })
    }

    fn set_feature_frames(&mut self, frames: u32) {
        self.feature_frames = frames.max(1);
    }

    fn set_camera(&mut self, camera: &CameraParams, vfov: Fp) {
        self.camera = camera.clone();
        self.vfov = vfov;
    }

    fn update_materials(&mut self, materials: &[MaterialParameter]) -> Result<(), RenderError> {
        if materials.len() != self.boxes.len() {
            return Err(RenderError::CountMismatch {
                what: "materials",
                expected: self.boxes.len(),
                actual: materials.len(),
            });
        }
        self.materials = materials.iter().map(MaterialParameter::to_gpu).collect();
        Ok(())
    }

    fn update_lights(&mut self, lights: &[LightParameter]) -> Result<(), RenderError> {
        self.lights = lights.iter().map(LightParameter::to_gpu).collect();
        Ok(())
    }

    fn launch(&mut self, frame: u32, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::Launch {
                frame,
                reason: format!("empty film {}x{}", width, height),
            });
        }
        self.output.resize(width, height);
        self.features.resize(width, height);
        if frame == 0 {
            self.output.data_mut().fill(0.0);
            self.features.data_mut().fill(0.0);
        }

        let CameraFrame { eye, u, v, w } = self.camera.frame(self.vfov, width, height);
        let tracer = Tracer {
            boxes: &self.boxes,
            materials: &self.materials,
            lights: &self.lights,
            background: self.background,
        };
        let frames = self.feature_frames as usize;
        let chunk = FEATURE_FLOATS / frames;
        let start = (frame as usize % frames) * chunk;
        let len = chunk.min(record::LEN);
        let weight = 1.0 / (frame as Fp + 1.0);

        self.output
            .data_mut()
            .par_chunks_exact_mut(OUTPUT_FLOATS)
            .zip(self.features.data_mut().par_chunks_exact_mut(FEATURE_FLOATS))
            .enumerate()
            .for_each(|(index, (pixel, feature))| {
                let (x, y) = (index as u32 % width, index as u32 / width);
                let mut rng =
                    Xoshiro256PlusPlus::seed_from_u64(((frame as u64) << 32) ^ index as u64);
                let (sx, sy) = (rng.gen::<Fp>(), rng.gen::<Fp>());
                // row 0 is the bottom of the image
                let px = 2.0 * (x as Fp + sx) / width as Fp - 1.0;
                let py = 2.0 * (y as Fp + sy) / height as Fp - 1.0;
                let ray = Ray {
                    origin: eye,
                    direction: px * u + py * v + w,
                };
                let sample = tracer.trace(&ray);

                for c in 0..3 {
                    pixel[c] += (sample.radiance[c] - pixel[c]) * weight;
                }
                pixel[3] = 1.0;

                let rec = sample.record((sx, sy));
                feature[start..start + len].copy_from_slice(&rec[..len]);
            });
        self.launches += 1;
        Ok(())
    }

    fn output_buffer(&mut self) -> &mut dyn DeviceBuffer {
        &mut self.output
    }

    fn feature_buffer(&mut self) -> &mut dyn DeviceBuffer {
        &mut self.features
    }

    fn teardown(&mut self) {
        log::debug!("host back-end teardown after {} launches", self.launches);
        self.boxes.clear();
        self.materials.clear();
        self.lights.clear();
        self.background = None;
    }
}
