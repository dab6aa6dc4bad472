use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::aabb::{Aabb, SceneKind};
use crate::geometry::{argmin, Fp, Vec3f};
use crate::material::{Brdf, DisneyParams, MaterialParameter, TextureId};
use crate::properties::CameraParams;

/// Fraction of the half extent the camera stays inside, keeping it away from
/// walls and objects hugging them.
pub const CAMERA_MARGIN: Fp = 0.7;
/// Half extent multiplier for the eye box of outdoor scenes.
pub const OUTDOOR_EYE_SCALE: Fp = 5.0;
pub const MIN_SAMPLED_FOV: Fp = 30.0;
pub const MAX_SAMPLED_FOV: Fp = 60.0;

pub const DISNEY_CUMULATIVE: Fp = 0.90;
pub const GLASS_CUMULATIVE: Fp = 0.95;

/// The one random sequence of a run. Seeded once, never reseeded, and
/// borrowed by every sampling call in turn.
pub struct RandomStream {
    rng: Xoshiro256PlusPlus,
    seed: u64,
}

impl RandomStream {
    pub fn from_seed(seed: u64) -> RandomStream {
        RandomStream {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            seed,
        }
    }

    pub fn from_time() -> RandomStream {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|t| t.as_nanos() as u64)
            .unwrap_or_default();
        RandomStream::from_seed(seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform in [0, 1).
    pub fn unit(&mut self) -> Fp {
        self.rng.gen::<Fp>()
    }

    /// Uniform in [min, max). A degenerate range returns `min`.
    pub fn uniform(&mut self, min: Fp, max: Fp) -> Fp {
        min + self.unit() * (max - min)
    }

    pub fn uniform_vec(&mut self, min: Fp, max: Fp) -> Vec3f {
        Vec3f::new(
            self.uniform(min, max),
            self.uniform(min, max),
            self.uniform(min, max),
        )
    }

    /// Uniform point in the box `center ± half`, axis by axis.
    pub fn uniform_in_box(&mut self, center: &Vec3f, half: &Vec3f) -> Vec3f {
        Vec3f::new(
            self.uniform(center.x - half.x, center.x + half.x),
            self.uniform(center.y - half.y, center.y + half.y),
            self.uniform(center.z - half.z, center.z + half.z),
        )
    }
}

#[derive(Clone, Debug)]
pub struct CameraSample {
    pub camera: CameraParams,
    /// Degrees.
    pub vfov: Fp,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwapScore {
    /// Distance to the nearest face of the box.
    pub distance: Fp,
    pub prob: Fp,
}

/// Distance from `v` to the closest face of `aabb` and the probability
/// weight derived from it: 0 on a face, 0.5 from halfway to the center on.
pub fn swap_score(v: &Vec3f, aabb: &Aabb) -> SwapScore {
    let d1 = v - aabb.min;
    let d2 = aabb.max - v;
    let (i1, i2) = (argmin(&d1), argmin(&d2));
    let (axis, distance) = if d1[i1] < d2[i2] {
        (i1, d1[i1])
    } else {
        (i2, d2[i2])
    };
    let half_width = 0.5 * aabb.extent(axis);
    let x = 2.0 * distance / half_width - 1.0;
    SwapScore {
        distance,
        prob: Fp::min(0.5, x / (1.0 + x * x) + 0.5),
    }
}

/// Decides whether eye and look-at trade places. Always draws exactly one
/// number from the stream.
pub fn should_swap(rng: &mut RandomStream, lookat: &SwapScore, eye: &SwapScore) -> bool {
    let u = rng.unit();
    if lookat.distance > eye.distance {
        u <= lookat.prob
    } else if lookat.distance == eye.distance {
        u <= 0.5
    } else {
        u >= eye.prob
    }
}

pub fn sample_camera(rng: &mut RandomStream, aabb: &Aabb, kind: SceneKind) -> CameraSample {
    let center = aabb.center();
    let half = aabb.half_widths();
    let inner = half * CAMERA_MARGIN;

    let (eye, lookat) = match kind {
        SceneKind::Indoor => {
            log::debug!("indoor camera");
            let mut lookat = rng.uniform_in_box(&center, &inner);
            let mut eye = rng.uniform_in_box(&center, &inner);
            let lookat_score = swap_score(&lookat, aabb);
            let eye_score = swap_score(&eye, aabb);
            if should_swap(rng, &lookat_score, &eye_score) {
                std::mem::swap(&mut eye, &mut lookat);
            }
            (eye, lookat)
        }
        SceneKind::Outdoor => {
            log::debug!("object camera");
            let lookat = rng.uniform_in_box(&center, &inner);
            // the floor usually sits at min.y, so the eye box does not grow downwards
            let eye = Vec3f::new(
                rng.uniform(
                    center.x - OUTDOOR_EYE_SCALE * half.x,
                    center.x + OUTDOOR_EYE_SCALE * half.x,
                ),
                rng.uniform(center.y - half.y, center.y + OUTDOOR_EYE_SCALE * half.y),
                rng.uniform(
                    center.z - OUTDOOR_EYE_SCALE * half.z,
                    center.z + OUTDOOR_EYE_SCALE * half.z,
                ),
            );
            (eye, lookat)
        }
    };

    let up = rng.uniform_vec(-0.5, 0.5);
    let vfov = rng.uniform(MIN_SAMPLED_FOV, MAX_SAMPLED_FOV);
    CameraSample {
        camera: CameraParams { eye, lookat, up },
        vfov,
    }
}

/// Draws a new material. The texture is only kept for Disney materials.
pub fn sample_material(rng: &mut RandomStream, albedo: Option<TextureId>) -> MaterialParameter {
    let what_brdf = rng.unit();
    if what_brdf < DISNEY_CUMULATIVE {
        let color = rng.uniform_vec(0.0, 1.0);
        let params = DisneyParams {
            metallic: rng.uniform(0.0, 1.0),
            subsurface: rng.uniform(0.0, 0.2),
            specular: rng.uniform(0.0, 1.0),
            roughness: rng.uniform(0.0, 0.6),
            specular_tint: rng.uniform(0.0, 0.3),
            sheen: rng.uniform(0.0, 0.2),
            sheen_tint: rng.uniform(0.0, 0.7),
            clearcoat: rng.uniform(0.0, 0.3),
            clearcoat_gloss: rng.uniform(0.0, 1.0),
            ..Default::default()
        };
        MaterialParameter::new(color, Brdf::Disney(params)).with_albedo(albedo)
    } else if what_brdf < GLASS_CUMULATIVE {
        let color = rng.uniform_vec(0.7, 1.0);
        let int_ior = rng.uniform(1.31, 2.419);
        MaterialParameter::new(color, Brdf::Glass).with_ior(int_ior, 1.0)
    } else {
        let color = rng.uniform_vec(0.7, 1.0);
        let roughness = (10.0 as Fp).powf(rng.uniform(-2.0, 0.0));
        let int_ior = rng.uniform(1.31, 2.419);
        MaterialParameter::new(color, Brdf::rough_dielectric(roughness)).with_ior(int_ior, 1.0)
    }
}

/// Replaces every material slot in place, keeping the slot's texture id.
pub fn randomize_materials(rng: &mut RandomStream, materials: &mut [MaterialParameter]) {
    for material in materials.iter_mut() {
        *material = sample_material(rng, material.albedo);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{BrdfKind, Distribution};

    fn room() -> Aabb {
        Aabb::new(Vec3f::new(-2.0, 0.0, -4.0), Vec3f::new(2.0, 3.0, 4.0))
    }

    #[test]
    fn swap_score_is_zero_on_a_face() {
        let score = swap_score(&Vec3f::new(-2.0, 1.5, 0.0), &room());
        assert_eq!(score.distance, 0.0);
        assert_eq!(score.prob, 0.0);
    }

    #[test]
    fn swap_score_is_half_at_the_center() {
        let aabb = Aabb::new(Vec3f::new(-1.0, -1.0, -1.0), Vec3f::new(1.0, 1.0, 1.0));
        let score = swap_score(&Vec3f::zeros(), &aabb);
        assert_eq!(score.distance, 1.0);
        assert_eq!(score.prob, 0.5);
    }

    #[test]
    fn swap_score_uses_the_nearest_face_axis() {
        // 0.5 from the x max face; half width along x is 2
        let score = swap_score(&Vec3f::new(1.5, 1.5, 0.0), &room());
        assert_eq!(score.distance, 0.5);
        let x: Fp = 2.0 * 0.5 / 2.0 - 1.0;
        assert!((score.prob - (x / (1.0 + x * x) + 0.5)).abs() < 1e-6);
    }

    #[test]
    fn swap_follows_the_scores() {
        let mut rng = RandomStream::from_seed(7);
        let wall = SwapScore { distance: 0.0, prob: 0.0 };
        let central = SwapScore { distance: 1.0, prob: 0.0 };
        for _ in 0..1000 {
            // eye farther from the walls with prob 0: always swapped
            assert!(should_swap(&mut rng, &wall, &central));
        }
        let mut swaps = 0;
        for _ in 0..1000 {
            // look-at farther with prob 0: practically never swapped
            if should_swap(&mut rng, &central, &wall) {
                swaps += 1;
            }
        }
        assert!(swaps <= 1);
    }

    #[test]
    fn swap_frequencies_match_the_probabilities() {
        let mut rng = RandomStream::from_seed(11);
        let n = 100_000;
        let mut rate = |lookat: SwapScore, eye: SwapScore| {
            let swaps = (0..n).filter(|_| should_swap(&mut rng, &lookat, &eye)).count();
            swaps as f64 / n as f64
        };
        let near = |prob| SwapScore { distance: 0.5, prob };
        let far = |prob| SwapScore { distance: 2.0, prob };

        // equal distances: a fair coin whatever the weights
        assert!((rate(near(0.1), near(0.4)) - 0.5).abs() < 0.01);
        // eye farther: swapped unless u falls below prob_eye
        assert!((rate(near(0.1), far(0.3)) - 0.7).abs() < 0.01);
        // look-at farther: swapped with prob_lookat
        assert!((rate(far(0.3), near(0.1)) - 0.3).abs() < 0.01);
    }

    #[test]
    fn indoor_camera_stays_inside_the_margin() {
        let mut rng = RandomStream::from_seed(1);
        let aabb = room();
        let center = aabb.center();
        let inner = aabb.half_widths() * CAMERA_MARGIN;
        for _ in 0..2000 {
            let sample = sample_camera(&mut rng, &aabb, SceneKind::Indoor);
            for p in [sample.camera.eye, sample.camera.lookat] {
                for axis in 0..3 {
                    assert!((p[axis] - center[axis]).abs() <= inner[axis] + 1e-5);
                }
            }
            for axis in 0..3 {
                assert!(sample.camera.up[axis].abs() <= 0.5);
            }
            assert!((MIN_SAMPLED_FOV..=MAX_SAMPLED_FOV).contains(&sample.vfov));
        }
    }

    #[test]
    fn outdoor_eye_never_goes_below_the_box() {
        let mut rng = RandomStream::from_seed(2);
        let aabb = room();
        let center = aabb.center();
        let half = aabb.half_widths();
        let mut farthest: Fp = 0.0;
        for _ in 0..2000 {
            let sample = sample_camera(&mut rng, &aabb, SceneKind::Outdoor);
            let eye = sample.camera.eye;
            assert!(eye.y >= aabb.min.y - 1e-5);
            assert!(eye.y <= center.y + OUTDOOR_EYE_SCALE * half.y + 1e-5);
            assert!((eye.x - center.x).abs() <= OUTDOOR_EYE_SCALE * half.x + 1e-5);
            farthest = farthest.max((eye.x - center.x).abs());
        }
        // the eye box is much larger than the scene
        assert!(farthest > 2.0 * half.x);
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = RandomStream::from_seed(99);
        let mut b = RandomStream::from_seed(99);
        let sa = sample_camera(&mut a, &room(), SceneKind::Indoor);
        let sb = sample_camera(&mut b, &room(), SceneKind::Indoor);
        assert_eq!(sa.camera, sb.camera);
        assert_eq!(sa.vfov, sb.vfov);
    }

    #[test]
    fn material_categories_follow_the_distribution() {
        let mut rng = RandomStream::from_seed(12345);
        let n = 100_000;
        let (mut disney, mut glass, mut rough) = (0, 0, 0);
        for _ in 0..n {
            let m = sample_material(&mut rng, Some(TextureId(3)));
            assert_eq!(m.dist, Distribution::Ggx);
            match m.brdf {
                Brdf::Disney(p) => {
                    disney += 1;
                    assert!((0.0..=0.6).contains(&p.roughness));
                    assert_eq!(m.albedo, Some(TextureId(3)));
                }
                Brdf::Glass => {
                    glass += 1;
                    assert_eq!(m.albedo, None);
                    assert!((1.31..=2.419).contains(&m.int_ior));
                    assert_eq!(m.ext_ior, 1.0);
                }
                Brdf::RoughDielectric { roughness } => {
                    rough += 1;
                    assert!((0.01..=1.0).contains(&roughness));
                    assert_eq!(m.albedo, None);
                }
                Brdf::Lambert => panic!("lambert is never sampled"),
            }
        }
        let freq = |count: i32| count as f64 / n as f64;
        assert!((freq(disney) - 0.90).abs() < 0.005);
        assert!((freq(glass) - 0.05).abs() < 0.005);
        assert!((freq(rough) - 0.05).abs() < 0.005);
    }

    #[test]
    fn randomize_keeps_slot_count_and_textures() {
        let mut rng = RandomStream::from_seed(5);
        let mut materials = vec![
            MaterialParameter::default().with_albedo(Some(TextureId(0))),
            MaterialParameter::default(),
        ];
        randomize_materials(&mut rng, &mut materials);
        assert_eq!(materials.len(), 2);
        if materials[0].kind() == BrdfKind::Disney {
            assert_eq!(materials[0].albedo, Some(TextureId(0)));
        }
        assert_eq!(materials[1].albedo, None);
    }
}
