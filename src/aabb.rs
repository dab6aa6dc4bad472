use std::fs;
use std::path::{Path, PathBuf};

use crate::geometry::{transform_point, Fp, Mat4f, Vec3f, FP_INF, FP_NEG_INF};

#[derive(Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3f,
    pub max: Vec3f,
}

impl Default for Aabb {
    fn default() -> Self {
        Aabb {
            min: Vec3f::new(FP_INF, FP_INF, FP_INF),
            max: Vec3f::new(FP_NEG_INF, FP_NEG_INF, FP_NEG_INF),
        }
    }
}

impl Aabb {
    pub fn new(min: Vec3f, max: Vec3f) -> Aabb {
        Aabb { min, max }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }

    pub fn include(&mut self, point: &Vec3f) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    pub fn include_aabb(&mut self, aabb: &Aabb) {
        if aabb.is_empty() {
            return;
        }
        self.min = self.min.inf(&aabb.min);
        self.max = self.max.sup(&aabb.max);
    }

    pub fn center(&self) -> Vec3f {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self, axis: usize) -> Fp {
        self.max[axis] - self.min[axis]
    }

    pub fn half_widths(&self) -> Vec3f {
        (self.max - self.min) * 0.5
    }

    /// Bounds of the eight corners after transformation.
    pub fn transform(&self, m: &Mat4f) -> Aabb {
        let mut result = Aabb::default();
        if self.is_empty() {
            return result;
        }
        for corner in 0..8 {
            let pick = |axis: usize| {
                if corner & (1 << axis) == 0 {
                    self.min[axis]
                } else {
                    self.max[axis]
                }
            };
            result.include(&transform_point(m, &Vec3f::new(pick(0), pick(1), pick(2))));
        }
        result
    }
}

/// Camera strategy switch carried by the side-car file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneKind {
    Indoor,
    Outdoor,
}

#[derive(Clone, Debug)]
pub struct SidecarBounds {
    pub aabb: Aabb,
    pub kind: SceneKind,
}

/// `aabb.txt` next to the scene file.
pub fn sidecar_path(scene_file: &Path) -> PathBuf {
    scene_file.with_file_name("aabb.txt")
}

impl SidecarBounds {
    /// Reads the side-car file. Bounds not listed in it keep the values of
    /// `fallback`. Returns `None` if the file cannot be read.
    pub fn load(path: &Path, fallback: &Aabb) -> Option<SidecarBounds> {
        let content = fs::read_to_string(path).ok()?;
        Some(SidecarBounds::parse(&content, fallback))
    }

    pub fn parse(content: &str, fallback: &Aabb) -> SidecarBounds {
        let mut aabb = fallback.clone();
        let mut kind_tag = "None";
        for line in content.lines() {
            let mut tokens = line.split_whitespace();
            let (Some(key), Some(value)) = (tokens.next(), tokens.next()) else {
                continue;
            };
            if key == "type" {
                kind_tag = value;
                continue;
            }
            let Ok(value) = value.parse::<Fp>() else {
                continue;
            };
            match key {
                "xmin" => aabb.min.x = value,
                "xmax" => aabb.max.x = value,
                "ymin" => aabb.min.y = value,
                "ymax" => aabb.max.y = value,
                "zmin" => aabb.min.z = value,
                "zmax" => aabb.max.z = value,
                _ => {}
            }
        }
        let kind = if kind_tag == "indoor" {
            SceneKind::Indoor
        } else {
            SceneKind::Outdoor
        };
        SidecarBounds { aabb, kind }
    }
}

/// Side-car bounds if present, otherwise the geometry bounds with the indoor
/// strategy.
pub fn resolve_bounds(scene_file: &Path, geometry: &Aabb) -> SidecarBounds {
    let path = sidecar_path(scene_file);
    match SidecarBounds::load(&path, geometry) {
        Some(bounds) => {
            log::info!("using predefined {}", path.display());
            bounds
        }
        None => {
            log::info!("no predefined aabb.txt, using geometry bounds");
            SidecarBounds {
                aabb: geometry.clone(),
                kind: SceneKind::Indoor,
            }
        }
    }
}
