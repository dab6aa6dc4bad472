use crate::aabb::Aabb;
use crate::geometry::{Fp, Vec3f};

pub const MIN_WIDTH: i32 = 16;
pub const MAX_WIDTH: i32 = 1920;
pub const MIN_HEIGHT: i32 = 16;
pub const MAX_HEIGHT: i32 = 1080;
pub const MIN_FOV: Fp = 1.0;
pub const MIN_DEPTH: u32 = 1;
pub const MAX_DEPTH: u32 = 32;

#[derive(Clone, Debug, PartialEq)]
pub struct Properties {
    pub width: u32,
    pub height: u32,
    /// Vertical field of view in degrees.
    pub vfov: Fp,
    pub max_depth: u32,
    /// `None` means "derive from geometry".
    pub camera_eye: Option<Vec3f>,
    pub camera_lookat: Option<Vec3f>,
    pub camera_up: Option<Vec3f>,
    /// Recorded only; the back-end loads the image.
    pub envmap: Option<String>,
}

impl Default for Properties {
    fn default() -> Self {
        Properties {
            width: 1280,
            height: 720,
            vfov: 35.0,
            max_depth: 3,
            camera_eye: None,
            camera_lookat: None,
            camera_up: None,
            envmap: None,
        }
    }
}

impl Properties {
    pub fn set_width(&mut self, width: i32) {
        self.width = width.clamp(MIN_WIDTH, MAX_WIDTH) as u32;
    }

    pub fn set_height(&mut self, height: i32) {
        self.height = height.clamp(MIN_HEIGHT, MAX_HEIGHT) as u32;
    }

    pub fn set_vfov(&mut self, vfov: Fp) {
        self.vfov = vfov.max(MIN_FOV);
    }

    pub fn set_max_depth(&mut self, max_depth: i64) {
        self.max_depth = max_depth.clamp(MIN_DEPTH as i64, MAX_DEPTH as i64) as u32;
    }

    /// Camera from the scene file, with unspecified parts derived from the
    /// geometry bounds.
    pub fn initial_camera(&self, aabb: &Aabb) -> CameraParams {
        CameraParams {
            eye: self
                .camera_eye
                .unwrap_or_else(|| Vec3f::new(0.0, 1.5 * aabb.extent(1), 1.5 * aabb.extent(2))),
            lookat: self.camera_lookat.unwrap_or_else(|| aabb.center()),
            up: self.camera_up.unwrap_or_else(|| Vec3f::new(0.0, 1.0, 0.0)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CameraParams {
    pub eye: Vec3f,
    pub lookat: Vec3f,
    pub up: Vec3f,
}

/// Orthonormal-ish pinhole frame: `w` points at the target scaled to unit
/// length, `u`/`v` span the image plane scaled by the field of view.
#[derive(Clone, Debug)]
pub struct CameraFrame {
    pub eye: Vec3f,
    pub u: Vec3f,
    pub v: Vec3f,
    pub w: Vec3f,
}

impl CameraParams {
    pub fn frame(&self, vfov: Fp, width: u32, height: u32) -> CameraFrame {
        let w = (self.lookat - self.eye).try_normalize(0.0).unwrap_or_else(|| -Vec3f::z());
        let up = self.up.try_normalize(0.0).unwrap_or_else(Vec3f::y);
        let u = w.cross(&up).try_normalize(0.0).unwrap_or_else(Vec3f::x);
        let v = u.cross(&w);
        let aspect = width as Fp / height as Fp;
        let v_len = (vfov.to_radians() * 0.5).tan();
        let u_len = v_len * aspect;
        CameraFrame {
            eye: self.eye,
            u: u * u_len,
            v: v * v_len,
            w,
        }
    }
}
