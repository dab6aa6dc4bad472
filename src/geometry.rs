use nalgebra::{Matrix4, Vector3, Vector4};

/// Scalar type shared with the device side, which works in 32-bit floats.
pub type Fp = f32;
pub type Vec3f = Vector3<Fp>;
pub type Vec4f = Vector4<Fp>;
pub type Mat4f = Matrix4<Fp>;

pub static EPS: Fp = 0.00001;
pub static FP_INF: Fp = Fp::INFINITY;
pub static FP_NEG_INF: Fp = Fp::NEG_INFINITY;

#[derive(Clone, Debug)]
pub struct Ray {
    pub origin: Vec3f,
    pub direction: Vec3f,
}

/// Index of the smallest component. Ties resolve to the lowest axis.
pub fn argmin(v: &Vec3f) -> usize {
    if v.x <= v.y && v.x <= v.z {
        0
    } else if v.y <= v.x && v.y <= v.z {
        1
    } else {
        2
    }
}

/// Builds a matrix from 16 row-major values, the layout used by scene files.
pub fn mat4_from_row_major(data: &[Fp; 16]) -> Mat4f {
    Mat4f::from_row_slice(data)
}

pub fn transform_point(m: &Mat4f, p: &Vec3f) -> Vec3f {
    let h = m * Vec4f::new(p.x, p.y, p.z, 1.0);
    if h.w.abs() > EPS {
        Vec3f::new(h.x / h.w, h.y / h.w, h.z / h.w)
    } else {
        Vec3f::new(h.x, h.y, h.z)
    }
}

pub fn clamp01(x: Fp) -> Fp {
    x.clamp(0.0, 1.0)
}

pub fn clamp01_vec(v: Vec3f) -> Vec3f {
    v.map(clamp01)
}
