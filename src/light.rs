use std::f32::consts::PI;

use crate::aabb::Aabb;
use crate::geometry::{Fp, Vec3f};

#[derive(Clone, Debug, PartialEq)]
pub enum LightParameter {
    /// Image-based distant light. Ids are handed out by the rendering
    /// back-end when it loads the environment map.
    Envmap {
        texture_id: i32,
        cdf_u: i32,
        cdf_v: i32,
        integral: Fp,
    },
    /// Built with [`LightParameter::sphere`], which fills in `area`.
    Sphere {
        position: Vec3f,
        radius: Fp,
        emission: Vec3f,
        area: Fp,
    },
    /// `position` is the anchor corner, `u` and `v` the two edges leaving it.
    /// Built with [`LightParameter::quad_from_corners`], which fills in
    /// `area` and `normal`.
    Quad {
        position: Vec3f,
        u: Vec3f,
        v: Vec3f,
        emission: Vec3f,
        area: Fp,
        normal: Vec3f,
    },
}

impl LightParameter {
    pub fn sphere(position: Vec3f, radius: Fp, emission: Vec3f) -> LightParameter {
        LightParameter::Sphere {
            position,
            radius,
            emission,
            area: 4.0 * PI * radius * radius,
        }
    }

    /// Quad spanned by the anchor and the two adjacent corners `v1`, `v2`.
    /// A degenerate quad gets a zero normal.
    pub fn quad_from_corners(
        position: Vec3f,
        v1: Vec3f,
        v2: Vec3f,
        emission: Vec3f,
    ) -> LightParameter {
        let (u, v) = (v1 - position, v2 - position);
        let cross = u.cross(&v);
        LightParameter::Quad {
            position,
            u,
            v,
            emission,
            area: cross.norm(),
            normal: cross.try_normalize(0.0).unwrap_or_else(Vec3f::zeros),
        }
    }

    pub fn area(&self) -> Fp {
        match self {
            LightParameter::Envmap { .. } => 4.0 * PI,
            LightParameter::Sphere { area, .. } | LightParameter::Quad { area, .. } => *area,
        }
    }

    pub fn normal(&self) -> Vec3f {
        match self {
            LightParameter::Quad { normal, .. } => *normal,
            _ => Vec3f::zeros(),
        }
    }

    pub fn is_envmap(&self) -> bool {
        matches!(self, LightParameter::Envmap { .. })
    }

    pub fn to_gpu(&self) -> GpuLight {
        let mut gpu = GpuLight {
            light_type: 0,
            position: [0.0; 3],
            u: [0.0; 3],
            v: [0.0; 3],
            normal: self.normal().into(),
            area: self.area(),
            radius: 0.0,
            emission: [0.0; 3],
            id_environment_texture: -1,
            id_environment_cdf_u: -1,
            id_environment_cdf_v: -1,
            environment_integral: 0.0,
            unused: [0.0; 2],
        };
        match self {
            LightParameter::Envmap {
                texture_id,
                cdf_u,
                cdf_v,
                integral,
            } => {
                gpu.light_type = 0;
                gpu.id_environment_texture = *texture_id;
                gpu.id_environment_cdf_u = *cdf_u;
                gpu.id_environment_cdf_v = *cdf_v;
                gpu.environment_integral = *integral;
            }
            LightParameter::Sphere {
                position,
                radius,
                emission,
                ..
            } => {
                gpu.light_type = 1;
                gpu.position = (*position).into();
                gpu.radius = *radius;
                gpu.emission = (*emission).into();
            }
            LightParameter::Quad {
                position,
                u,
                v,
                emission,
                ..
            } => {
                gpu.light_type = 2;
                gpu.position = (*position).into();
                gpu.u = (*u).into();
                gpu.v = (*v).into();
                gpu.emission = (*emission).into();
            }
        }
        gpu
    }
}

/// Flat record uploaded to the light parameter buffer, padded to float4.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuLight {
    pub light_type: i32,
    pub position: [f32; 3],
    pub u: [f32; 3],
    pub v: [f32; 3],
    pub normal: [f32; 3],
    pub area: f32,
    pub radius: f32,
    pub emission: [f32; 3],
    pub id_environment_texture: i32,
    pub id_environment_cdf_u: i32,
    pub id_environment_cdf_v: i32,
    pub environment_integral: f32,
    pub unused: [f32; 2],
}

/// Debug lights marking the eight corners of the scene bounds.
pub fn corner_lights(aabb: &Aabb) -> Vec<LightParameter> {
    let center = aabb.center();
    let half = aabb.half_widths();
    let mut lights = Vec::with_capacity(8);
    for i in [-1.0, 1.0] {
        for j in [-1.0, 1.0] {
            for k in [-1.0, 1.0] {
                lights.push(LightParameter::sphere(
                    center + Vec3f::new(i * half.x, j * half.y, k * half.z),
                    0.1,
                    Vec3f::repeat(10000.0),
                ));
            }
        }
    }
    lights
}
