use bytemuck::{Pod, Zeroable};

use crate::geometry::{clamp01, clamp01_vec, Fp, Vec3f};

/// Smallest roughness a GGX lobe of the Disney BRDF stays stable at.
pub const DISNEY_MIN_ROUGHNESS: Fp = 0.004;
/// Smallest roughness for the rough dielectric lobe.
pub const ROUGH_DIELECTRIC_MIN_ROUGHNESS: Fp = 0.023;

pub const DEFAULT_INT_IOR: Fp = 1.5046;
pub const DEFAULT_EXT_IOR: Fp = 1.000277;

/// Index into `Scene::textures`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrdfKind {
    Disney,
    Glass,
    Lambert,
    RoughDielectric,
}

impl BrdfKind {
    /// Unrecognized names fall back to Disney.
    pub fn from_name(name: &str) -> BrdfKind {
        match name {
            "DISNEY" | "0" => BrdfKind::Disney,
            "GLASS" | "1" => BrdfKind::Glass,
            "LAMBERT" | "2" => BrdfKind::Lambert,
            "ROUGHDIELECTRIC" | "3" => BrdfKind::RoughDielectric,
            _ => BrdfKind::Disney,
        }
    }

    pub fn tag(self) -> i32 {
        match self {
            BrdfKind::Disney => 0,
            BrdfKind::Glass => 1,
            BrdfKind::Lambert => 2,
            BrdfKind::RoughDielectric => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Distribution {
    Beckmann,
    #[default]
    Ggx,
    Phong,
}

impl Distribution {
    /// Unrecognized names fall back to GGX.
    pub fn from_name(name: &str) -> Distribution {
        match name {
            "Beckmann" | "beckmann" | "0" => Distribution::Beckmann,
            "GGX" | "ggx" | "1" => Distribution::Ggx,
            "Phong" | "phong" | "2" => Distribution::Phong,
            _ => Distribution::Ggx,
        }
    }

    pub fn tag(self) -> i32 {
        match self {
            Distribution::Beckmann => 0,
            Distribution::Ggx => 1,
            Distribution::Phong => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisneyParams {
    pub metallic: Fp,
    pub subsurface: Fp,
    pub specular: Fp,
    pub specular_tint: Fp,
    pub roughness: Fp,
    pub anisotropic: Fp,
    pub sheen: Fp,
    pub sheen_tint: Fp,
    pub clearcoat: Fp,
    pub clearcoat_gloss: Fp,
}

impl Default for DisneyParams {
    fn default() -> Self {
        DisneyParams {
            metallic: 0.0,
            subsurface: 0.0,
            specular: 0.5,
            specular_tint: 0.0,
            roughness: 0.5,
            anisotropic: 0.0,
            sheen: 0.0,
            sheen_tint: 0.5,
            clearcoat: 0.0,
            clearcoat_gloss: 1.0,
        }
    }
}

impl DisneyParams {
    /// Clamps every lobe weight to [0, 1] and applies the roughness floor.
    pub fn clamped(self) -> DisneyParams {
        DisneyParams {
            metallic: clamp01(self.metallic),
            subsurface: clamp01(self.subsurface),
            specular: clamp01(self.specular),
            specular_tint: clamp01(self.specular_tint),
            roughness: floor_roughness(
                clamp01(self.roughness),
                DISNEY_MIN_ROUGHNESS,
                BrdfKind::Disney,
            ),
            anisotropic: clamp01(self.anisotropic),
            sheen: clamp01(self.sheen),
            sheen_tint: clamp01(self.sheen_tint),
            clearcoat: clamp01(self.clearcoat),
            clearcoat_gloss: clamp01(self.clearcoat_gloss),
        }
    }
}

fn floor_roughness(roughness: Fp, floor: Fp, kind: BrdfKind) -> Fp {
    if roughness < floor {
        log::debug!(
            "cannot create a {:?} microfacet lobe with roughness {} < {}, clamped",
            kind,
            roughness,
            floor
        );
        floor
    } else {
        roughness
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Brdf {
    Disney(DisneyParams),
    Glass,
    Lambert,
    RoughDielectric { roughness: Fp },
}

impl Brdf {
    pub fn kind(&self) -> BrdfKind {
        match self {
            Brdf::Disney(_) => BrdfKind::Disney,
            Brdf::Glass => BrdfKind::Glass,
            Brdf::Lambert => BrdfKind::Lambert,
            Brdf::RoughDielectric { .. } => BrdfKind::RoughDielectric,
        }
    }

    pub fn rough_dielectric(roughness: Fp) -> Brdf {
        Brdf::RoughDielectric {
            roughness: floor_roughness(
                clamp01(roughness),
                ROUGH_DIELECTRIC_MIN_ROUGHNESS,
                BrdfKind::RoughDielectric,
            ),
        }
    }

    /// Roughness seen by the device, whichever lobe carries it.
    pub fn roughness(&self) -> Fp {
        match self {
            Brdf::Disney(p) => p.roughness,
            Brdf::RoughDielectric { roughness } => *roughness,
            Brdf::Glass | Brdf::Lambert => DisneyParams::default().roughness,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialParameter {
    pub color: Vec3f,
    pub emission: Vec3f,
    pub int_ior: Fp,
    pub ext_ior: Fp,
    pub dist: Distribution,
    pub albedo: Option<TextureId>,
    pub brdf: Brdf,
}

impl Default for MaterialParameter {
    fn default() -> Self {
        MaterialParameter {
            color: Vec3f::new(1.0, 1.0, 1.0),
            emission: Vec3f::zeros(),
            int_ior: DEFAULT_INT_IOR,
            ext_ior: DEFAULT_EXT_IOR,
            dist: Distribution::Ggx,
            albedo: None,
            brdf: Brdf::Disney(DisneyParams::default()),
        }
    }
}

impl MaterialParameter {
    pub fn new(color: Vec3f, brdf: Brdf) -> MaterialParameter {
        MaterialParameter {
            color: clamp01_vec(color),
            brdf: match brdf {
                Brdf::Disney(params) => Brdf::Disney(params.clamped()),
                Brdf::RoughDielectric { roughness } => Brdf::rough_dielectric(roughness),
                other => other,
            },
            ..Default::default()
        }
    }

    pub fn with_ior(mut self, int_ior: Fp, ext_ior: Fp) -> MaterialParameter {
        self.int_ior = int_ior;
        self.ext_ior = ext_ior;
        self
    }

    pub fn with_albedo(mut self, albedo: Option<TextureId>) -> MaterialParameter {
        self.albedo = albedo;
        self
    }

    pub fn kind(&self) -> BrdfKind {
        self.brdf.kind()
    }

    pub fn to_gpu(&self) -> GpuMaterial {
        let disney = match self.brdf {
            Brdf::Disney(params) => params,
            _ => DisneyParams::default(),
        };
        GpuMaterial {
            albedo_id: self.albedo.map_or(-1, |id| id.0 as i32),
            color: self.color.into(),
            emission: self.emission.into(),
            metallic: disney.metallic,
            subsurface: disney.subsurface,
            specular: disney.specular,
            roughness: self.brdf.roughness(),
            specular_tint: disney.specular_tint,
            anisotropic: disney.anisotropic,
            sheen: disney.sheen,
            sheen_tint: disney.sheen_tint,
            clearcoat: disney.clearcoat,
            clearcoat_gloss: disney.clearcoat_gloss,
            brdf: self.kind().tag(),
            dist: self.dist.tag(),
            int_ior: self.int_ior,
            ext_ior: self.ext_ior,
        }
    }
}

/// Flat record uploaded to the material parameter buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuMaterial {
    pub albedo_id: i32,
    pub color: [f32; 3],
    pub emission: [f32; 3],
    pub metallic: f32,
    pub subsurface: f32,
    pub specular: f32,
    pub roughness: f32,
    pub specular_tint: f32,
    pub anisotropic: f32,
    pub sheen: f32,
    pub sheen_tint: f32,
    pub clearcoat: f32,
    pub clearcoat_gloss: f32,
    pub brdf: i32,
    pub dist: i32,
    pub int_ior: f32,
    pub ext_ior: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disney_roughness_is_floored() {
        let m = MaterialParameter::new(
            Vec3f::new(1.0, 1.0, 1.0),
            Brdf::Disney(DisneyParams {
                roughness: 0.001,
                ..Default::default()
            }),
        );
        assert_eq!(m.brdf.roughness(), DISNEY_MIN_ROUGHNESS);
    }

    #[test]
    fn rough_dielectric_roughness_is_floored() {
        let m = MaterialParameter::new(Vec3f::new(1.0, 1.0, 1.0), Brdf::rough_dielectric(0.001));
        assert_eq!(m.brdf.roughness(), ROUGH_DIELECTRIC_MIN_ROUGHNESS);
    }

    #[test]
    fn normalized_fields_are_clamped() {
        let m = MaterialParameter::new(
            Vec3f::new(2.0, -1.0, 0.5),
            Brdf::Disney(DisneyParams {
                metallic: 3.0,
                sheen: -0.2,
                roughness: 7.0,
                ..Default::default()
            }),
        );
        assert_eq!(m.color, Vec3f::new(1.0, 0.0, 0.5));
        let Brdf::Disney(p) = m.brdf else {
            panic!("expected disney");
        };
        assert_eq!(p.metallic, 1.0);
        assert_eq!(p.sheen, 0.0);
        assert_eq!(p.roughness, 1.0);
    }

    #[test]
    fn unknown_names_use_defaults() {
        assert_eq!(BrdfKind::from_name("METAL"), BrdfKind::Disney);
        assert_eq!(BrdfKind::from_name("3"), BrdfKind::RoughDielectric);
        assert_eq!(Distribution::from_name("beckmann"), Distribution::Beckmann);
        assert_eq!(Distribution::from_name("whatever"), Distribution::Ggx);
    }

    #[test]
    fn gpu_record_carries_tags_and_texture_id() {
        let gpu = MaterialParameter::new(Vec3f::new(0.7, 0.8, 0.9), Brdf::Glass)
            .with_albedo(Some(TextureId(2)))
            .to_gpu();
        assert_eq!(gpu.brdf, 1);
        assert_eq!(gpu.dist, 1);
        assert_eq!(gpu.albedo_id, 2);
        assert_eq!(MaterialParameter::default().to_gpu().albedo_id, -1);
        assert_eq!(std::mem::size_of::<GpuMaterial>(), 21 * 4);
    }
}
