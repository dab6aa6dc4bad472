//! Scene file loader.
//!
//! The format is line oriented. Top-level lines open blocks which run until
//! the next line containing `}`:
//!
//! - `material <name> {` - one material, referenced by meshes through its name
//! - any line containing `light` - a sphere or quad light
//! - any line containing `properties` - film and camera settings
//! - any line containing `mesh` - a mesh file, its transform and its material
//!
//! Inside a block every line is `key value...`. Unknown keys and lines whose
//! values do not parse are skipped, so fields keep their defaults. Lines
//! starting with `#` are comments.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::geometry::{mat4_from_row_major, Fp, Mat4f, Vec3f};
use crate::light::LightParameter;
use crate::material::{
    Brdf, BrdfKind, DisneyParams, Distribution, MaterialParameter, TextureId, DEFAULT_EXT_IOR,
    DEFAULT_INT_IOR,
};
use crate::properties::Properties;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("couldn't open {path} for reading: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("mesh {mesh} references unknown material '{name}'")]
    UnknownMaterial { mesh: usize, name: String },

    #[error("mesh {mesh} has no material")]
    MissingMaterial { mesh: usize },

    #[error("mesh {mesh} has no file")]
    MissingMeshFile { mesh: usize },
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub path: PathBuf,
    pub transform: Mat4f,
}

#[derive(Clone, Debug)]
pub struct Scene {
    pub dir: PathBuf,
    pub meshes: Vec<Mesh>,
    /// One entry per mesh, same order, uploaded as one contiguous buffer.
    pub materials: Vec<MaterialParameter>,
    pub lights: Vec<LightParameter>,
    /// Texture file names in id order.
    pub textures: Vec<String>,
    pub texture_ids: HashMap<String, TextureId>,
    pub properties: Properties,
}

impl Scene {
    pub fn from_file(path: &Path) -> Result<Scene, SceneError> {
        let content = fs::read_to_string(path).map_err(|source| SceneError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        parse_file_content(&content, &dir)
    }

    pub fn texture_path(&self, id: TextureId) -> Option<PathBuf> {
        self.textures.get(id.0 as usize).map(|name| self.dir.join(name))
    }

    /// Installs the environment light at index 0, replacing a previous one.
    pub fn set_environment_light(&mut self, light: LightParameter) {
        debug_assert!(light.is_envmap());
        if self.lights.first().is_some_and(LightParameter::is_envmap) {
            self.lights[0] = light;
        } else {
            self.lights.insert(0, light);
        }
    }
}

fn unquote(token: &str) -> &str {
    token.trim_matches('"')
}

fn parse_scalar(values: &[&str]) -> Option<Fp> {
    values.first()?.parse().ok()
}

fn parse_int(values: &[&str]) -> Option<i64> {
    let token = values.first()?;
    token
        .parse::<i64>()
        .ok()
        .or_else(|| token.parse::<Fp>().ok().map(|x| x as i64))
}

fn parse_floats<const N: usize>(values: &[&str]) -> Option<[Fp; N]> {
    if values.len() < N {
        return None;
    }
    let mut result = [0.0; N];
    for (slot, token) in result.iter_mut().zip(values) {
        *slot = token.parse().ok()?;
    }
    Some(result)
}

fn parse_vector(values: &[&str]) -> Option<Vec3f> {
    parse_floats::<3>(values).map(Vec3f::from)
}

fn parse_word<'a>(values: &[&'a str]) -> Option<&'a str> {
    values.first().map(|token| unquote(token))
}

/// Splits a block line into its key and value tokens.
fn key_values(line: &str) -> Option<(&str, Vec<&str>)> {
    let mut tokens = line.split_whitespace();
    let key = tokens.next()?;
    Some((key, tokens.collect()))
}

/// Consumes lines up to and including the closing `}`.
fn take_block<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut body = vec![];
    for line in lines.by_ref() {
        if line.contains('}') {
            break;
        }
        if line.trim_start().starts_with('#') {
            continue;
        }
        body.push(line);
    }
    body
}

struct MaterialBlock {
    name: String,
    color: Vec3f,
    emission: Vec3f,
    disney: DisneyParams,
    brdf: BrdfKind,
    dist: Distribution,
    int_ior: Fp,
    ext_ior: Fp,
    texture: Option<String>,
}

impl MaterialBlock {
    fn new(name: &str) -> MaterialBlock {
        MaterialBlock {
            name: name.to_string(),
            color: Vec3f::new(1.0, 1.0, 1.0),
            emission: Vec3f::zeros(),
            disney: DisneyParams::default(),
            brdf: BrdfKind::Disney,
            dist: Distribution::Ggx,
            int_ior: DEFAULT_INT_IOR,
            ext_ior: DEFAULT_EXT_IOR,
            texture: None,
        }
    }

    fn apply(&mut self, key: &str, values: &[&str]) {
        let d = &mut self.disney;
        match key {
            "name" => {
                if let Some(name) = parse_word(values) {
                    self.name = name.to_string();
                }
            }
            "color" => self.color = parse_vector(values).unwrap_or(self.color),
            "emission" => self.emission = parse_vector(values).unwrap_or(self.emission),
            "albedoTex" => {
                if let Some(name) = parse_word(values) {
                    self.texture = Some(name.to_string());
                }
            }
            "metallic" => d.metallic = parse_scalar(values).unwrap_or(d.metallic),
            "subsurface" => d.subsurface = parse_scalar(values).unwrap_or(d.subsurface),
            "specular" => d.specular = parse_scalar(values).unwrap_or(d.specular),
            "specularTint" => d.specular_tint = parse_scalar(values).unwrap_or(d.specular_tint),
            "roughness" => d.roughness = parse_scalar(values).unwrap_or(d.roughness),
            "anisotropic" => d.anisotropic = parse_scalar(values).unwrap_or(d.anisotropic),
            "sheen" => d.sheen = parse_scalar(values).unwrap_or(d.sheen),
            "sheenTint" => d.sheen_tint = parse_scalar(values).unwrap_or(d.sheen_tint),
            "clearcoat" => d.clearcoat = parse_scalar(values).unwrap_or(d.clearcoat),
            "clearcoatGloss" => {
                d.clearcoat_gloss = parse_scalar(values).unwrap_or(d.clearcoat_gloss)
            }
            "brdf" => {
                if let Some(name) = parse_word(values) {
                    self.brdf = BrdfKind::from_name(name);
                }
            }
            "dist" => {
                if let Some(name) = parse_word(values) {
                    self.dist = Distribution::from_name(name);
                }
            }
            "intIOR" => self.int_ior = parse_scalar(values).unwrap_or(self.int_ior),
            "extIOR" => self.ext_ior = parse_scalar(values).unwrap_or(self.ext_ior),
            _ => {
                // ignore unknown key
            }
        }
    }

    fn build(self, albedo: Option<TextureId>) -> MaterialParameter {
        let brdf = match self.brdf {
            BrdfKind::Disney => Brdf::Disney(self.disney),
            BrdfKind::Glass => Brdf::Glass,
            BrdfKind::Lambert => Brdf::Lambert,
            BrdfKind::RoughDielectric => Brdf::RoughDielectric {
                roughness: self.disney.roughness,
            },
        };
        let mut material = MaterialParameter::new(self.color, brdf)
            .with_ior(self.int_ior, self.ext_ior)
            .with_albedo(albedo);
        material.emission = self.emission;
        material.dist = self.dist;
        material
    }
}

fn parse_light_block(body: &[&str]) -> Option<LightParameter> {
    let mut position = Vec3f::zeros();
    let mut emission = Vec3f::zeros();
    let mut radius: Fp = 0.0;
    let mut v1 = Vec3f::zeros();
    let mut v2 = Vec3f::zeros();
    let mut light_type = "None";
    for line in body {
        let Some((key, values)) = key_values(line) else {
            continue;
        };
        match key {
            "position" => position = parse_vector(&values).unwrap_or(position),
            "emission" => emission = parse_vector(&values).unwrap_or(emission),
            "radius" => radius = parse_scalar(&values).unwrap_or(radius),
            "v1" => v1 = parse_vector(&values).unwrap_or(v1),
            "v2" => v2 = parse_vector(&values).unwrap_or(v2),
            "type" => light_type = parse_word(&values).unwrap_or(light_type),
            _ => {}
        }
    }
    match light_type {
        "Sphere" | "0" => Some(LightParameter::sphere(position, radius, emission)),
        "Quad" | "1" => Some(LightParameter::quad_from_corners(position, v1, v2, emission)),
        other => {
            log::warn!("skipping light block with unsupported type '{}'", other);
            None
        }
    }
}

fn parse_properties_block(body: &[&str]) -> Properties {
    let mut properties = Properties::default();
    for line in body {
        let Some((key, values)) = key_values(line) else {
            continue;
        };
        match key {
            "width" => {
                if let Some(width) = parse_int(&values) {
                    properties.set_width(width.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
                }
            }
            "height" => {
                if let Some(height) = parse_int(&values) {
                    properties.set_height(height.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
                }
            }
            "fov" => {
                if let Some(fov) = parse_scalar(&values) {
                    properties.set_vfov(fov);
                }
            }
            "max_depth" => {
                if let Some(depth) = parse_int(&values) {
                    properties.set_max_depth(depth);
                }
            }
            "position" => properties.camera_eye = parse_vector(&values).or(properties.camera_eye),
            "look_at" => {
                properties.camera_lookat = parse_vector(&values).or(properties.camera_lookat)
            }
            "up" => properties.camera_up = parse_vector(&values).or(properties.camera_up),
            "envmap" => {
                properties.envmap = parse_word(&values)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .or(properties.envmap)
            }
            _ => {}
        }
    }
    properties
}

struct MeshBlock {
    file: Option<String>,
    transform: Mat4f,
    material: Option<String>,
}

fn parse_mesh_block(body: &[&str]) -> MeshBlock {
    let mut mesh = MeshBlock {
        file: None,
        transform: Mat4f::identity(),
        material: None,
    };
    for line in body {
        let Some((key, values)) = key_values(line) else {
            continue;
        };
        match key {
            "file" => mesh.file = parse_word(&values).map(str::to_string).or(mesh.file),
            "transform" => {
                if let Some(data) = parse_floats::<16>(&values) {
                    mesh.transform = mat4_from_row_major(&data);
                }
            }
            "material" => mesh.material = parse_word(&values).map(str::to_string).or(mesh.material),
            _ => {}
        }
    }
    mesh
}

enum Block<'a> {
    Material(&'a str),
    Light,
    Properties,
    Mesh,
}

fn block_header(line: &str) -> Option<Block<'_>> {
    let mut tokens = line.split_whitespace();
    if tokens.next() == Some("material") {
        if let Some(name) = tokens.next() {
            let name = unquote(name.trim_end_matches('{'));
            if !name.is_empty() {
                return Some(Block::Material(name));
            }
        }
    }
    if line.contains("light") {
        Some(Block::Light)
    } else if line.contains("properties") {
        Some(Block::Properties)
    } else if line.contains("mesh") {
        Some(Block::Mesh)
    } else {
        None
    }
}

/// Parses scene text. Mesh files are resolved against `dir`.
pub fn parse_file_content(content: &str, dir: &Path) -> Result<Scene, SceneError> {
    let mut result = Scene {
        dir: dir.to_path_buf(),
        meshes: vec![],
        materials: vec![],
        lights: vec![],
        textures: vec![],
        texture_ids: HashMap::new(),
        properties: Properties::default(),
    };
    let mut materials_map: HashMap<String, MaterialParameter> = HashMap::new();

    let mut lines = content.lines();
    while let Some(line) = lines.next() {
        if line.starts_with('#') {
            continue;
        }
        match block_header(line) {
            Some(Block::Material(name)) => {
                let mut block = MaterialBlock::new(name);
                for body_line in take_block(&mut lines) {
                    if let Some((key, values)) = key_values(body_line) {
                        block.apply(key, &values);
                    }
                }
                let albedo = block.texture.as_ref().map(|texture| {
                    if let Some(id) = result.texture_ids.get(texture) {
                        *id
                    } else {
                        let id = TextureId(result.textures.len() as u32);
                        result.textures.push(texture.clone());
                        result.texture_ids.insert(texture.clone(), id);
                        id
                    }
                });
                let name = block.name.clone();
                log::debug!("material {}", name);
                materials_map.insert(name, block.build(albedo));
            }
            Some(Block::Light) => {
                if let Some(light) = parse_light_block(&take_block(&mut lines)) {
                    result.lights.push(light);
                }
            }
            Some(Block::Properties) => {
                result.properties = parse_properties_block(&take_block(&mut lines));
            }
            Some(Block::Mesh) => {
                let index = result.meshes.len();
                let block = parse_mesh_block(&take_block(&mut lines));
                let file = block.file.ok_or(SceneError::MissingMeshFile { mesh: index })?;
                let name = block.material.ok_or(SceneError::MissingMaterial { mesh: index })?;
                let material = materials_map
                    .get(&name)
                    .cloned()
                    .ok_or(SceneError::UnknownMaterial { mesh: index, name })?;
                result.meshes.push(Mesh {
                    path: dir.join(file),
                    transform: block.transform,
                });
                result.materials.push(material);
            }
            None => {}
        }
    }
    Ok(result)
}
