use std::path::Path;

use thiserror::Error;

use crate::aabb::Aabb;
use crate::geometry::Fp;
use crate::light::LightParameter;
use crate::material::MaterialParameter;
use crate::properties::CameraParams;
use crate::scene::Scene;

/// Floats in one output pixel (RGBA).
pub const OUTPUT_FLOATS: usize = 4;
/// Floats in one per-sample feature record at the default frame count.
pub const FEATURE_RECORD_FLOATS: usize = 54;
/// Frames sharing one feature element unless the back-end is told otherwise.
pub const FEATURE_SLOTS: usize = 4;
/// Floats in one feature element.
pub const FEATURE_FLOATS: usize = FEATURE_RECORD_FLOATS * FEATURE_SLOTS;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to load scene: {0}")]
    LoadScene(String),

    #[error("frame {frame} failed: {reason}")]
    Launch { frame: u32, reason: String },

    #[error("buffer is already mapped")]
    AlreadyMapped,

    #[error("{what} has {actual} entries, scene has {expected}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// A 2-D buffer owned by the rendering back-end. Contents are only
/// readable between `map` and `unmap`.
pub trait DeviceBuffer {
    /// Bytes per element.
    fn element_size(&self) -> usize;
    /// (width, height) in elements.
    fn size(&self) -> (u32, u32);
    fn map(&mut self) -> Result<(), RenderError>;
    /// Row-major contents while mapped.
    fn mapped(&self) -> Option<&[u8]>;
    fn unmap(&mut self);
}

/// Keeps a buffer mapped for as long as it lives.
pub struct BufferMap<'a> {
    buffer: &'a mut dyn DeviceBuffer,
}

impl<'a> BufferMap<'a> {
    pub fn new(buffer: &'a mut dyn DeviceBuffer) -> Result<BufferMap<'a>, RenderError> {
        buffer.map()?;
        Ok(BufferMap { buffer })
    }

    pub fn bytes(&self) -> &[u8] {
        self.buffer.mapped().unwrap_or(&[])
    }

    pub fn element_size(&self) -> usize {
        self.buffer.element_size()
    }

    pub fn size(&self) -> (u32, u32) {
        self.buffer.size()
    }
}

impl Drop for BufferMap<'_> {
    fn drop(&mut self) {
        self.buffer.unmap();
    }
}

/// Host memory buffer of `f32` elements.
pub struct HostBuffer {
    width: u32,
    height: u32,
    floats_per_element: usize,
    data: Vec<f32>,
    is_mapped: bool,
}

impl HostBuffer {
    pub fn new(width: u32, height: u32, floats_per_element: usize) -> HostBuffer {
        HostBuffer {
            width,
            height,
            floats_per_element,
            data: vec![0.0; width as usize * height as usize * floats_per_element],
            is_mapped: false,
        }
    }

    /// Reallocates and zeroes the buffer when the film size changes.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            *self = HostBuffer::new(width, height, self.floats_per_element);
        }
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

impl DeviceBuffer for HostBuffer {
    fn element_size(&self) -> usize {
        self.floats_per_element * std::mem::size_of::<f32>()
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn map(&mut self) -> Result<(), RenderError> {
        if self.is_mapped {
            return Err(RenderError::AlreadyMapped);
        }
        self.is_mapped = true;
        Ok(())
    }

    fn mapped(&self) -> Option<&[u8]> {
        self.is_mapped.then(|| bytemuck::cast_slice(&self.data))
    }

    fn unmap(&mut self) {
        self.is_mapped = false;
    }
}

/// The path-tracing back-end as seen by the patch orchestrator.
///
/// Every `launch` blocks until the frame is accumulated into the output
/// buffer; frame 0 restarts the accumulation.
pub trait Renderer {
    /// Uploads geometry, materials and lights. Returns the bounds of the
    /// loaded geometry.
    fn load_scene(&mut self, scene: &Scene) -> Result<Aabb, RenderError>;
    /// Loads an environment image and returns the light that samples it.
    fn load_environment(&mut self, path: &Path) -> Result<LightParameter, RenderError>;
    /// Frames sharing one feature element. Frame `k` owns chunk `k % frames`
    /// of `FEATURE_FLOATS / frames` floats.
    fn set_feature_frames(&mut self, frames: u32);
    fn set_camera(&mut self, camera: &CameraParams, vfov: Fp);
    fn update_materials(&mut self, materials: &[MaterialParameter]) -> Result<(), RenderError>;
    fn update_lights(&mut self, lights: &[LightParameter]) -> Result<(), RenderError>;
    fn launch(&mut self, frame: u32, width: u32, height: u32) -> Result<(), RenderError>;
    fn output_buffer(&mut self) -> &mut dyn DeviceBuffer;
    fn feature_buffer(&mut self) -> &mut dyn DeviceBuffer;
    fn teardown(&mut self);
}

#[cfg(test)]
impl HostBuffer {
    pub fn from_data(
        width: u32,
        height: u32,
        floats_per_element: usize,
        data: Vec<f32>,
    ) -> HostBuffer {
        assert_eq!(data.len(), width as usize * height as usize * floats_per_element);
        HostBuffer {
            width,
            height,
            floats_per_element,
            data,
            is_mapped: false,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.is_mapped
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}
