use std::path::Path;

use thiserror::Error;

use crate::npy::{NpyArray, NpyError};
use crate::renderer::{BufferMap, DeviceBuffer, RenderError, FEATURE_FLOATS, OUTPUT_FLOATS};

/// Floats kept per reference pixel (alpha is dropped).
pub const REFERENCE_CHANNELS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// RGBA output buffer to an RGB array of shape (width, height, 3).
    Reference,
    /// Feature buffer to an array of shape
    /// (width, height, frames, FEATURE_FLOATS / frames).
    Feature { frames: usize },
}

impl Layout {
    pub fn label(&self) -> &'static str {
        match self {
            Layout::Reference => "ref",
            Layout::Feature { .. } => "feat",
        }
    }
}

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error(transparent)]
    Map(#[from] RenderError),

    #[error(transparent)]
    Write(#[from] NpyError),
}

/// Rearranges a row-major device buffer into an array with rows flipped
/// vertically.
///
/// Panics when `element_size` does not match `layout` or `bytes` does not
/// hold exactly `width * height` elements.
pub fn serialize(
    bytes: &[u8],
    element_size: usize,
    width: u32,
    height: u32,
    layout: Layout,
) -> NpyArray {
    let (w, h) = (width as usize, height as usize);
    let src_floats = match layout {
        Layout::Reference => OUTPUT_FLOATS,
        Layout::Feature { frames } => {
            assert!(frames >= 1, "feature layout needs at least one frame");
            assert_eq!(
                FEATURE_FLOATS % frames,
                0,
                "{} frames do not divide a feature element",
                frames
            );
            FEATURE_FLOATS
        }
    };
    assert_eq!(
        element_size,
        src_floats * std::mem::size_of::<f32>(),
        "unexpected element size for {:?}",
        layout
    );
    assert_eq!(bytes.len(), w * h * element_size, "buffer size does not match its dimensions");

    let src: Vec<f32> = bytemuck::pod_collect_to_vec(bytes);
    let (dst_floats, shape) = match layout {
        Layout::Reference => (REFERENCE_CHANNELS, vec![w, h, REFERENCE_CHANNELS]),
        Layout::Feature { frames } => (FEATURE_FLOATS, vec![w, h, frames, FEATURE_FLOATS / frames]),
    };

    let mut data = vec![0f32; w * h * dst_floats];
    for j in 0..h {
        let src_row = &src[j * w * src_floats..(j + 1) * w * src_floats];
        let dst_start = (h - 1 - j) * w * dst_floats;
        let dst_row = &mut data[dst_start..dst_start + w * dst_floats];
        for (dst, src) in dst_row
            .chunks_exact_mut(dst_floats)
            .zip(src_row.chunks_exact(src_floats))
        {
            dst.copy_from_slice(&src[..dst_floats]);
        }
    }
    NpyArray { shape, data }
}

/// Maps `buffer`, serializes it with `layout` and writes the array to `path`.
pub fn write_buffer(
    path: &Path,
    buffer: &mut dyn DeviceBuffer,
    layout: Layout,
) -> Result<(), SerializeError> {
    let array = {
        let map = BufferMap::new(buffer)?;
        let (width, height) = map.size();
        serialize(map.bytes(), map.element_size(), width, height, layout)
    };
    array.save(path)?;
    log::info!("[output] {} {}", layout.label(), path.display());
    Ok(())
}
