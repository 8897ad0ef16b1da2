//! Output surface size and resize propagation

use thiserror::Error;
use tracing::debug;

use crate::camera::Camera;
use crate::pipeline::Composer;

#[derive(Error, Debug, PartialEq)]
pub enum ViewportError {
    #[error("Viewport size must be non-zero, got {width}x{height}")]
    ZeroSize { width: u32, height: u32 },
}

/// Size of the drawing surface in logical pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    width: u32,
    height: u32,
    pub pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width: u32, height: u32, pixel_ratio: f32) -> Result<Self, ViewportError> {
        if width == 0 || height == 0 {
            return Err(ViewportError::ZeroSize { width, height });
        }
        Ok(Self { width, height, pixel_ratio })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Backing buffer size in device pixels
    pub fn physical_size(&self) -> (u32, u32) {
        (
            (self.width as f32 * self.pixel_ratio).round() as u32,
            (self.height as f32 * self.pixel_ratio).round() as u32,
        )
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 720, pixel_ratio: 1.0 }
    }
}

/// Propagate a viewport-size notification.
///
/// Camera aspect, surface size and every composer buffer take the new size
/// exactly. A zero-sized notification (minimised tab) changes nothing.
pub fn apply_resize(
    camera: &mut Camera,
    viewport: &mut Viewport,
    composer: &mut Composer,
    width: u32,
    height: u32,
) -> Result<(), ViewportError> {
    let resized = Viewport::new(width, height, viewport.pixel_ratio)?;
    *viewport = resized;
    camera.set_aspect(resized.aspect());
    composer.set_size(width, height);
    debug!("Viewport resized to {}x{}", width, height);
    Ok(())
}
