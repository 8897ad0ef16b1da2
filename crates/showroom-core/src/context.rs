//! The single render context shared by the frame driver and its collaborators

use crate::camera::{Camera, OrbitControls};
use crate::config::DemoConfig;
use crate::effects::Effects;
use crate::graph::SceneGraph;
use crate::pipeline::{BloomParams, Composer};
use crate::stats::FrameStats;
use crate::viewport::{apply_resize, Viewport, ViewportError};

/// Everything one frame reads or mutates, constructed once at startup
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub graph: SceneGraph,
    pub camera: Camera,
    pub controls: OrbitControls,
    pub composer: Composer,
    pub viewport: Viewport,
    pub effects: Effects,
    pub stats: FrameStats,
}

impl RenderContext {
    pub fn new(config: &DemoConfig, viewport: Viewport) -> Self {
        let camera = Camera::from_config(&config.camera, viewport.aspect());
        let controls = OrbitControls::from_camera(&camera, config.camera.damping_factor);
        let mut composer = Composer::standard(BloomParams::from(&config.bloom));
        composer.set_enabled(crate::pipeline::PassKind::Fxaa, config.bloom.fxaa);
        composer.set_size(viewport.width(), viewport.height());
        Self {
            graph: SceneGraph::new(),
            camera,
            controls,
            composer,
            viewport,
            effects: Effects::from_config(&config.animation),
            stats: FrameStats::new(),
        }
    }

    /// Viewport-size notification from the host
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ViewportError> {
        apply_resize(&mut self.camera, &mut self.viewport, &mut self.composer, width, height)
    }
}
