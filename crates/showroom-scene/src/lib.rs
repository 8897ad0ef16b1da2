//! Showroom Scene - Bevy realisation of the car showroom
//!
//! This crate puts the engine-agnostic pieces of `showroom-core` on screen:
//! the car is loaded and mirrored into the scene graph, the environment is
//! captured once, and the frame driver's plan is replayed onto two layered
//! cameras every requested redraw.

pub mod camera;
pub mod capture;
pub mod driver;
pub mod effects;
pub mod models;
pub mod scene;
pub mod state;

use bevy::prelude::*;

use showroom_core::DemoConfig;

/// Plugin that sets up the whole showroom scene
pub struct ShowroomScenePlugin {
    pub config: DemoConfig,
}

impl Plugin for ShowroomScenePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(state::Showroom::new(self.config.clone()))
            .init_state::<state::DemoState>()
            .add_plugins(scene::SceneSetupPlugin)
            .add_plugins(camera::OrbitInputPlugin)
            .add_plugins(models::ModelsPlugin)
            .add_plugins(capture::CapturePlugin)
            .add_plugins(driver::FrameDriverPlugin)
            .add_plugins(effects::EffectsPlugin)
            .add_systems(
                Update,
                state::follow_boot_failure.run_if(not(in_state(state::DemoState::Failed))),
            )
            .add_systems(Last, state::emit_redraw);
    }
}

// Re-export commonly used types
pub use state::{DemoState, RedrawScheduler, Showroom};
pub use driver::bloom_from_params;
