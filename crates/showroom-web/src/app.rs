//! Bevy application setup

use bevy::prelude::*;
use bevy::winit::{UpdateMode, WinitSettings};
use bevy_egui::EguiPlugin;
use bevy_picking::DefaultPickingPlugins;
use std::time::Duration;
use tracing::info;

use showroom_core::DemoConfig;
use showroom_scene::ShowroomScenePlugin;

use crate::ui::UiPlugin;

/// Updates run when the frame driver requests a redraw or input arrives;
/// this bounds the wait otherwise
const IDLE_WAKE: Duration = Duration::from_millis(100);

pub fn run(config: DemoConfig) {
    info!(model = %config.model.path, "Starting showroom");
    App::new()
        .insert_resource(ClearColor(Color::BLACK))
        .insert_resource(WinitSettings {
            focused_mode: UpdateMode::reactive(IDLE_WAKE),
            unfocused_mode: UpdateMode::reactive_low_power(Duration::from_secs(1)),
        })
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "Showroom".to_string(),
                        canvas: Some("#showroom-canvas".to_string()),
                        fit_canvas_to_parent: true,
                        prevent_default_event_handling: true,
                        ..default()
                    }),
                    ..default()
                })
                .set(AssetPlugin {
                    // Models are served from the page root
                    file_path: "".to_string(),
                    // Static hosts have no .meta files
                    meta_check: bevy::asset::AssetMetaCheck::Never,
                    ..default()
                }),
        )
        // Must come before EguiPlugin so it can detect PickingPlugin
        .add_plugins(DefaultPickingPlugins)
        .add_plugins(EguiPlugin::default())
        .add_plugins(ShowroomScenePlugin { config })
        .add_plugins(UiPlugin)
        .run();
}
