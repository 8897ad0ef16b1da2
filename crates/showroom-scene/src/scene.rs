//! Cameras, lights and ground

use bevy::anti_alias::fxaa::Fxaa;
use bevy::camera::visibility::RenderLayers;
use bevy::camera::ClearColorConfig;
use bevy::core_pipeline::tonemapping::Tonemapping;
use bevy::post_process::bloom::Bloom;
use bevy::prelude::*;
use bevy::render::view::Hdr;
use tracing::info;

use showroom_core::{Camera as ViewCamera, LayerMask, PassKind};

use crate::driver::bloom_from_params;
use crate::state::{DemoState, Showroom};

pub struct SceneSetupPlugin;

impl Plugin for SceneSetupPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_scene)
            .add_systems(OnEnter(DemoState::Running), activate_view_cameras);
    }
}

/// Draws the effects layer through bloom and FXAA
#[derive(Component)]
pub struct EffectsCamera;

/// Draws the full scene over the effects pass without clearing colour
#[derive(Component)]
pub struct SceneCamera;

/// Top of the showroom floor
pub const GROUND_Y: f32 = -0.06;

pub fn render_layers(mask: LayerMask) -> RenderLayers {
    let layers: Vec<usize> = mask.layers().map(usize::from).collect();
    RenderLayers::from_layers(&layers)
}

pub fn view_transform(camera: &ViewCamera) -> Transform {
    Transform::from_translation(camera.position).looking_at(camera.target, camera.up)
}

pub fn perspective(camera: &ViewCamera) -> Projection {
    Projection::Perspective(PerspectiveProjection {
        fov: camera.fov_y,
        near: camera.near,
        far: camera.far,
        ..default()
    })
}

fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    showroom: Res<Showroom>,
) {
    let view = &showroom.ctx.camera;
    let composer = &showroom.ctx.composer;

    // Both passes share the window's main texture, so they must agree on HDR
    // and MSAA. Only the second one tonemaps.
    commands.spawn((
        Camera3d::default(),
        Camera {
            order: 0,
            is_active: false,
            clear_color: ClearColorConfig::Custom(Color::BLACK),
            ..default()
        },
        Hdr,
        Msaa::Off,
        Tonemapping::None,
        bloom_from_params(&composer.bloom),
        Fxaa {
            enabled: composer.is_enabled(PassKind::Fxaa),
            ..default()
        },
        perspective(view),
        view_transform(view),
        render_layers(LayerMask::EFFECTS),
        EffectsCamera,
    ));

    commands.spawn((
        Camera3d::default(),
        Camera {
            order: 1,
            is_active: false,
            clear_color: ClearColorConfig::None,
            ..default()
        },
        Hdr,
        Msaa::Off,
        Tonemapping::TonyMcMapface,
        perspective(view),
        view_transform(view),
        render_layers(LayerMask::FULL_SCENE),
        SceneCamera,
    ));

    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 200.0,
        ..default()
    });

    // Teal key light
    commands.spawn((
        DirectionalLight {
            illuminance: 4500.0,
            color: Color::srgb_u8(0x2d, 0xd4, 0xbf),
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(2.0, 4.0, 3.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // Dark glossy floor under the grid
    commands.spawn((
        Mesh3d(meshes.add(Plane3d::default().mesh().size(30.0, 30.0))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.02, 0.02, 0.03),
            perceptual_roughness: 0.25,
            metallic: 0.6,
            ..default()
        })),
        Transform::from_xyz(0.0, GROUND_Y, 0.0),
        render_layers(LayerMask::layer(showroom_core::layers::DEFAULT_LAYER)),
    ));
}

fn activate_view_cameras(mut cameras: Query<&mut Camera, Or<(With<EffectsCamera>, With<SceneCamera>)>>) {
    for mut camera in cameras.iter_mut() {
        camera.is_active = true;
    }
    info!("View cameras active");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_layers_match_mask() {
        assert_eq!(render_layers(LayerMask::EFFECTS), RenderLayers::layer(1));
        let full = render_layers(LayerMask::FULL_SCENE);
        assert!(full.intersects(&RenderLayers::layer(0)));
        assert!(full.intersects(&RenderLayers::layer(1)));
    }

    #[test]
    fn test_view_transform_looks_at_target() {
        let camera = ViewCamera::from_config(&showroom_core::config::CameraConfig::default(), 1.5);
        let transform = view_transform(&camera);
        let forward = transform.forward();
        let expected = (camera.target - camera.position).normalize();
        assert!(forward.as_vec3().abs_diff_eq(expected, 1e-5));
    }
}
