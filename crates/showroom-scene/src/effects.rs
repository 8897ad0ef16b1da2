//! Glowing grid, boxes and rings on the effects layer

use bevy::prelude::*;

use showroom_core::LayerMask;

use crate::scene::render_layers;
use crate::state::Showroom;

pub struct EffectsPlugin;

impl Plugin for EffectsPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_effects)
            .add_systems(Update, sync_effects.after(crate::driver::drive_frame));
    }
}

/// Teal glow, bright enough to bloom
const GLOW: LinearRgba = LinearRgba::rgb(0.18 * 6.0, 0.83 * 6.0, 0.75 * 6.0);

const GRID_LINES: i32 = 24;

#[derive(Component)]
pub struct GridVisual {
    material: Handle<StandardMaterial>,
}

#[derive(Component)]
pub struct BoxVisual(pub usize);

#[derive(Component)]
pub struct RingVisual {
    pub index: usize,
    material: Handle<StandardMaterial>,
}

fn glow_material(materials: &mut Assets<StandardMaterial>, alpha_blend: bool) -> Handle<StandardMaterial> {
    materials.add(StandardMaterial {
        base_color: Color::BLACK,
        emissive: GLOW,
        unlit: true,
        alpha_mode: if alpha_blend { AlphaMode::Blend } else { AlphaMode::Opaque },
        ..default()
    })
}

fn spawn_effects(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    showroom: Res<Showroom>,
) {
    let effects = &showroom.ctx.effects;
    let layers = render_layers(LayerMask::EFFECTS);

    // Grid lines on the floor; the parent scrolls along Z
    let cell = effects.grid.cell_size;
    let extent = GRID_LINES as f32 * cell;
    let thickness = 0.006;
    let grid_material = glow_material(&mut materials, false);
    let line_x = meshes.add(Cuboid::new(extent * 2.0, thickness, thickness));
    let line_z = meshes.add(Cuboid::new(thickness, thickness, extent * 2.0));
    commands
        .spawn((
            Transform::from_xyz(0.0, -0.05, 0.0),
            Visibility::default(),
            GridVisual {
                material: grid_material.clone(),
            },
        ))
        .with_children(|grid| {
            for i in -GRID_LINES..=GRID_LINES {
                let offset = i as f32 * cell;
                grid.spawn((
                    Mesh3d(line_x.clone()),
                    MeshMaterial3d(grid_material.clone()),
                    Transform::from_xyz(0.0, 0.0, offset),
                    layers.clone(),
                ));
                grid.spawn((
                    Mesh3d(line_z.clone()),
                    MeshMaterial3d(grid_material.clone()),
                    Transform::from_xyz(offset, 0.0, 0.0),
                    layers.clone(),
                ));
            }
        });

    let box_mesh = meshes.add(Cuboid::new(0.12, 0.12, 0.12));
    let box_material = glow_material(&mut materials, false);
    for (i, state) in effects.boxes.boxes().iter().enumerate() {
        commands.spawn((
            Mesh3d(box_mesh.clone()),
            MeshMaterial3d(box_material.clone()),
            Transform::from_translation(state.base),
            layers.clone(),
            BoxVisual(i),
        ));
    }

    // Each ring fades on its own, so each gets its own material
    let ring_mesh = meshes.add(Torus::new(0.6, 0.62));
    for index in 0..effects.rings.rings().len() {
        let material = glow_material(&mut materials, true);
        commands.spawn((
            Mesh3d(ring_mesh.clone()),
            MeshMaterial3d(material.clone()),
            Transform::from_xyz(0.0, -0.045, 0.0),
            layers.clone(),
            RingVisual { index, material },
        ));
    }
}

/// Copy animator state onto the effect entities
fn sync_effects(
    showroom: Res<Showroom>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut grid: Query<(&mut Transform, &GridVisual), (Without<BoxVisual>, Without<RingVisual>)>,
    mut boxes: Query<(&mut Transform, &BoxVisual), (Without<GridVisual>, Without<RingVisual>)>,
    mut rings: Query<(&mut Transform, &RingVisual), (Without<GridVisual>, Without<BoxVisual>)>,
) {
    if !showroom.driver.is_started() {
        return;
    }
    let effects = &showroom.ctx.effects;

    for (mut transform, visual) in grid.iter_mut() {
        transform.translation.z = effects.grid.offset();
        if let Some(material) = materials.get_mut(&visual.material) {
            material.emissive = GLOW * effects.grid.glow();
        }
    }

    for (mut transform, visual) in boxes.iter_mut() {
        let (Some(position), Some(state)) =
            (effects.boxes.position(visual.0), effects.boxes.boxes().get(visual.0))
        else {
            continue;
        };
        transform.translation = position;
        transform.rotation = Quat::from_rotation_y(state.yaw);
    }

    for (mut transform, visual) in rings.iter_mut() {
        let Some(ring) = effects.rings.rings().get(visual.index) else {
            continue;
        };
        transform.scale = Vec3::new(ring.scale, 1.0, ring.scale);
        if let Some(material) = materials.get_mut(&visual.material) {
            material.base_color = Color::BLACK.with_alpha(ring.opacity);
            material.emissive = GLOW * ring.opacity;
        }
    }
}
