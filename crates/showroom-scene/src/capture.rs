//! Environment capture with six face cameras and GPU readback
//!
//! Bevy cannot render a cube synchronously, so the capture spans several
//! updates: the car is hidden when the model is attached, six cameras render
//! into face textures, the faces are read back and assembled into a mipped
//! cube texture, and only then is the car shown again and the frame loop
//! started.

use bevy::asset::RenderAssetUsages;
use bevy::camera::primitives::Aabb;
use bevy::camera::{ClearColorConfig, RenderTarget};
use bevy::light::{EnvironmentMapLight, LightProbe};
use bevy::prelude::*;
use bevy::render::gpu_readback::{Readback, ReadbackComplete};
use bevy::render::render_resource::{
    Extent3d, TextureDimension, TextureFormat, TextureUsages, TextureViewDescriptor, TextureViewDimension,
};
use std::f32::consts::FRAC_PI_2;
use tracing::{debug, info, warn};

use showroom_core::capture::CaptureRequest;
use showroom_core::graph::{EnvMapId, NodeId, SceneGraph};
use showroom_core::{CaptureError, CubeFace, CubeMap, CubeMapBuilder, LayerMask};

use crate::models::CarModel;
use crate::scene::{render_layers, GROUND_Y};
use crate::state::{DemoState, RedrawScheduler, Showroom};

/// Readbacks before this many updates may predate the hidden car
const SETTLE_FRAMES: u32 = 3;

/// Give up if the faces have not all arrived by then
const TIMEOUT_FRAMES: u32 = 300;

/// wgpu's row alignment for texture copies
const COPY_BYTES_PER_ROW_ALIGNMENT: usize = 256;

/// Captured faces are display-referred; this brings the reflection
/// multiplier into the view cameras' exposure range
const LUMINANCE_PER_UNIT: f32 = 100.0;

/// Margin around the car's bounds, as a fraction of its size
const VOLUME_PADDING: f32 = 0.1;

/// Gap kept between the probe volume and the floor
const FLOOR_CLEARANCE: f32 = 0.005;

pub struct CapturePlugin;

impl Plugin for CapturePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CapturedEnvironments>()
            .add_systems(OnEnter(DemoState::Capturing), spawn_face_cameras)
            .add_systems(Update, finish_capture.run_if(in_state(DemoState::Capturing)));
    }
}

/// A capture between `Bootstrap::on_loaded` and `Bootstrap::on_captured`
#[derive(Resource)]
pub struct PendingCapture {
    request: CaptureRequest,
    builder: CubeMapBuilder,
    frames: u32,
    entities: Vec<Entity>,
}

impl PendingCapture {
    pub fn new(request: CaptureRequest) -> Self {
        Self {
            builder: CubeMapBuilder::new(request.resolution),
            request,
            frames: 0,
            entities: Vec::new(),
        }
    }

    pub fn request(&self) -> &CaptureRequest {
        &self.request
    }
}

/// Cube textures by the id handed to the scene graph
#[derive(Resource, Default)]
pub struct CapturedEnvironments {
    maps: Vec<Handle<Image>>,
}

impl CapturedEnvironments {
    pub fn insert(&mut self, image: Handle<Image>) -> EnvMapId {
        self.maps.push(image);
        EnvMapId(self.maps.len() as u32 - 1)
    }

    pub fn get(&self, id: EnvMapId) -> Option<&Handle<Image>> {
        self.maps.get(id.0 as usize)
    }
}

#[derive(Component)]
pub struct CaptureFace(pub CubeFace);

fn face_target(size: u32) -> Image {
    let mut image = Image::new_fill(
        Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        &[0, 0, 0, 255],
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::default(),
    );
    image.texture_descriptor.usage = TextureUsages::TEXTURE_BINDING
        | TextureUsages::COPY_DST
        | TextureUsages::COPY_SRC
        | TextureUsages::RENDER_ATTACHMENT;
    image
}

/// Cube-view texture holding the full mip chain
pub fn cube_image(cube: CubeMap) -> Image {
    let mut image = Image::new_fill(
        Extent3d {
            width: cube.size,
            height: cube.size,
            depth_or_array_layers: 6,
        },
        TextureDimension::D2,
        &[0, 0, 0, 255],
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::RENDER_WORLD,
    );
    image.data = Some(cube.data);
    image.texture_descriptor.mip_level_count = cube.mip_levels;
    image.texture_view_descriptor = Some(TextureViewDescriptor {
        dimension: Some(TextureViewDimension::Cube),
        ..default()
    });
    image
}

/// Strip the per-row padding a texture copy may carry
pub fn unpad_rows(data: Vec<u8>, size: u32) -> Vec<u8> {
    let row = size as usize * 4;
    let padded = row.next_multiple_of(COPY_BYTES_PER_ROW_ALIGNMENT);
    if padded == row || data.len() != padded * size as usize {
        return data;
    }
    data.chunks(padded).flat_map(|r| r[..row].iter().copied()).collect()
}

fn spawn_face_cameras(
    mut commands: Commands,
    mut images: ResMut<Assets<Image>>,
    pending: Option<ResMut<PendingCapture>>,
    showroom: Res<Showroom>,
) {
    let Some(mut pending) = pending else {
        warn!("Capturing without a pending capture");
        return;
    };
    let size = pending.request.resolution;
    let position = pending.request.position;
    let config = &showroom.config.capture;

    for (i, face) in CubeFace::ALL.into_iter().enumerate() {
        let target = images.add(face_target(size));
        let (forward, up) = face.basis();
        let camera = commands
            .spawn((
                Camera3d::default(),
                Camera {
                    order: -10 + i as isize,
                    target: RenderTarget::Image(target.clone().into()),
                    clear_color: ClearColorConfig::Custom(Color::BLACK),
                    ..default()
                },
                Msaa::Off,
                Projection::Perspective(PerspectiveProjection {
                    fov: FRAC_PI_2,
                    aspect_ratio: 1.0,
                    near: config.near,
                    far: config.far,
                    ..default()
                }),
                Transform::from_translation(position).looking_to(forward, up),
                render_layers(LayerMask::FULL_SCENE),
                CaptureFace(face),
            ))
            .id();
        let readback = commands
            .spawn((Readback::texture(target), CaptureFace(face)))
            .observe(move |event: On<ReadbackComplete>, pending: Option<ResMut<PendingCapture>>| {
                let Some(mut pending) = pending else {
                    return;
                };
                if pending.frames < SETTLE_FRAMES || pending.builder.has_face(face) {
                    return;
                }
                let size = pending.builder.size();
                if let Err(err) = pending.builder.set_face(face, unpad_rows(event.to_vec(), size)) {
                    warn!("Dropping capture face: {}", err);
                } else {
                    debug!("Captured face {:?}", face);
                }
            })
            .id();
        pending.entities.extend([camera, readback]);
    }
    info!("Capturing {}px environment at {:?}", size, position);
}

/// Highest reflection multiplier among the car's meshes
fn env_intensity(graph: &SceneGraph, root: NodeId) -> f32 {
    graph
        .descendants(root)
        .into_iter()
        .filter_map(|id| graph.node(id).and_then(|n| n.mesh))
        .map(|mesh| mesh.env_intensity)
        .fold(1.0, f32::max)
}

/// World-space corners of a mesh's local bounds, folded into `min..max`
fn world_bounds(global: &GlobalTransform, aabb: &Aabb) -> (Vec3, Vec3) {
    let center = Vec3::from(aabb.center);
    let half = Vec3::from(aabb.half_extents);
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for i in 0..8 {
        let sign = Vec3::new(
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            if i & 4 == 0 { -1.0 } else { 1.0 },
        );
        let corner = global.transform_point(center + half * sign);
        min = min.min(corner);
        max = max.max(corner);
    }
    (min, max)
}

/// Reflection volume around `min..max`, padded, with its floor kept above
/// the ground so the reflection stays on the car
pub fn fit_reflection_volume(min: Vec3, max: Vec3, floor: f32) -> Option<Transform> {
    let pad = (max - min) * VOLUME_PADDING;
    let mut lower = min - pad;
    lower.y = lower.y.max(floor + FLOOR_CLEARANCE);
    let upper = max + pad;
    if upper.cmple(lower).any() {
        return None;
    }
    Some(Transform::from_translation((lower + upper) / 2.0).with_scale(upper - lower))
}

/// Bounds of every mesh below the car's scene root
fn car_bounds(
    cars: &Query<Entity, With<CarModel>>,
    children: &Query<&Children>,
    meshes: &Query<(&GlobalTransform, &Aabb)>,
) -> Option<(Vec3, Vec3)> {
    let car = cars.iter().next()?;
    children
        .iter_descendants(car)
        .filter_map(|entity| meshes.get(entity).ok())
        .map(|(global, aabb)| world_bounds(global, aabb))
        .reduce(|(a_min, a_max), (b_min, b_max)| (a_min.min(b_min), a_max.max(b_max)))
}

fn finish_capture(
    mut commands: Commands,
    pending: Option<ResMut<PendingCapture>>,
    mut showroom: ResMut<Showroom>,
    mut scheduler: ResMut<RedrawScheduler>,
    mut images: ResMut<Assets<Image>>,
    mut environments: ResMut<CapturedEnvironments>,
    time: Res<Time>,
    mut next_state: ResMut<NextState<DemoState>>,
    cars: Query<Entity, With<CarModel>>,
    children: Query<&Children>,
    mesh_bounds: Query<(&GlobalTransform, &Aabb)>,
) {
    let Some(mut pending) = pending else {
        return;
    };
    pending.frames += 1;
    let Showroom {
        ctx, driver, boot, config,
    } = &mut *showroom;

    let cube = if pending.builder.is_complete() {
        pending.builder.build()
    } else if pending.frames > TIMEOUT_FRAMES {
        let missing = CubeFace::ALL
            .into_iter()
            .find(|face| !pending.builder.has_face(*face))
            .unwrap_or(CubeFace::PosX);
        Err(CaptureError::MissingFace(missing))
    } else {
        return;
    };

    for entity in pending.entities.drain(..) {
        commands.entity(entity).despawn();
    }
    commands.remove_resource::<PendingCapture>();

    let cube = match cube {
        Ok(cube) => cube,
        Err(err) => {
            boot.on_capture_failed(&mut ctx.graph, err);
            next_state.set(DemoState::Failed);
            return;
        }
    };

    let handle = images.add(cube_image(cube));
    let env_map = environments.insert(handle.clone());
    match boot.on_captured(&mut ctx.graph, env_map, driver, time.elapsed_secs(), &mut *scheduler) {
        Ok(assigned) => {
            let intensity = boot
                .load()
                .loaded()
                .map(|root| env_intensity(&ctx.graph, *root))
                .unwrap_or(1.0);
            // Probe volumes are unit cubes; the configured half extents are
            // only used when the car reports no bounds
            let volume = car_bounds(&cars, &children, &mesh_bounds)
                .and_then(|(min, max)| fit_reflection_volume(min, max, GROUND_Y))
                .unwrap_or_else(|| {
                    warn!("Car bounds unavailable, using the configured probe extent");
                    Transform::from_translation(pending.request.position)
                        .with_scale(Vec3::from_array(config.capture.probe_extent) * 2.0)
                });
            debug!("Light probe volume {:?}", volume);
            commands.spawn((
                LightProbe,
                EnvironmentMapLight {
                    diffuse_map: handle.clone(),
                    specular_map: handle,
                    intensity: intensity * LUMINANCE_PER_UNIT,
                    ..default()
                },
                volume,
            ));
            info!("Environment applied to {} meshes", assigned);
            next_state.set(DemoState::Running);
        }
        Err(err) => {
            warn!("Capture could not be applied: {}", err);
            next_state.set(DemoState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpad_rows_strips_alignment() {
        // 16px rows are 64 bytes, copied with 256-byte strides
        let size = 16u32;
        let mut padded = Vec::new();
        for y in 0..size {
            padded.extend(std::iter::repeat(y as u8).take(64));
            padded.extend(std::iter::repeat(0xEE).take(192));
        }
        let tight = unpad_rows(padded, size);
        assert_eq!(tight.len(), 16 * 16 * 4);
        assert!(tight.chunks(64).enumerate().all(|(y, row)| row.iter().all(|b| *b == y as u8)));
    }

    #[test]
    fn test_unpad_rows_keeps_tight_data() {
        let data = vec![7u8; 256 * 256 * 4];
        assert_eq!(unpad_rows(data.clone(), 256), data);
    }

    #[test]
    fn test_cube_image_is_cube_view() {
        let mut builder = CubeMapBuilder::new(4);
        for face in CubeFace::ALL {
            builder.set_face(face, vec![255; 4 * 4 * 4]).unwrap();
        }
        let image = cube_image(builder.build().unwrap());
        assert_eq!(image.texture_descriptor.size.depth_or_array_layers, 6);
        assert_eq!(image.texture_descriptor.mip_level_count, 3);
        assert_eq!(
            image.texture_view_descriptor.and_then(|d| d.dimension),
            Some(TextureViewDimension::Cube)
        );
    }

    #[test]
    fn test_reflection_volume_stays_above_floor() {
        let (min, max) = (Vec3::new(-1.0, -0.05, -2.0), Vec3::new(1.0, 1.2, 2.0));
        let volume = fit_reflection_volume(min, max, GROUND_Y).unwrap();
        let lower = volume.translation - volume.scale / 2.0;
        let upper = volume.translation + volume.scale / 2.0;
        assert!(lower.y > GROUND_Y);
        assert!(upper.cmpge(max).all());
        assert!(lower.x <= min.x && lower.z <= min.z);
    }

    #[test]
    fn test_reflection_volume_below_floor_is_rejected() {
        let volume = fit_reflection_volume(Vec3::new(-1.0, -3.0, -1.0), Vec3::new(1.0, -2.0, 1.0), GROUND_Y);
        assert!(volume.is_none());
    }

    #[test]
    fn test_world_bounds_follow_transform() {
        let aabb = Aabb::from_min_max(Vec3::splat(-1.0), Vec3::splat(1.0));
        let global = GlobalTransform::from(Transform::from_xyz(0.0, 2.0, 0.0).with_scale(Vec3::splat(0.5)));
        let (min, max) = world_bounds(&global, &aabb);
        assert!(min.abs_diff_eq(Vec3::new(-0.5, 1.5, -0.5), 1e-6));
        assert!(max.abs_diff_eq(Vec3::new(0.5, 2.5, 0.5), 1e-6));
    }

    #[test]
    fn test_environment_ids_are_stable() {
        let mut envs = CapturedEnvironments::default();
        let a = envs.insert(Handle::default());
        let b = envs.insert(Handle::default());
        assert_eq!(a, EnvMapId(0));
        assert_eq!(b, EnvMapId(1));
        assert!(envs.get(b).is_some());
    }
}
