//! Car model loading and the scene graph mirror
//!
//! The glTF is loaded through the asset server and spawned as a scene. Once
//! the instance is ready its node hierarchy is mirrored into the core scene
//! graph, and from then on the graph owns node transforms and visibility:
//! committed changes are copied back onto the entities every update.

use bevy::asset::io::AssetReaderError;
use bevy::asset::{AssetLoadError, LoadState};
use bevy::gltf::Gltf;
use bevy::prelude::*;
use bevy::scene::{SceneInstance, SceneSpawner};
use bevy::transform::TransformSystems;
use tracing::{info, warn};

use showroom_core::graph::{MeshInfo, NodeId, SceneGraph, Transform as NodeTransform};
use showroom_core::LoadError;

use crate::capture::PendingCapture;
use crate::state::{DemoState, NodeEntities, Showroom};

pub struct ModelsPlugin;

impl Plugin for ModelsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<NodeEntities>()
            .add_systems(Startup, start_model_load)
            .add_systems(
                Update,
                (poll_model_load, attach_model_when_ready)
                    .chain()
                    .run_if(in_state(DemoState::Loading)),
            )
            .add_systems(PostUpdate, sync_graph_changes.before(TransformSystems::Propagate));
    }
}

/// Root entity of the spawned car scene
#[derive(Component)]
pub struct CarModel;

/// In-flight car asset
#[derive(Resource)]
pub struct CarAsset {
    pub path: String,
    pub handle: Handle<Gltf>,
    pub scene_entity: Option<Entity>,
}

fn start_model_load(mut commands: Commands, asset_server: Res<AssetServer>, showroom: Res<Showroom>) {
    let source = showroom.boot.load().source().clone();
    // Draco decoding is not available in Bevy's glTF loader; the decoder path
    // is only reported.
    info!(decoder = %source.decoder_path, "Loading model {}", source.path);
    let handle = asset_server.load::<Gltf>(source.path.clone());
    commands.insert_resource(CarAsset {
        path: source.path,
        handle,
        scene_entity: None,
    });
}

fn load_error(path: &str, err: &AssetLoadError) -> LoadError {
    match err {
        AssetLoadError::AssetReaderError(AssetReaderError::NotFound(missing)) => {
            LoadError::NotFound(missing.display().to_string())
        }
        other => LoadError::Decode {
            path: path.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Check loading state and spawn the default scene once the glTF is in
fn poll_model_load(
    mut commands: Commands,
    mut car: ResMut<CarAsset>,
    asset_server: Res<AssetServer>,
    gltf_assets: Res<Assets<Gltf>>,
    mut showroom: ResMut<Showroom>,
    mut next_state: ResMut<NextState<DemoState>>,
) {
    if car.scene_entity.is_some() {
        return;
    }
    match asset_server.get_load_state(car.handle.id()) {
        Some(LoadState::Loaded) => {
            let Some(gltf) = gltf_assets.get(&car.handle) else {
                return;
            };
            // Use first scene if no default
            let Some(scene) = gltf.default_scene.clone().or_else(|| gltf.scenes.first().cloned()) else {
                let err = LoadError::Decode {
                    path: car.path.clone(),
                    reason: "model has no scenes".to_string(),
                };
                if let Err(e) = showroom.boot.on_load_failed(err) {
                    warn!("{}", e);
                }
                next_state.set(DemoState::Failed);
                return;
            };
            // The asset server reports no byte counts; loaded is all of it
            showroom.boot.report_progress(1, 1);
            let entity = commands.spawn((SceneRoot(scene), CarModel, Name::new("car"))).id();
            car.scene_entity = Some(entity);
            info!("Model loaded: {}", car.path);
        }
        Some(LoadState::Failed(err)) => {
            let err = load_error(&car.path, &err);
            if let Err(e) = showroom.boot.on_load_failed(err) {
                warn!("{}", e);
            }
            next_state.set(DemoState::Failed);
        }
        _ => {
            // Still loading
        }
    }
}

/// Mirror the spawned hierarchy and hand it to the startup sequence
fn attach_model_when_ready(
    mut commands: Commands,
    car: Res<CarAsset>,
    scene_spawner: Res<SceneSpawner>,
    instances: Query<&SceneInstance, With<CarModel>>,
    children: Query<&Children>,
    nodes: Query<(Option<&Name>, &Transform, Has<Mesh3d>)>,
    mut showroom: ResMut<Showroom>,
    mut node_entities: ResMut<NodeEntities>,
    mut next_state: ResMut<NextState<DemoState>>,
) {
    let Some(entity) = car.scene_entity else {
        return;
    };
    let Ok(instance) = instances.get(entity) else {
        return;
    };
    if !scene_spawner.instance_is_ready(**instance) {
        return;
    }

    // The spawned scene's own root entity holds the glTF root nodes, so wheel
    // paths count from there
    let scene_root = children
        .get(entity)
        .ok()
        .and_then(|kids| kids.first().copied())
        .unwrap_or(entity);
    let Showroom { ctx, boot, .. } = &mut *showroom;
    let root = mirror_node(scene_root, None, &mut ctx.graph, &mut node_entities, &children, &nodes);
    info!("Mirrored {} scene nodes", ctx.graph.len());

    match boot.on_loaded(&mut ctx.graph, root) {
        Ok(request) => {
            commands.insert_resource(PendingCapture::new(request));
            next_state.set(DemoState::Capturing);
        }
        Err(err) => {
            warn!("Startup stopped after load: {}", err);
            next_state.set(DemoState::Failed);
        }
    }
}

/// Add `entity` and its non-primitive descendants to the graph. Entities
/// holding a `Mesh3d` are glTF primitives; they mark their parent node as a
/// mesh instead of becoming nodes themselves.
fn mirror_node(
    entity: Entity,
    parent: Option<NodeId>,
    graph: &mut SceneGraph,
    node_entities: &mut NodeEntities,
    children: &Query<&Children>,
    nodes: &Query<(Option<&Name>, &Transform, Has<Mesh3d>)>,
) -> NodeId {
    let (name, transform) = match nodes.get(entity) {
        Ok((name, transform, _)) => (
            name.map(|n| n.as_str().to_string()).unwrap_or_default(),
            NodeTransform {
                translation: transform.translation,
                rotation: transform.rotation,
                scale: transform.scale,
            },
        ),
        Err(_) => (String::new(), NodeTransform::IDENTITY),
    };
    let id = match parent {
        Some(parent) => graph.add_child(parent, name, transform),
        None => graph.add_root(name, transform),
    };
    node_entities.by_node.insert(id, entity);

    if let Ok(kids) = children.get(entity) {
        for child in kids.iter() {
            let is_primitive = nodes.get(child).map(|(_, _, mesh)| mesh).unwrap_or(false);
            if is_primitive {
                if let Some(node) = graph.node_mut(id) {
                    node.mesh.get_or_insert_with(MeshInfo::default);
                }
            } else {
                mirror_node(child, Some(id), graph, node_entities, children, nodes);
            }
        }
    }
    id
}

/// Copy committed transforms and visibility from the graph onto entities
pub fn sync_graph_changes(
    mut commands: Commands,
    mut showroom: ResMut<Showroom>,
    node_entities: Res<NodeEntities>,
    mut targets: Query<(&mut Transform, Option<&mut Visibility>)>,
) {
    let changed = showroom.ctx.graph.drain_changes();
    if changed.is_empty() {
        return;
    }
    let graph = &showroom.ctx.graph;
    for id in changed {
        let (Some(entity), Some(node)) = (node_entities.get(id), graph.node(id)) else {
            continue;
        };
        let Ok((mut transform, visibility)) = targets.get_mut(entity) else {
            continue;
        };
        *transform = Transform::from_matrix(node.matrix());
        let wanted = if node.visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
        match visibility {
            Some(mut visibility) => *visibility = wanted,
            None => {
                commands.entity(entity).insert(wanted);
            }
        }
    }
}
