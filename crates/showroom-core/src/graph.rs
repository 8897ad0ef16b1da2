//! Scene-graph mirror with explicit transform commits
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Each node keeps its
//! editable [`Transform`] separate from the cached local matrix actually used
//! for drawing. Nodes with `auto_update` disabled (everything under the loaded
//! car) only refresh that matrix when [`SceneGraph::commit_transform`] is
//! called, so forgetting the commit leaves stale geometry on screen.

use glam::{Mat4, Quat, Vec3};

use crate::layers::LayerMask;

/// Stable handle into a [`SceneGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Handle to a captured environment cube map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvMapId(pub u32);

/// Translation, rotation and scale of a node relative to its parent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::IDENTITY }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Mesh payload flags relevant to lighting and reflections
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshInfo {
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    /// Multiplier applied to environment reflections
    pub env_intensity: f32,
    pub env_map: Option<EnvMapId>,
}

impl Default for MeshInfo {
    fn default() -> Self {
        Self {
            cast_shadow: false,
            receive_shadow: false,
            env_intensity: 1.0,
            env_map: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub visible: bool,
    pub layers: LayerMask,
    pub mesh: Option<MeshInfo>,
    /// When false the cached matrix only follows `transform` on commit
    pub auto_update: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    matrix: Mat4,
    world: Mat4,
    pending_sync: bool,
}

impl Node {
    fn new(name: impl Into<String>, transform: Transform, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            transform,
            visible: true,
            layers: LayerMask::default(),
            mesh: None,
            auto_update: true,
            parent,
            children: Vec::new(),
            matrix: transform.to_matrix(),
            world: Mat4::IDENTITY,
            pending_sync: false,
        }
    }

    /// Local matrix as last committed
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// World matrix as of the last [`SceneGraph::update_world`]
    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn is_mesh(&self) -> bool {
        self.mesh.is_some()
    }
}

/// Arena-backed scene tree
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    changed: Vec<NodeId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn add_root(&mut self, name: impl Into<String>, transform: Transform) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name, transform, None));
        self.roots.push(id);
        id
    }

    /// Append a child under `parent`. Panics if `parent` is not in this graph.
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>, transform: Transform) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name, transform, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Depth-first pre-order walk of `start` and everything below it
    pub fn descendants(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.node(start).is_none() {
            return out;
        }
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            out.push(id);
            // Reverse so children come out in declaration order
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// All nodes in the subtree of `start` whose name equals `name`
    pub fn find_by_name(&self, start: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(start)
            .into_iter()
            .filter(|id| self.nodes[id.0].name == name)
            .collect()
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            if node.visible != visible {
                node.visible = visible;
                self.mark_changed(id);
            }
        }
    }

    /// Visible only if the node and all of its ancestors are visible
    pub fn is_effectively_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            match self.node(cur) {
                Some(node) if node.visible => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// Bake the editable transform into the node's local matrix.
    ///
    /// Required after any manual edit on a node with `auto_update` disabled.
    pub fn commit_transform(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.matrix = node.transform.to_matrix();
            self.mark_changed(id);
        }
    }

    /// Recompute world matrices for the whole graph.
    ///
    /// Auto-updating nodes refresh their local matrix first; the others use
    /// whatever was last committed.
    pub fn update_world(&mut self) {
        let roots = self.roots.clone();
        for root in roots {
            self.update_subtree(root, Mat4::IDENTITY);
        }
    }

    fn update_subtree(&mut self, root: NodeId, parent_world: Mat4) {
        let mut stack = vec![(root, parent_world)];
        while let Some((id, parent_world)) = stack.pop() {
            let node = &mut self.nodes[id.0];
            if node.auto_update {
                let fresh = node.transform.to_matrix();
                if fresh != node.matrix {
                    node.matrix = fresh;
                    if !node.pending_sync {
                        node.pending_sync = true;
                        self.changed.push(id);
                    }
                }
            }
            let node = &mut self.nodes[id.0];
            node.world = parent_world * node.matrix;
            let world = node.world;
            stack.extend(node.children.iter().map(|&c| (c, world)));
        }
    }

    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        self.node(id).map(|n| n.world)
    }

    /// World-space position of a node, computed from committed matrices
    /// without relying on a prior [`SceneGraph::update_world`]
    pub fn world_position(&self, id: NodeId) -> Option<Vec3> {
        let mut matrix = self.node(id)?.matrix;
        let mut current = self.parent(id);
        while let Some(parent) = current {
            matrix = self.nodes[parent.0].matrix * matrix;
            current = self.parent(parent);
        }
        Some(matrix.w_axis.truncate())
    }

    /// Nodes whose committed matrix or visibility changed since the last drain
    pub fn drain_changes(&mut self) -> Vec<NodeId> {
        let changed = std::mem::take(&mut self.changed);
        for id in &changed {
            self.nodes[id.0].pending_sync = false;
        }
        changed
    }

    fn mark_changed(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.0];
        if !node.pending_sync {
            node.pending_sync = true;
            self.changed.push(id);
        }
    }
}
