//! Car model load contract and post-load normalisation
//!
//! The engine owns the actual file fetch and glTF decode. This module owns what
//! happens around it: the single-settlement state of the pending load, progress
//! reporting, and the preparation applied to the loaded subtree.

use glam::Vec3;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::ModelConfig;
use crate::graph::{NodeId, SceneGraph};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Model not found: {0}")]
    NotFound(String),
    #[error("Failed to decode model {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("Model load already settled")]
    AlreadySettled,
}

/// Fixed asset inputs of the demo
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSource {
    pub path: String,
    pub decoder_path: String,
}

impl From<&ModelConfig> for ModelSource {
    fn from(config: &ModelConfig) -> Self {
        Self {
            path: config.path.clone(),
            decoder_path: config.decoder_path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Pending,
    Loaded(T),
    Failed(LoadError),
}

/// A model load that settles exactly once, either way
#[derive(Debug, Clone)]
pub struct ModelLoad<T> {
    source: ModelSource,
    state: LoadState<T>,
    progress: Option<f32>,
}

impl<T> ModelLoad<T> {
    pub fn new(source: ModelSource) -> Self {
        info!("Loading model {}", source.path);
        Self {
            source,
            state: LoadState::Pending,
            progress: None,
        }
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub fn state(&self) -> &LoadState<T> {
        &self.state
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self.state, LoadState::Pending)
    }

    pub fn progress(&self) -> Option<f32> {
        self.progress
    }

    /// Record fetch progress. Purely informational.
    pub fn report_progress(&mut self, loaded: u64, total: u64) -> Option<f32> {
        if total == 0 || self.is_settled() {
            return self.progress;
        }
        let fraction = (loaded.min(total) as f64 / total as f64) as f32;
        debug!("{:.0}% loaded", fraction * 100.0);
        self.progress = Some(fraction);
        self.progress
    }

    pub fn resolve(&mut self, value: T) -> Result<(), LoadError> {
        if self.is_settled() {
            return Err(LoadError::AlreadySettled);
        }
        info!("Model loaded: {}", self.source.path);
        self.progress = Some(1.0);
        self.state = LoadState::Loaded(value);
        Ok(())
    }

    /// Settle the load as failed. The error is logged and kept; nothing retries.
    pub fn reject(&mut self, err: LoadError) -> Result<(), LoadError> {
        if self.is_settled() {
            return Err(LoadError::AlreadySettled);
        }
        error!("Error loading model {}: {}", self.source.path, err);
        self.state = LoadState::Failed(err);
        Ok(())
    }

    pub fn loaded(&self) -> Option<&T> {
        match &self.state {
            LoadState::Loaded(value) => Some(value),
            _ => None,
        }
    }
}

/// Normalisation applied to the car subtree once it arrives
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrep {
    pub scale: f32,
    pub position: Vec3,
    pub env_intensity: f32,
}

impl From<&ModelConfig> for ModelPrep {
    fn from(config: &ModelConfig) -> Self {
        Self {
            scale: config.scale,
            position: Vec3::from_array(config.position),
            env_intensity: config.env_intensity,
        }
    }
}

impl Default for ModelPrep {
    fn default() -> Self {
        (&ModelConfig::default()).into()
    }
}

/// Scale and place the root, freeze automatic matrix updates on every node,
/// enable shadows and boost reflections on every mesh, then commit.
pub fn prepare_model(graph: &mut SceneGraph, root: NodeId, prep: &ModelPrep) {
    if let Some(node) = graph.node_mut(root) {
        node.transform.scale = Vec3::splat(prep.scale);
        node.transform.translation = prep.position;
    }
    let subtree = graph.descendants(root);
    let mut meshes = 0usize;
    for id in &subtree {
        if let Some(node) = graph.node_mut(*id) {
            node.auto_update = false;
            if let Some(mesh) = node.mesh.as_mut() {
                mesh.cast_shadow = true;
                mesh.receive_shadow = true;
                mesh.env_intensity = prep.env_intensity;
                meshes += 1;
            }
        }
        graph.commit_transform(*id);
    }
    debug!("Prepared model: {} nodes, {} meshes", subtree.len(), meshes);
}
