//! Wheel rig resolved once from the loaded car
//!
//! A wheel entry is either a child-index path from the car root, written as
//! `"0/0/0/2"`, or an exact node name.

use glam::{EulerRot, Quat};
use thiserror::Error;
use tracing::debug;

use crate::graph::{NodeId, SceneGraph};

pub const WHEEL_COUNT: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RigError {
    #[error("Expected 4 wheel entries, got {0}")]
    WrongCount(usize),
    #[error("Wheel entry '{0}' is empty")]
    EmptySelector(String),
    #[error("Wheel node '{0}' not found in model")]
    MissingWheel(String),
    #[error("Wheel node name '{0}' matches more than one node")]
    AmbiguousWheel(String),
}

/// How a wheel is found below the car root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WheelSelector {
    /// Child indices, one per level
    Path(Vec<usize>),
    Name(String),
}

impl WheelSelector {
    /// All-numeric `/`-separated entries are paths; anything else is a name
    pub fn parse(entry: &str) -> Result<Self, RigError> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(RigError::EmptySelector(entry.to_string()));
        }
        let indices: Result<Vec<usize>, _> = entry.split('/').map(str::parse).collect();
        Ok(match indices {
            Ok(path) => Self::Path(path),
            Err(_) => Self::Name(entry.to_string()),
        })
    }

    fn find(&self, graph: &SceneGraph, car_root: NodeId, entry: &str) -> Result<NodeId, RigError> {
        match self {
            Self::Path(path) => path
                .iter()
                .try_fold(car_root, |node, &index| graph.children(node).get(index).copied())
                .ok_or_else(|| RigError::MissingWheel(entry.to_string())),
            Self::Name(name) => match graph.find_by_name(car_root, name).as_slice() {
                [] => Err(RigError::MissingWheel(entry.to_string())),
                [single] => Ok(*single),
                _ => Err(RigError::AmbiguousWheel(entry.to_string())),
            },
        }
    }
}

/// Spin angle in radians after `elapsed` seconds
pub fn wheel_angle(elapsed: f32, spin_rate: f32) -> f32 {
    elapsed * spin_rate
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Wheel {
    node: NodeId,
    /// Authored yaw and roll, kept while the X angle is overwritten
    base_y: f32,
    base_z: f32,
}

/// Stable handles to the car root and its four wheels.
///
/// Only obtainable from a loaded model, so holding one proves the load resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct WheelRig {
    car_root: NodeId,
    wheels: [Wheel; WHEEL_COUNT],
}

impl WheelRig {
    /// Look up each wheel inside `car_root`'s subtree by path or name
    pub fn resolve(graph: &SceneGraph, car_root: NodeId, entries: &[String]) -> Result<Self, RigError> {
        if entries.len() != WHEEL_COUNT {
            return Err(RigError::WrongCount(entries.len()));
        }
        let mut wheels = Vec::with_capacity(WHEEL_COUNT);
        for entry in entries {
            let node = WheelSelector::parse(entry)?.find(graph, car_root, entry)?;
            let rotation = graph.node(node).map(|n| n.transform.rotation).unwrap_or(Quat::IDENTITY);
            let (_, base_y, base_z) = rotation.to_euler(EulerRot::XYZ);
            wheels.push(Wheel { node, base_y, base_z });
        }
        debug!("Resolved wheel rig: {:?}", wheels.iter().map(|w| w.node).collect::<Vec<_>>());
        Ok(Self {
            car_root,
            wheels: [wheels[0], wheels[1], wheels[2], wheels[3]],
        })
    }

    pub fn car_root(&self) -> NodeId {
        self.car_root
    }

    pub fn wheels(&self) -> [NodeId; WHEEL_COUNT] {
        self.wheels.map(|w| w.node)
    }

    /// Set every wheel's X rotation to `angle` and commit its transform
    pub fn spin(&self, graph: &mut SceneGraph, angle: f32) {
        for wheel in &self.wheels {
            if let Some(node) = graph.node_mut(wheel.node) {
                node.transform.rotation = Quat::from_euler(EulerRot::XYZ, angle, wheel.base_y, wheel.base_z);
            }
            graph.commit_transform(wheel.node);
        }
    }
}
