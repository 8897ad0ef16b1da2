//! Showroom Core - Engine-agnostic logic of the car showroom demo
//!
//! This crate owns everything about the demo that does not need a GPU:
//! - Scene graph mirror with explicit transform commits
//! - Model load contract, wheel rig and one-shot environment capture
//! - Post-processing pipeline description and viewport sizing
//! - The ordered per-frame driver and the startup sequence feeding it

pub mod boot;
pub mod camera;
pub mod capture;
pub mod clock;
pub mod config;
pub mod context;
pub mod driver;
pub mod effects;
pub mod error;
pub mod graph;
pub mod layers;
pub mod loader;
pub mod pipeline;
pub mod rig;
pub mod stats;
pub mod viewport;

pub use boot::{BootError, BootPhase, Bootstrap};
pub use camera::{Camera, OrbitControls};
pub use capture::{CaptureError, CaptureRequest, CubeCapturer, CubeFace, CubeMap, CubeMapBuilder, EnvironmentCapture};
pub use clock::{Clock, FrozenClock, ManualClock};
pub use config::{ConfigError, DemoConfig};
pub use context::RenderContext;
pub use driver::{
    CancelToken, ClearMask, DriverPhase, DriverSettings, FrameDriver, FrameOp, FrameOutcome, FramePlan,
    FrameScheduler, FrameStep, PlanError, RenderBackend,
};
pub use effects::{Animator, Effects};
pub use error::ShowroomError;
pub use graph::{EnvMapId, MeshInfo, NodeId, SceneGraph, Transform};
pub use layers::LayerMask;
pub use loader::{LoadError, LoadState, ModelLoad, ModelPrep, ModelSource};
pub use pipeline::{BloomParams, Composer, PassKind, PipelineError};
pub use rig::{RigError, WheelRig};
pub use stats::FrameStats;
pub use viewport::{Viewport, ViewportError};
