//! Crate-wide error aggregation

use thiserror::Error;

use crate::boot::BootError;
use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::loader::LoadError;
use crate::pipeline::PipelineError;
use crate::rig::RigError;
use crate::viewport::ViewportError;

#[derive(Error, Debug)]
pub enum ShowroomError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Rig(#[from] RigError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Viewport(#[from] ViewportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Boot(#[from] BootError),
}
