//! Shared resources and the startup state

use bevy::prelude::*;
use bevy::window::RequestRedraw;
use std::collections::HashMap;

use showroom_core::{
    Bootstrap, DemoConfig, DriverSettings, FrameDriver, FramePlan, FrameScheduler, NodeId, RenderContext,
    Viewport,
};

/// Mirrors `BootPhase` so systems can be gated with `in_state`
#[derive(States, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DemoState {
    #[default]
    Loading,
    Capturing,
    Running,
    Failed,
}

/// The render context plus the driver and startup sequence that own it
#[derive(Resource)]
pub struct Showroom {
    pub config: DemoConfig,
    pub ctx: RenderContext,
    pub driver: FrameDriver,
    pub boot: Bootstrap,
}

impl Showroom {
    pub fn new(config: DemoConfig) -> Self {
        let ctx = RenderContext::new(&config, Viewport::default());
        let driver = FrameDriver::new(DriverSettings::from(&config));
        let boot = Bootstrap::new(&config);
        Self {
            config,
            ctx,
            driver,
            boot,
        }
    }
}

/// Scene graph node to the entity it mirrors
#[derive(Resource, Default)]
pub struct NodeEntities {
    pub by_node: HashMap<NodeId, Entity>,
}

impl NodeEntities {
    pub fn get(&self, id: NodeId) -> Option<Entity> {
        self.by_node.get(&id).copied()
    }
}

/// `requestAnimationFrame` for the reactive winit loop: a request marks the
/// next update as a frame and asks winit for a redraw
#[derive(Resource, Default)]
pub struct RedrawScheduler {
    requested: bool,
}

impl RedrawScheduler {
    /// Consume the pending request, if any
    pub fn take_request(&mut self) -> bool {
        std::mem::take(&mut self.requested)
    }

    pub fn is_requested(&self) -> bool {
        self.requested
    }
}

impl FrameScheduler for RedrawScheduler {
    fn request_frame(&mut self) {
        self.requested = true;
    }
}

/// Ops recorded by the most recent driver invocation
#[derive(Resource, Default)]
pub struct CurrentPlan(pub FramePlan);

pub(crate) fn emit_redraw(scheduler: Res<RedrawScheduler>, mut redraw: MessageWriter<RequestRedraw>) {
    if scheduler.is_requested() {
        redraw.write(RequestRedraw);
    }
}

/// Follow `BootPhase` failures that happen outside a state-specific system
pub(crate) fn follow_boot_failure(showroom: Res<Showroom>, mut next_state: ResMut<NextState<DemoState>>) {
    if matches!(showroom.boot.phase(), showroom_core::BootPhase::Failed(_)) {
        next_state.set(DemoState::Failed);
    }
}
