//! Per-frame render/update loop
//!
//! One invocation per display refresh. The order below is the compositing
//! contract: the effects layer is drawn through the post-processing chain
//! first, the depth buffer is cleared, then the full scene is drawn directly
//! on top without clearing colour.
//!
//!  1. request the next invocation (at most one pending)
//!  2. disable auto-clear, clear colour + depth + stencil
//!  3. camera layers = effects
//!  4. composer render (base, FXAA, bloom) to the surface
//!  5. orbit damping
//!  6. effect animators
//!  7. wheels: one clock sample, one angle, four commits
//!  8. clear depth only
//!  9. camera layers = full scene
//! 10. direct scene render
//! 11. stats

use glam::Vec3;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::camera::Camera;
use crate::clock::Clock;
use crate::config::DemoConfig;
use crate::context::RenderContext;
use crate::graph::SceneGraph;
use crate::layers::LayerMask;
use crate::pipeline::{BloomParams, Composer, PassKind};
use crate::rig::{wheel_angle, WheelRig};

/// Which buffers a clear touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearMask {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl ClearMask {
    pub const ALL: Self = Self { color: true, depth: true, stencil: true };
    pub const DEPTH: Self = Self { color: false, depth: true, stencil: false };
}

/// Output surface operations the driver sequences
pub trait RenderBackend {
    fn set_auto_clear(&mut self, enabled: bool);
    fn clear(&mut self, mask: ClearMask);
    /// Run the post-processing chain for the camera's current layers
    fn render_composer(&mut self, composer: &Composer, camera: &Camera);
    /// Draw the scene graph directly, without post-processing
    fn render_scene(&mut self, graph: &SceneGraph, camera: &Camera);
}

/// Display-refresh scheduling hook (`requestAnimationFrame` or equivalent)
pub trait FrameScheduler {
    fn request_frame(&mut self);
}

/// Shared stop flag checked at the top of every invocation
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriverPhase {
    NotStarted,
    WarmingUp { started_at: f32 },
    Steady,
}

/// Observable steps of one invocation, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    Schedule,
    Clear,
    EffectsLayers,
    Composer,
    Controls,
    Animators,
    Wheels,
    ClearDepth,
    FullSceneLayers,
    SceneRender,
    Stats,
}

impl FrameStep {
    pub const ORDER: [FrameStep; 11] = [
        FrameStep::Schedule,
        FrameStep::Clear,
        FrameStep::EffectsLayers,
        FrameStep::Composer,
        FrameStep::Controls,
        FrameStep::Animators,
        FrameStep::Wheels,
        FrameStep::ClearDepth,
        FrameStep::FullSceneLayers,
        FrameStep::SceneRender,
        FrameStep::Stats,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered,
    NotStarted,
    Cancelled,
}

/// Driver tunables
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSettings {
    pub warmup_secs: f32,
    pub wheel_spin_rate: f32,
    /// Camera intro: destination and per-frame lerp while warming up
    pub intro: Option<(Vec3, f32)>,
}

impl From<&DemoConfig> for DriverSettings {
    fn from(config: &DemoConfig) -> Self {
        Self {
            warmup_secs: config.driver.warmup_secs,
            wheel_spin_rate: config.animation.wheel_spin_rate,
            intro: config
                .camera
                .intro_lerp
                .map(|lerp| (Vec3::from_array(config.camera.position), lerp)),
        }
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        (&DemoConfig::default()).into()
    }
}

/// The frame loop state machine
#[derive(Debug)]
pub struct FrameDriver {
    settings: DriverSettings,
    phase: DriverPhase,
    rig: Option<WheelRig>,
    cancel: CancelToken,
    pending: bool,
    intro_finished: bool,
    invocations: u64,
    steps: Vec<FrameStep>,
}

impl FrameDriver {
    pub fn new(settings: DriverSettings) -> Self {
        Self::with_cancel(settings, CancelToken::new())
    }

    pub fn with_cancel(settings: DriverSettings, cancel: CancelToken) -> Self {
        Self {
            settings,
            phase: DriverPhase::NotStarted,
            rig: None,
            cancel,
            pending: false,
            intro_finished: false,
            invocations: 0,
            steps: Vec::with_capacity(FrameStep::ORDER.len()),
        }
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    pub fn is_started(&self) -> bool {
        self.phase != DriverPhase::NotStarted
    }

    pub fn intro_finished(&self) -> bool {
        self.intro_finished
    }

    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Steps executed by the most recent invocation
    pub fn last_steps(&self) -> &[FrameStep] {
        &self.steps
    }

    pub fn rig(&self) -> Option<&WheelRig> {
        self.rig.as_ref()
    }

    /// Begin the loop. Requires the wheel rig, which only exists once the
    /// model has loaded, and requests the first frame immediately.
    pub fn start(&mut self, now: f32, rig: WheelRig, scheduler: &mut dyn FrameScheduler) {
        if self.is_started() {
            warn!("Frame driver already started");
            return;
        }
        info!("Frame driver started");
        self.rig = Some(rig);
        self.phase = DriverPhase::WarmingUp { started_at: now };
        self.request_next(scheduler);
    }

    fn request_next(&mut self, scheduler: &mut dyn FrameScheduler) {
        if !self.pending {
            self.pending = true;
            scheduler.request_frame();
        }
    }

    fn advance_phase(&mut self, now: f32) {
        if let DriverPhase::WarmingUp { started_at } = self.phase {
            if now - started_at >= self.settings.warmup_secs {
                self.phase = DriverPhase::Steady;
                self.intro_finished = true;
                debug!("Frame driver reached steady state");
            }
        }
    }

    /// One display-refresh invocation
    pub fn frame(
        &mut self,
        ctx: &mut RenderContext,
        clock: &dyn Clock,
        backend: &mut dyn RenderBackend,
        scheduler: &mut dyn FrameScheduler,
    ) -> FrameOutcome {
        self.steps.clear();
        self.pending = false;
        if self.cancel.is_cancelled() {
            return FrameOutcome::Cancelled;
        }
        let Some(rig) = self.rig.clone() else {
            return FrameOutcome::NotStarted;
        };
        self.invocations += 1;

        self.request_next(scheduler);
        self.steps.push(FrameStep::Schedule);
        self.advance_phase(clock.elapsed_secs());

        backend.set_auto_clear(false);
        backend.clear(ClearMask::ALL);
        self.steps.push(FrameStep::Clear);

        ctx.camera.layers = LayerMask::EFFECTS;
        self.steps.push(FrameStep::EffectsLayers);

        backend.render_composer(&ctx.composer, &ctx.camera);
        self.steps.push(FrameStep::Composer);

        // Camera intro extension point; off unless configured
        if !self.intro_finished {
            if let Some((destination, lerp)) = self.settings.intro {
                ctx.camera.lerp_toward(destination, lerp);
                ctx.controls.sync_from(&ctx.camera);
            }
        }

        ctx.controls.update(&mut ctx.camera);
        self.steps.push(FrameStep::Controls);

        ctx.effects.advance_all(clock);
        self.steps.push(FrameStep::Animators);

        let t = clock.elapsed_secs();
        rig.spin(&mut ctx.graph, wheel_angle(t, self.settings.wheel_spin_rate));
        self.steps.push(FrameStep::Wheels);

        backend.clear(ClearMask::DEPTH);
        self.steps.push(FrameStep::ClearDepth);

        ctx.camera.layers = LayerMask::FULL_SCENE;
        self.steps.push(FrameStep::FullSceneLayers);

        ctx.graph.update_world();
        backend.render_scene(&ctx.graph, &ctx.camera);
        self.steps.push(FrameStep::SceneRender);

        ctx.stats.update(t);
        self.steps.push(FrameStep::Stats);

        FrameOutcome::Rendered
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Frame must start with auto-clear off and a full clear")]
    MissingInitialClear,
    #[error("Expected exactly one effects draw, found {0}")]
    EffectsDraws(usize),
    #[error("Expected exactly one full-scene draw, found {0}")]
    SceneDraws(usize),
    #[error("Effects draw must use the effects layer, got {0:?}")]
    EffectsLayers(LayerMask),
    #[error("Depth must be cleared, and colour kept, between the effects and scene draws")]
    MissingDepthClear,
}

/// A recorded draw or clear
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOp {
    SetAutoClear(bool),
    Clear(ClearMask),
    Composer {
        layers: LayerMask,
        passes: Vec<PassKind>,
        fxaa: bool,
        bloom: BloomParams,
        size: (u32, u32),
    },
    Scene {
        layers: LayerMask,
        camera_position: Vec3,
        camera_target: Vec3,
    },
}

/// Backend that records operations for an engine to replay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramePlan {
    ops: Vec<FrameOp>,
}

impl FramePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[FrameOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn composer_draw(&self) -> Option<&FrameOp> {
        self.ops.iter().find(|op| matches!(op, FrameOp::Composer { .. }))
    }

    pub fn scene_draw(&self) -> Option<&FrameOp> {
        self.ops.iter().find(|op| matches!(op, FrameOp::Scene { .. }))
    }

    /// Check the two-pass compositing contract
    pub fn validate(&self) -> Result<(), PlanError> {
        match self.ops.as_slice() {
            [FrameOp::SetAutoClear(false), FrameOp::Clear(mask), ..] if *mask == ClearMask::ALL => {}
            _ => return Err(PlanError::MissingInitialClear),
        }
        let composer_at: Vec<usize> = self
            .ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, FrameOp::Composer { .. }))
            .map(|(i, _)| i)
            .collect();
        let scene_at: Vec<usize> = self
            .ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, FrameOp::Scene { .. }))
            .map(|(i, _)| i)
            .collect();
        let [composer] = composer_at.as_slice() else {
            return Err(PlanError::EffectsDraws(composer_at.len()));
        };
        let [scene] = scene_at.as_slice() else {
            return Err(PlanError::SceneDraws(scene_at.len()));
        };
        if let FrameOp::Composer { layers, .. } = &self.ops[*composer] {
            if *layers != LayerMask::EFFECTS {
                return Err(PlanError::EffectsLayers(*layers));
            }
        }
        if scene < composer {
            return Err(PlanError::MissingDepthClear);
        }
        let between = &self.ops[composer + 1..*scene];
        let depth_cleared = between.contains(&FrameOp::Clear(ClearMask::DEPTH));
        let color_cleared = between
            .iter()
            .any(|op| matches!(op, FrameOp::Clear(mask) if mask.color));
        if !depth_cleared || color_cleared {
            return Err(PlanError::MissingDepthClear);
        }
        Ok(())
    }
}

impl RenderBackend for FramePlan {
    fn set_auto_clear(&mut self, enabled: bool) {
        self.ops.push(FrameOp::SetAutoClear(enabled));
    }

    fn clear(&mut self, mask: ClearMask) {
        self.ops.push(FrameOp::Clear(mask));
    }

    fn render_composer(&mut self, composer: &Composer, camera: &Camera) {
        self.ops.push(FrameOp::Composer {
            layers: camera.layers,
            passes: composer.pass_kinds(),
            fxaa: composer.is_enabled(PassKind::Fxaa),
            bloom: composer.bloom,
            size: composer.size(),
        });
    }

    fn render_scene(&mut self, _graph: &SceneGraph, camera: &Camera) {
        self.ops.push(FrameOp::Scene {
            layers: camera.layers,
            camera_position: camera.position,
            camera_target: camera.target,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::graph::Transform;
    use crate::viewport::Viewport;

    #[derive(Default)]
    struct CountingScheduler {
        requests: usize,
    }

    impl FrameScheduler for CountingScheduler {
        fn request_frame(&mut self) {
            self.requests += 1;
        }
    }

    fn rigged_context() -> (RenderContext, WheelRig) {
        let config = DemoConfig::default();
        let mut ctx = RenderContext::new(&config, Viewport::default());
        let car = ctx.graph.add_root("car", Transform::IDENTITY);
        let mut group = car;
        for _ in 0..3 {
            group = ctx.graph.add_child(group, "group", Transform::IDENTITY);
        }
        for i in 0..8 {
            let part = ctx.graph.add_child(group, format!("part_{i}"), Transform::IDENTITY);
            ctx.graph.node_mut(part).unwrap().auto_update = false;
        }
        let rig = WheelRig::resolve(&ctx.graph, car, &config.model.wheel_nodes).unwrap();
        (ctx, rig)
    }

    #[test]
    fn test_not_started_does_nothing() {
        let (mut ctx, _) = rigged_context();
        let mut driver = FrameDriver::new(DriverSettings::default());
        let mut plan = FramePlan::new();
        let mut scheduler = CountingScheduler::default();
        let clock = ManualClock::new(0.0);

        let outcome = driver.frame(&mut ctx, &clock, &mut plan, &mut scheduler);

        assert_eq!(outcome, FrameOutcome::NotStarted);
        assert!(plan.ops().is_empty());
        assert_eq!(scheduler.requests, 0);
        assert_eq!(driver.invocations(), 0);
    }

    #[test]
    fn test_start_requests_first_frame() {
        let (_, rig) = rigged_context();
        let mut driver = FrameDriver::new(DriverSettings::default());
        let mut scheduler = CountingScheduler::default();
        driver.start(0.0, rig.clone(), &mut scheduler);
        assert_eq!(scheduler.requests, 1);
        driver.start(0.0, rig, &mut scheduler);
        assert_eq!(scheduler.requests, 1);
    }

    #[test]
    fn test_step_order_is_fixed() {
        let (mut ctx, rig) = rigged_context();
        let mut driver = FrameDriver::new(DriverSettings::default());
        let mut scheduler = CountingScheduler::default();
        let clock = ManualClock::new(0.0);
        driver.start(0.0, rig, &mut scheduler);

        for i in 0..5 {
            clock.set(i as f32 / 60.0);
            let mut plan = FramePlan::new();
            assert_eq!(driver.frame(&mut ctx, &clock, &mut plan, &mut scheduler), FrameOutcome::Rendered);
            assert_eq!(driver.last_steps(), &FrameStep::ORDER);
            plan.validate().unwrap();
        }
        assert_eq!(ctx.stats.frames(), 5);
    }

    #[test]
    fn test_effects_drawn_before_depth_clear_and_scene() {
        let (mut ctx, rig) = rigged_context();
        let mut driver = FrameDriver::new(DriverSettings::default());
        let mut scheduler = CountingScheduler::default();
        driver.start(0.0, rig, &mut scheduler);
        let mut plan = FramePlan::new();

        driver.frame(&mut ctx, &ManualClock::new(0.5), &mut plan, &mut scheduler);

        let ops = plan.ops();
        assert_eq!(ops[0], FrameOp::SetAutoClear(false));
        assert_eq!(ops[1], FrameOp::Clear(ClearMask::ALL));
        assert!(matches!(&ops[2], FrameOp::Composer { layers, .. } if *layers == LayerMask::EFFECTS));
        assert_eq!(ops[3], FrameOp::Clear(ClearMask::DEPTH));
        assert!(matches!(&ops[4], FrameOp::Scene { layers, .. } if *layers == LayerMask::FULL_SCENE));
        assert_eq!(ops.len(), 5);
    }

    #[test]
    fn test_one_pending_request_per_frame() {
        let (mut ctx, rig) = rigged_context();
        let mut driver = FrameDriver::new(DriverSettings::default());
        let mut scheduler = CountingScheduler::default();
        let clock = ManualClock::new(0.0);
        driver.start(0.0, rig, &mut scheduler);
        for _ in 0..10 {
            driver.frame(&mut ctx, &clock, &mut FramePlan::new(), &mut scheduler);
        }
        // The start request plus one per invocation
        assert_eq!(scheduler.requests, 11);
    }

    #[test]
    fn test_cancel_stops_rescheduling() {
        let (mut ctx, rig) = rigged_context();
        let mut driver = FrameDriver::new(DriverSettings::default());
        let mut scheduler = CountingScheduler::default();
        let clock = ManualClock::new(0.0);
        driver.start(0.0, rig, &mut scheduler);
        driver.frame(&mut ctx, &clock, &mut FramePlan::new(), &mut scheduler);

        driver.cancel_token().cancel();
        let mut plan = FramePlan::new();
        assert_eq!(driver.frame(&mut ctx, &clock, &mut plan, &mut scheduler), FrameOutcome::Cancelled);
        assert!(plan.ops().is_empty());
        assert_eq!(scheduler.requests, 2);
        assert!(driver.last_steps().is_empty());
    }

    #[test]
    fn test_warmup_is_time_triggered() {
        let (mut ctx, rig) = rigged_context();
        let mut driver = FrameDriver::new(DriverSettings::default());
        let mut scheduler = CountingScheduler::default();
        let clock = ManualClock::new(3.0);
        driver.start(3.0, rig, &mut scheduler);

        // Many frames, little time: still warming up
        for _ in 0..1000 {
            driver.frame(&mut ctx, &clock, &mut FramePlan::new(), &mut scheduler);
        }
        assert_eq!(driver.phase(), DriverPhase::WarmingUp { started_at: 3.0 });
        assert!(!driver.intro_finished());

        clock.set(13.0);
        driver.frame(&mut ctx, &clock, &mut FramePlan::new(), &mut scheduler);
        assert_eq!(driver.phase(), DriverPhase::Steady);
        assert!(driver.intro_finished());
    }

    #[test]
    fn test_wheels_follow_clock() {
        let (mut ctx, rig) = rigged_context();
        let wheels = rig.wheels();
        let mut driver = FrameDriver::new(DriverSettings::default());
        let mut scheduler = CountingScheduler::default();
        let clock = ManualClock::new(0.0);
        driver.start(0.0, rig, &mut scheduler);

        let mut previous = f32::MIN;
        for t in [0.25_f32, 1.0, 2.5] {
            clock.set(t);
            driver.frame(&mut ctx, &clock, &mut FramePlan::new(), &mut scheduler);
            let expected = glam::Quat::from_rotation_x(wheel_angle(t, 2.0));
            for id in wheels {
                let node = ctx.graph.node(id).unwrap();
                assert!(node.transform.rotation.abs_diff_eq(expected, 1e-5));
                assert_eq!(node.matrix(), node.transform.to_matrix());
            }
            assert!(wheel_angle(t, 2.0) > previous);
            previous = wheel_angle(t, 2.0);
        }
    }

    #[test]
    fn test_intro_lerp_only_while_warming_up() {
        let (mut ctx, rig) = rigged_context();
        let destination = Vec3::new(5.0, 1.0, 5.0);
        let mut driver = FrameDriver::new(DriverSettings {
            intro: Some((destination, 0.5)),
            ..DriverSettings::default()
        });
        let mut scheduler = CountingScheduler::default();
        let clock = ManualClock::new(0.0);
        driver.start(0.0, rig, &mut scheduler);

        let start = ctx.camera.position;
        driver.frame(&mut ctx, &clock, &mut FramePlan::new(), &mut scheduler);
        let halfway = start.lerp(destination, 0.5);
        assert!(ctx.camera.position.abs_diff_eq(halfway, 1e-4));

        // Past the warmup the intro no longer pulls the camera
        clock.set(20.0);
        driver.frame(&mut ctx, &clock, &mut FramePlan::new(), &mut scheduler);
        let settled = ctx.camera.position;
        clock.set(20.5);
        driver.frame(&mut ctx, &clock, &mut FramePlan::new(), &mut scheduler);
        assert!(ctx.camera.position.abs_diff_eq(settled, 1e-5));
    }

    #[test]
    fn test_no_intro_by_default() {
        let (mut ctx, rig) = rigged_context();
        let mut driver = FrameDriver::new(DriverSettings::default());
        let mut scheduler = CountingScheduler::default();
        let clock = ManualClock::new(0.0);
        driver.start(0.0, rig, &mut scheduler);
        let start = ctx.camera.position;
        for _ in 0..30 {
            driver.frame(&mut ctx, &clock, &mut FramePlan::new(), &mut scheduler);
        }
        assert!(ctx.camera.position.abs_diff_eq(start, 1e-4));
    }

    #[test]
    fn test_plan_validation_rejects_reversed_passes() {
        let mut plan = FramePlan::new();
        let camera = Camera::from_config(&crate::config::CameraConfig::default(), 1.0);
        let composer = Composer::standard(BloomParams::default());
        plan.set_auto_clear(false);
        plan.clear(ClearMask::ALL);
        plan.render_scene(&SceneGraph::new(), &camera);
        plan.clear(ClearMask::DEPTH);
        let mut effects_camera = camera.clone();
        effects_camera.layers = LayerMask::EFFECTS;
        plan.render_composer(&composer, &effects_camera);
        assert_eq!(plan.validate(), Err(PlanError::MissingDepthClear));
    }

    #[test]
    fn test_plan_validation_requires_depth_clear() {
        let mut plan = FramePlan::new();
        let mut camera = Camera::from_config(&crate::config::CameraConfig::default(), 1.0);
        let composer = Composer::standard(BloomParams::default());
        plan.set_auto_clear(false);
        plan.clear(ClearMask::ALL);
        camera.layers = LayerMask::EFFECTS;
        plan.render_composer(&composer, &camera);
        camera.layers = LayerMask::FULL_SCENE;
        plan.render_scene(&SceneGraph::new(), &camera);
        assert_eq!(plan.validate(), Err(PlanError::MissingDepthClear));
    }
}
