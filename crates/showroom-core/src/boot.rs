//! Startup sequence: model load, environment capture, then the frame loop
//!
//! The frame driver cannot run before the car is attached and its
//! environment captured. `Bootstrap` walks those steps in order and hands the
//! wheel rig to the driver only at the end.

use thiserror::Error;
use tracing::{error, info};

use crate::capture::{CaptureError, CaptureRequest, CubeCapturer, EnvironmentCapture};
use crate::clock::Clock;
use crate::config::DemoConfig;
use crate::context::RenderContext;
use crate::driver::{FrameDriver, FrameScheduler};
use crate::graph::{EnvMapId, NodeId, SceneGraph};
use crate::loader::{prepare_model, LoadError, ModelLoad, ModelPrep, ModelSource};
use crate::rig::{RigError, WheelRig};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BootError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Rig(#[from] RigError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("Startup step '{step}' called while {phase}")]
    OutOfOrder { step: &'static str, phase: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BootPhase {
    Loading,
    Capturing,
    Running,
    Failed(BootError),
}

impl BootPhase {
    pub fn label(&self) -> &'static str {
        match self {
            BootPhase::Loading => "loading",
            BootPhase::Capturing => "capturing",
            BootPhase::Running => "running",
            BootPhase::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bootstrap {
    load: ModelLoad<NodeId>,
    prep: ModelPrep,
    wheel_names: Vec<String>,
    capture_resolution: u32,
    capture: Option<EnvironmentCapture>,
    rig: Option<WheelRig>,
    phase: BootPhase,
}

impl Bootstrap {
    pub fn new(config: &DemoConfig) -> Self {
        Self {
            load: ModelLoad::new(ModelSource::from(&config.model)),
            prep: ModelPrep::from(&config.model),
            wheel_names: config.model.wheel_nodes.clone(),
            capture_resolution: config.capture.resolution,
            capture: None,
            rig: None,
            phase: BootPhase::Loading,
        }
    }

    pub fn phase(&self) -> &BootPhase {
        &self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == BootPhase::Running
    }

    pub fn load(&self) -> &ModelLoad<NodeId> {
        &self.load
    }

    pub fn env_map(&self) -> Option<EnvMapId> {
        self.capture.as_ref().and_then(|c| c.env_map())
    }

    pub fn report_progress(&mut self, loaded: u64, total: u64) -> Option<f32> {
        self.load.report_progress(loaded, total)
    }

    fn expect_phase(&self, step: &'static str, expected: &BootPhase) -> Result<(), BootError> {
        if &self.phase != expected {
            return Err(BootError::OutOfOrder {
                step,
                phase: self.phase.label(),
            });
        }
        Ok(())
    }

    fn fail(&mut self, err: BootError) -> BootError {
        if !matches!(err, BootError::Load(_)) {
            error!("Startup failed: {}", err);
        }
        self.phase = BootPhase::Failed(err.clone());
        err
    }

    /// The car subtree is attached under `car_root`. Prepares it, resolves
    /// the wheels and starts the capture, returning what the capturer needs.
    pub fn on_loaded(&mut self, graph: &mut SceneGraph, car_root: NodeId) -> Result<CaptureRequest, BootError> {
        self.expect_phase("model loaded", &BootPhase::Loading)?;
        self.load.resolve(car_root)?;
        prepare_model(graph, car_root, &self.prep);

        let rig = WheelRig::resolve(graph, car_root, &self.wheel_names).map_err(|e| self.fail(e.into()))?;
        let mut capture = EnvironmentCapture::new(car_root, self.capture_resolution);
        let request = capture.begin(graph).map_err(|e| self.fail(e.into()))?;

        self.rig = Some(rig);
        self.capture = Some(capture);
        self.phase = BootPhase::Capturing;
        Ok(request)
    }

    pub fn on_load_failed(&mut self, err: LoadError) -> Result<(), BootError> {
        self.expect_phase("model failed", &BootPhase::Loading)?;
        self.load.reject(err.clone())?;
        self.fail(err.into());
        Ok(())
    }

    /// All six faces are in. Applies the environment and starts the driver,
    /// which requests its first frame right away.
    pub fn on_captured(
        &mut self,
        graph: &mut SceneGraph,
        env_map: EnvMapId,
        driver: &mut FrameDriver,
        now: f32,
        scheduler: &mut dyn FrameScheduler,
    ) -> Result<usize, BootError> {
        self.expect_phase("environment captured", &BootPhase::Capturing)?;
        let Some(capture) = self.capture.as_mut() else {
            return Err(BootError::Capture(CaptureError::NotStarted));
        };
        let assigned = capture.finish(graph, env_map).map_err(|e| self.fail(e.into()))?;
        let Some(rig) = self.rig.take() else {
            return Err(self.fail(BootError::Capture(CaptureError::NotStarted)));
        };
        driver.start(now, rig, scheduler);
        self.phase = BootPhase::Running;
        info!("Showroom running");
        Ok(assigned)
    }

    /// The capturer gave up. The car is shown again and startup stops.
    pub fn on_capture_failed(&mut self, graph: &mut SceneGraph, err: CaptureError) -> BootError {
        if let Some(root) = self.load.loaded().copied() {
            graph.set_visible(root, true);
        }
        self.fail(err.into())
    }

    /// Whole sequence for engines whose capturer finishes in one call
    pub fn run_sync(
        &mut self,
        ctx: &mut RenderContext,
        car_root: NodeId,
        capturer: &mut dyn CubeCapturer,
        driver: &mut FrameDriver,
        clock: &dyn Clock,
        scheduler: &mut dyn FrameScheduler,
    ) -> Result<EnvMapId, BootError> {
        let request = self.on_loaded(&mut ctx.graph, car_root)?;
        let env_map = match capturer.capture(&ctx.graph, &request) {
            Ok(id) => id,
            Err(err) => return Err(self.on_capture_failed(&mut ctx.graph, err)),
        };
        self.on_captured(&mut ctx.graph, env_map, driver, clock.elapsed_secs(), scheduler)?;
        Ok(env_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::driver::{DriverSettings, FrameOutcome, FramePlan};
    use crate::graph::{MeshInfo, Transform};
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

    /// Records what it saw while capturing
    #[derive(Default)]
    struct RecordingCapturer {
        calls: usize,
        car_visible_during_capture: Option<bool>,
        env_maps_during_capture: usize,
        fail: bool,
    }

    struct Watched<'a> {
        inner: &'a mut RecordingCapturer,
        car: NodeId,
    }

    impl CubeCapturer for Watched<'_> {
        fn capture(&mut self, graph: &SceneGraph, _request: &CaptureRequest) -> Result<EnvMapId, CaptureError> {
            self.inner.calls += 1;
            self.inner.car_visible_during_capture = Some(graph.is_effectively_visible(self.car));
            self.inner.env_maps_during_capture = graph
                .descendants(self.car)
                .into_iter()
                .filter(|id| graph.node(*id).and_then(|n| n.mesh).and_then(|m| m.env_map).is_some())
                .count();
            if self.inner.fail {
                return Err(CaptureError::Backend("device lost".into()));
            }
            Ok(EnvMapId(7))
        }
    }

    /// The stock car layout: wheels at every other child of the third nested
    /// group, with `parts` children there in total
    fn attach_car(ctx: &mut RenderContext, parts: usize) -> NodeId {
        let car = ctx.graph.add_root("Sketchfab_Scene", Transform::IDENTITY);
        let mut group = car;
        for name in ["Sketchfab_model", "root", "GLTF_SceneRootNode"] {
            group = ctx.graph.add_child(group, name, Transform::IDENTITY);
        }
        let body = ctx.graph.add_child(car, "body", Transform::IDENTITY);
        ctx.graph.node_mut(body).unwrap().mesh = Some(MeshInfo::default());
        for i in 0..parts {
            let part = ctx.graph.add_child(group, format!("part_{i}"), Transform::IDENTITY);
            ctx.graph.node_mut(part).unwrap().mesh = Some(MeshInfo::default());
        }
        car
    }

    fn setup() -> (DemoConfig, RenderContext, Bootstrap, FrameDriver) {
        let config = DemoConfig::default();
        let ctx = RenderContext::new(&config, Viewport::default());
        let boot = Bootstrap::new(&config);
        let driver = FrameDriver::new(DriverSettings::from(&config));
        (config, ctx, boot, driver)
    }

    #[test]
    fn test_no_frames_before_load_then_immediate_schedule() {
        let (_, mut ctx, mut boot, mut driver) = setup();
        let mut scheduler = CountingScheduler::default();
        let clock = ManualClock::new(0.0);

        // Display refreshes while the model is still in flight
        for i in 0..120 {
            clock.set(i as f32 / 60.0);
            let mut plan = FramePlan::new();
            assert_eq!(driver.frame(&mut ctx, &clock, &mut plan, &mut scheduler), FrameOutcome::NotStarted);
            assert!(plan.ops().is_empty());
        }
        assert_eq!(driver.invocations(), 0);
        assert_eq!(scheduler.requests, 0);

        let car = attach_car(&mut ctx, 8);
        let request = boot.on_loaded(&mut ctx.graph, car).unwrap();
        assert_eq!(request.resolution, 256);
        assert_eq!(*boot.phase(), BootPhase::Capturing);
        assert_eq!(scheduler.requests, 0);

        boot.on_captured(&mut ctx.graph, EnvMapId(1), &mut driver, clock.elapsed_secs(), &mut scheduler)
            .unwrap();
        assert!(boot.is_running());
        assert_eq!(scheduler.requests, 1);
        assert!(driver.is_started());
    }

    #[test]
    fn test_capture_after_attach_with_car_hidden() {
        let (_, mut ctx, mut boot, mut driver) = setup();
        let mut scheduler = CountingScheduler::default();
        let car = attach_car(&mut ctx, 8);
        let mut capturer = RecordingCapturer::default();

        let env_map = boot
            .run_sync(
                &mut ctx,
                car,
                &mut Watched { inner: &mut capturer, car },
                &mut driver,
                &ManualClock::new(0.0),
                &mut scheduler,
            )
            .unwrap();

        assert_eq!(capturer.calls, 1);
        assert_eq!(capturer.car_visible_during_capture, Some(false));
        assert_eq!(capturer.env_maps_during_capture, 0);
        assert!(ctx.graph.is_effectively_visible(car));
        assert_eq!(boot.env_map(), Some(env_map));
        for id in ctx.graph.descendants(car) {
            if let Some(mesh) = ctx.graph.node(id).unwrap().mesh {
                assert_eq!(mesh.env_map, Some(env_map));
                assert_eq!(mesh.env_intensity, 20.0);
            }
        }
    }

    #[test]
    fn test_capture_runs_once() {
        let (_, mut ctx, mut boot, mut driver) = setup();
        let mut scheduler = CountingScheduler::default();
        let car = attach_car(&mut ctx, 8);
        boot.on_loaded(&mut ctx.graph, car).unwrap();
        boot.on_captured(&mut ctx.graph, EnvMapId(1), &mut driver, 0.0, &mut scheduler)
            .unwrap();

        let again = boot.on_captured(&mut ctx.graph, EnvMapId(2), &mut driver, 0.0, &mut scheduler);
        assert!(matches!(again, Err(BootError::OutOfOrder { .. })));
        assert_eq!(boot.env_map(), Some(EnvMapId(1)));
        assert_eq!(scheduler.requests, 1);
    }

    #[test]
    fn test_load_failure_settles() {
        let (_, mut ctx, mut boot, mut driver) = setup();
        let err = LoadError::NotFound("models/chevrolet-c7/scene.gltf".into());
        boot.on_load_failed(err.clone()).unwrap();

        assert_eq!(*boot.phase(), BootPhase::Failed(BootError::Load(err)));
        assert!(boot.load().is_settled());

        let car = ctx.graph.add_root("late", Transform::IDENTITY);
        assert!(matches!(
            boot.on_loaded(&mut ctx.graph, car),
            Err(BootError::OutOfOrder { .. })
        ));
        let mut scheduler = CountingScheduler::default();
        let outcome = driver.frame(&mut ctx, &ManualClock::new(1.0), &mut FramePlan::new(), &mut scheduler);
        assert_eq!(outcome, FrameOutcome::NotStarted);
    }

    #[test]
    fn test_missing_wheel_fails_fast() {
        let (_, mut ctx, mut boot, _) = setup();
        // Rear right wheel slot is absent
        let car = attach_car(&mut ctx, 6);

        let err = boot.on_loaded(&mut ctx.graph, car).unwrap_err();
        assert_eq!(err, BootError::Rig(RigError::MissingWheel("0/0/0/6".into())));
        assert_eq!(*boot.phase(), BootPhase::Failed(err));
        // Capture never began
        assert!(ctx.graph.is_effectively_visible(car));
    }

    #[test]
    fn test_capture_failure_shows_car() {
        let (_, mut ctx, mut boot, mut driver) = setup();
        let mut scheduler = CountingScheduler::default();
        let car = attach_car(&mut ctx, 8);
        let mut capturer = RecordingCapturer {
            fail: true,
            ..RecordingCapturer::default()
        };

        let result = boot.run_sync(
            &mut ctx,
            car,
            &mut Watched { inner: &mut capturer, car },
            &mut driver,
            &ManualClock::new(0.0),
            &mut scheduler,
        );

        assert!(matches!(result, Err(BootError::Capture(CaptureError::Backend(_)))));
        assert!(ctx.graph.is_effectively_visible(car));
        assert!(!driver.is_started());
        assert_eq!(scheduler.requests, 0);
    }
}
