//! Frame loop on top of Bevy's reactive update
//!
//! The core driver runs once per requested redraw and records a frame plan.
//! The plan is replayed onto the two view cameras: the effects camera (order
//! 0, cleared, bloom + FXAA) and the scene camera (order 1, colour kept, own
//! depth). Bevy applies FXAA after bloom within a camera; the effects pass
//! keeps both but in that order.

use bevy::anti_alias::fxaa::Fxaa;
use bevy::camera::visibility::RenderLayers;
use bevy::post_process::bloom::{Bloom, BloomCompositeMode, BloomPrefilter};
use bevy::prelude::*;
use bevy::window::{WindowClosing, WindowResized};
use tracing::{debug, info, warn};

use showroom_core::{BloomParams, FrameOp, FrameOutcome, FrozenClock};

use crate::scene::{perspective, render_layers, view_transform, EffectsCamera, SceneCamera};
use crate::state::{CurrentPlan, RedrawScheduler, Showroom};

pub struct FrameDriverPlugin;

impl Plugin for FrameDriverPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RedrawScheduler>()
            .init_resource::<CurrentPlan>()
            .add_systems(Update, (track_window_size, cancel_on_close))
            .add_systems(
                Update,
                (drive_frame, apply_frame_plan)
                    .chain()
                    .after(crate::camera::orbit_input)
                    .after(track_window_size),
            );
    }
}

/// Bloom settings equivalent to the pipeline's strength/radius/threshold
pub fn bloom_from_params(params: &BloomParams) -> Bloom {
    Bloom {
        intensity: params.strength() / 10.0,
        low_frequency_boost: params.radius(),
        prefilter: BloomPrefilter {
            threshold: params.threshold(),
            threshold_softness: 0.0,
        },
        composite_mode: BloomCompositeMode::Additive,
        ..Bloom::NATURAL
    }
}

pub(crate) fn drive_frame(
    mut showroom: ResMut<Showroom>,
    mut scheduler: ResMut<RedrawScheduler>,
    mut plan: ResMut<CurrentPlan>,
    time: Res<Time>,
) {
    if !scheduler.take_request() {
        return;
    }
    let clock = FrozenClock(time.elapsed_secs());
    let Showroom { ctx, driver, .. } = &mut *showroom;
    plan.0.clear_ops();
    match driver.frame(ctx, &clock, &mut plan.0, &mut *scheduler) {
        FrameOutcome::Rendered => {}
        FrameOutcome::Cancelled => debug!("Frame loop cancelled"),
        FrameOutcome::NotStarted => {}
    }
}

/// Replay the recorded passes onto the view cameras
fn apply_frame_plan(
    showroom: Res<Showroom>,
    plan: Res<CurrentPlan>,
    mut effects_camera: Query<
        (&mut RenderLayers, &mut Bloom, &mut Fxaa, &mut Transform, &mut Projection),
        (With<EffectsCamera>, Without<SceneCamera>),
    >,
    mut scene_camera: Query<
        (&mut RenderLayers, &mut Transform, &mut Projection),
        (With<SceneCamera>, Without<EffectsCamera>),
    >,
) {
    if !plan.is_changed() || plan.0.ops().is_empty() {
        return;
    }
    if let Err(err) = plan.0.validate() {
        warn!("Frame plan rejected: {}", err);
        return;
    }
    let view = &showroom.ctx.camera;

    if let (Some(FrameOp::Composer { layers, fxaa, bloom, .. }), Ok((mut cam_layers, mut cam_bloom, mut cam_fxaa, mut transform, mut projection))) =
        (plan.0.composer_draw(), effects_camera.single_mut())
    {
        *cam_layers = render_layers(*layers);
        *cam_bloom = bloom_from_params(bloom);
        cam_fxaa.enabled = *fxaa;
        *transform = view_transform(view);
        *projection = perspective(view);
    }

    if let (Some(FrameOp::Scene { layers, .. }), Ok((mut cam_layers, mut transform, mut projection))) =
        (plan.0.scene_draw(), scene_camera.single_mut())
    {
        *cam_layers = render_layers(*layers);
        *transform = view_transform(view);
        *projection = perspective(view);
    }
}

/// Feed window size changes into camera aspect and composer size
fn track_window_size(mut showroom: ResMut<Showroom>, mut resized: MessageReader<WindowResized>, windows: Query<&Window>) {
    let Some(last) = resized.read().last() else {
        return;
    };
    let (width, height) = (last.width.round() as u32, last.height.round() as u32);
    if let Ok(window) = windows.get(last.window) {
        showroom.ctx.viewport.pixel_ratio = window.scale_factor();
    }
    match showroom.ctx.resize(width, height) {
        Ok(()) => debug!("Viewport resized to {}x{}", width, height),
        // Minimised windows report zero; keep the last good size
        Err(err) => debug!("Ignoring resize: {}", err),
    }
}

fn cancel_on_close(showroom: Res<Showroom>, mut closing: MessageReader<WindowClosing>) {
    if closing.read().next().is_some() {
        showroom.driver.cancel_token().cancel();
        info!("Frame loop cancelled on window close");
    }
}
