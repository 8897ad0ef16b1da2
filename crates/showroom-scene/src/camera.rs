//! Pointer and touch input feeding the damped orbit controls

use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::prelude::*;
use bevy_egui::EguiContexts;

use crate::state::Showroom;

pub struct OrbitInputPlugin;

impl Plugin for OrbitInputPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, orbit_input);
    }
}

/// Queue orbit, pan and zoom. Damping happens in the frame driver.
pub fn orbit_input(
    mut showroom: ResMut<Showroom>,
    mut mouse_motion: MessageReader<MouseMotion>,
    mut mouse_wheel: MessageReader<MouseWheel>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    touch_input: Res<Touches>,
    mut contexts: EguiContexts,
) {
    // Check if egui wants the mouse - if so, don't process camera controls
    let egui_wants_pointer = contexts
        .ctx_mut()
        .map(|ctx| ctx.wants_pointer_input())
        .unwrap_or(false);

    let mut total_motion = Vec2::ZERO;
    for motion in mouse_motion.read() {
        total_motion += motion.delta;
    }
    let scroll: f32 = mouse_wheel.read().map(|wheel| wheel.y).sum();
    if egui_wants_pointer {
        return;
    }

    let controls = &mut showroom.ctx.controls;
    if mouse_button.pressed(MouseButton::Left) {
        controls.rotate(total_motion.x, total_motion.y);
    }
    if mouse_button.pressed(MouseButton::Right) {
        controls.pan(total_motion.x, total_motion.y);
    }
    if scroll != 0.0 {
        controls.zoom(scroll);
    }

    match touch_input.iter().count() {
        1 => {
            for touch in touch_input.iter() {
                let delta = touch.delta();
                if delta != Vec2::ZERO {
                    controls.rotate(delta.x, delta.y);
                }
            }
        }
        2 => {
            // Pinch to zoom
            let touches: Vec<_> = touch_input.iter().collect();
            let curr_dist = touches[0].position().distance(touches[1].position());
            let prev_dist = (touches[0].position() - touches[0].delta())
                .distance(touches[1].position() - touches[1].delta());
            if curr_dist > 1.0 && prev_dist > 1.0 {
                controls.zoom((curr_dist / prev_dist).ln() / controls.zoom_speed);
            }
        }
        _ => {}
    }
}
