//! Tweak panel using bevy_egui

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};

use showroom_core::{BootPhase, DriverPhase, FrameScheduler, PassKind};
use showroom_scene::{RedrawScheduler, Showroom};

pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PanelState>()
            .add_systems(Update, toggle_panel)
            // Runs in EguiPrimaryContextPass for proper input handling (bevy_egui 0.38+)
            .add_systems(EguiPrimaryContextPass, ui_system);
    }
}

#[derive(Resource)]
pub struct PanelState {
    pub visible: bool,
}

impl Default for PanelState {
    fn default() -> Self {
        Self { visible: true }
    }
}

fn toggle_panel(keys: Res<ButtonInput<KeyCode>>, mut panel: ResMut<PanelState>) {
    if keys.just_pressed(KeyCode::KeyH) {
        panel.visible = !panel.visible;
    }
}

fn driver_label(phase: DriverPhase) -> &'static str {
    match phase {
        DriverPhase::NotStarted => "waiting",
        DriverPhase::WarmingUp { .. } => "warming up",
        DriverPhase::Steady => "steady",
    }
}

fn ui_system(
    mut contexts: EguiContexts,
    mut showroom: ResMut<Showroom>,
    mut scheduler: ResMut<RedrawScheduler>,
    panel: Res<PanelState>,
) {
    let Ok(ctx) = contexts.ctx_mut() else { return };

    if let BootPhase::Failed(err) = showroom.boot.phase() {
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                ui.centered_and_justified(|ui| {
                    ui.colored_label(egui::Color32::from_rgb(0xf8, 0x71, 0x71), err.to_string());
                });
            });
        return;
    }

    if !panel.visible {
        return;
    }

    let Showroom { ctx: render, driver, boot, .. } = &mut *showroom;
    let mut changed = false;

    egui::Window::new("Showroom")
        .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-8.0, 8.0))
        .resizable(false)
        .default_width(220.0)
        .show(ctx, |ui| {
            ui.label(format!("{:.0} fps  {:.1} ms", render.stats.fps(), render.stats.frame_ms()));
            ui.label(format!("Startup: {}", boot.phase().label()));
            ui.label(format!("Frame loop: {}", driver_label(driver.phase())));
            if let Some(progress) = boot.load().progress() {
                ui.add(egui::ProgressBar::new(progress).show_percentage());
            }

            ui.separator();
            ui.heading("Bloom");

            let bloom = &mut render.composer.bloom;
            let mut threshold = bloom.threshold();
            if ui.add(egui::Slider::new(&mut threshold, 0.0..=1.0).text("threshold")).changed() {
                bloom.set_threshold(threshold);
                changed = true;
            }
            let mut strength = bloom.strength();
            if ui.add(egui::Slider::new(&mut strength, 0.0..=10.0).text("strength")).changed() {
                bloom.set_strength(strength);
                changed = true;
            }
            let mut radius = bloom.radius();
            if ui.add(egui::Slider::new(&mut radius, 0.0..=1.0).text("radius")).changed() {
                bloom.set_radius(radius);
                changed = true;
            }

            let mut fxaa = render.composer.is_enabled(PassKind::Fxaa);
            if ui.checkbox(&mut fxaa, "FXAA").changed() {
                render.composer.set_enabled(PassKind::Fxaa, fxaa);
                changed = true;
            }

            ui.separator();
            ui.small("Drag to orbit, right-drag to pan, scroll to zoom. H hides this panel.");
        });

    // Parameter changes show up on the next frame even if the loop is idle
    if changed && driver.is_started() {
        scheduler.request_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_label() {
        assert_eq!(driver_label(DriverPhase::NotStarted), "waiting");
        assert_eq!(driver_label(DriverPhase::WarmingUp { started_at: 0.5 }), "warming up");
        assert_eq!(driver_label(DriverPhase::Steady), "steady");
    }

    #[test]
    fn test_panel_visible_by_default() {
        assert!(PanelState::default().visible);
    }
}
