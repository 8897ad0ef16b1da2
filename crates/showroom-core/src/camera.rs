//! Perspective camera and damped orbit navigation

use glam::{Mat4, Vec3};

use crate::config::CameraConfig;
use crate::layers::LayerMask;

/// Perspective camera with a visibility layer mask
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Layers drawn by the pass currently using this camera
    pub layers: LayerMask,
}

impl Camera {
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            position: Vec3::from_array(config.position),
            target: Vec3::from_array(config.target),
            up: Vec3::Y,
            fov_y: config.fov_degrees.to_radians(),
            aspect,
            near: config.near,
            far: config.far,
            layers: LayerMask::default(),
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn look_direction(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Move a fraction `t` of the way toward `destination`
    pub fn lerp_toward(&mut self, destination: Vec3, t: f32) {
        self.position = self.position.lerp(destination, t.clamp(0.0, 1.0));
    }
}

/// Accumulated user motion not yet applied to the camera
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct OrbitDelta {
    azimuth: f32,
    elevation: f32,
    /// Natural log of the distance scale
    zoom: f32,
    pan: Vec3,
}

impl OrbitDelta {
    fn scaled(&self, factor: f32) -> Self {
        Self {
            azimuth: self.azimuth * factor,
            elevation: self.elevation * factor,
            zoom: self.zoom * factor,
            pan: self.pan * factor,
        }
    }

    fn is_negligible(&self) -> bool {
        const EPS: f32 = 1e-5;
        self.azimuth.abs() < EPS
            && self.elevation.abs() < EPS
            && self.zoom.abs() < EPS
            && self.pan.length_squared() < EPS * EPS
    }
}

/// Orbit controller around a target point (Y up).
///
/// Input methods only queue motion; [`OrbitControls::update`] applies a
/// `damping_factor` share of the queue each frame and decays the rest, which
/// gives drags their trailing momentum.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub azimuth: f32,
    pub elevation: f32,
    pub distance: f32,
    pub target: Vec3,
    pub sensitivity: f32,
    pub zoom_speed: f32,
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pending: OrbitDelta,
}

const ELEVATION_LIMIT: f32 = 1.5;

impl OrbitControls {
    /// Derive orbit state from where the camera currently is
    pub fn from_camera(camera: &Camera, damping_factor: f32) -> Self {
        let offset = camera.position - camera.target;
        let distance = offset.length().max(1e-3);
        Self {
            azimuth: offset.x.atan2(offset.z),
            elevation: (offset.y / distance).clamp(-1.0, 1.0).asin(),
            distance,
            target: camera.target,
            sensitivity: 0.005,
            zoom_speed: 0.1,
            damping_factor,
            min_distance: 0.5,
            max_distance: 20.0,
            pending: OrbitDelta::default(),
        }
    }

    /// Re-read the orbit after something else moved the camera, keeping
    /// any queued momentum
    pub fn sync_from(&mut self, camera: &Camera) {
        let offset = camera.position - camera.target;
        self.distance = offset.length().max(1e-3);
        self.azimuth = offset.x.atan2(offset.z);
        self.elevation = (offset.y / self.distance).clamp(-1.0, 1.0).asin();
        self.target = camera.target;
    }

    /// Queue an orbit from a pointer drag in pixels
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.pending.azimuth -= dx * self.sensitivity;
        self.pending.elevation += dy * self.sensitivity;
    }

    /// Queue a zoom from scroll lines (positive = closer)
    pub fn zoom(&mut self, scroll: f32) {
        self.pending.zoom -= scroll * self.zoom_speed;
    }

    /// Queue a pan in the view plane from a pointer drag in pixels
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let right = Vec3::new(self.azimuth.cos(), 0.0, -self.azimuth.sin());
        let pan_speed = self.distance * 0.002;
        self.pending.pan += (-right * dx + Vec3::Y * dy) * pan_speed;
    }

    pub fn has_pending_motion(&self) -> bool {
        !self.pending.is_negligible()
    }

    /// Apply damped motion and write the result into `camera`.
    ///
    /// Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        let step = self.pending.scaled(self.damping_factor);
        self.pending = self.pending.scaled(1.0 - self.damping_factor);
        if self.pending.is_negligible() {
            self.pending = OrbitDelta::default();
        }

        self.azimuth += step.azimuth;
        self.elevation = (self.elevation + step.elevation).clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT);
        self.distance = (self.distance * step.zoom.exp()).clamp(self.min_distance, self.max_distance);
        self.target += step.pan;

        let position = self.target + self.offset();
        let moved = !position.abs_diff_eq(camera.position, 1e-6) || camera.target != self.target;
        camera.position = position;
        camera.target = self.target;
        moved
    }

    fn offset(&self) -> Vec3 {
        Vec3::new(
            self.distance * self.elevation.cos() * self.azimuth.sin(),
            self.distance * self.elevation.sin(),
            self.distance * self.elevation.cos() * self.azimuth.cos(),
        )
    }
}
