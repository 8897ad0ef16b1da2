//! Glowing effect animators: scrolling grid, bobbing boxes, expanding rings
//!
//! Each animator is a pure function of the shared clock. They do not know
//! about each other and may run in any order within a frame.

use glam::Vec3;
use std::f32::consts::TAU;

use crate::clock::Clock;
use crate::config::AnimationConfig;

/// A per-frame effect update
pub trait Animator {
    fn name(&self) -> &'static str;

    /// Advance to the clock's current time
    fn advance(&mut self, clock: &dyn Clock);
}

/// Floor grid scrolling toward the camera with a slow glow pulse
#[derive(Debug, Clone, PartialEq)]
pub struct GridEffect {
    pub cell_size: f32,
    /// Scroll speed in world units per second
    pub speed: f32,
    offset: f32,
    glow: f32,
}

impl GridEffect {
    pub fn new(cell_size: f32, speed: f32) -> Self {
        Self {
            cell_size,
            speed,
            offset: 0.0,
            glow: 1.0,
        }
    }

    /// Scroll offset, always within one cell
    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Emissive multiplier in [0.5, 1.0]
    pub fn glow(&self) -> f32 {
        self.glow
    }
}

impl Default for GridEffect {
    fn default() -> Self {
        Self::new(0.5, 0.4)
    }
}

impl Animator for GridEffect {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn advance(&mut self, clock: &dyn Clock) {
        let t = clock.elapsed_secs();
        self.offset = (t * self.speed).rem_euclid(self.cell_size);
        self.glow = 0.75 + 0.25 * (t * 1.5).sin();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxState {
    /// Rest position on the floor
    pub base: Vec3,
    pub phase: f32,
    /// Current vertical lift
    pub lift: f32,
    /// Current yaw in radians
    pub yaw: f32,
}

/// Row of glowing boxes on either side of the car
#[derive(Debug, Clone, PartialEq)]
pub struct BoxesEffect {
    pub amplitude: f32,
    pub frequency: f32,
    boxes: Vec<BoxState>,
}

impl BoxesEffect {
    pub fn new(count: usize) -> Self {
        let boxes = (0..count)
            .map(|i| {
                let side = if i % 2 == 0 { -1.0 } else { 1.0 };
                let row = (i / 2) as f32;
                BoxState {
                    base: Vec3::new(side * 1.6, 0.1, -2.0 + row * 1.2),
                    phase: i as f32 / count.max(1) as f32 * TAU,
                    lift: 0.0,
                    yaw: 0.0,
                }
            })
            .collect();
        Self {
            amplitude: 0.08,
            frequency: 1.2,
            boxes,
        }
    }

    pub fn boxes(&self) -> &[BoxState] {
        &self.boxes
    }

    pub fn position(&self, index: usize) -> Option<Vec3> {
        self.boxes.get(index).map(|b| b.base + Vec3::Y * b.lift)
    }
}

impl Animator for BoxesEffect {
    fn name(&self) -> &'static str {
        "boxes"
    }

    fn advance(&mut self, clock: &dyn Clock) {
        let t = clock.elapsed_secs();
        for b in &mut self.boxes {
            b.lift = self.amplitude * (t * self.frequency * TAU * 0.25 + b.phase).sin();
            b.yaw = (t * 0.5 + b.phase).rem_euclid(TAU);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingState {
    pub scale: f32,
    pub opacity: f32,
}

/// Concentric rings expanding out from under the car and fading
#[derive(Debug, Clone, PartialEq)]
pub struct RingsEffect {
    /// Seconds for one ring to go from spawn to fully faded
    pub period: f32,
    pub max_scale: f32,
    rings: Vec<RingState>,
}

impl RingsEffect {
    pub fn new(count: usize) -> Self {
        Self {
            period: 3.0,
            max_scale: 4.0,
            rings: vec![RingState { scale: 1.0, opacity: 1.0 }; count],
        }
    }

    pub fn rings(&self) -> &[RingState] {
        &self.rings
    }
}

impl Animator for RingsEffect {
    fn name(&self) -> &'static str {
        "rings"
    }

    fn advance(&mut self, clock: &dyn Clock) {
        let t = clock.elapsed_secs();
        let count = self.rings.len().max(1) as f32;
        for (i, ring) in self.rings.iter_mut().enumerate() {
            let progress = (t / self.period + i as f32 / count).fract();
            ring.scale = 1.0 + progress * (self.max_scale - 1.0);
            ring.opacity = 1.0 - progress;
        }
    }
}

/// All effect animators of the scene
#[derive(Debug, Clone, PartialEq)]
pub struct Effects {
    pub grid: GridEffect,
    pub boxes: BoxesEffect,
    pub rings: RingsEffect,
}

impl Effects {
    pub fn from_config(config: &AnimationConfig) -> Self {
        Self {
            grid: GridEffect::default(),
            boxes: BoxesEffect::new(config.box_count),
            rings: RingsEffect::new(config.ring_count),
        }
    }

    pub fn animators_mut(&mut self) -> [&mut dyn Animator; 3] {
        [&mut self.boxes, &mut self.grid, &mut self.rings]
    }

    pub fn advance_all(&mut self, clock: &dyn Clock) {
        for animator in self.animators_mut() {
            animator.advance(clock);
        }
    }
}

impl Default for Effects {
    fn default() -> Self {
        Self::from_config(&AnimationConfig::default())
    }
}
