//! Post-processing pass list and bloom parameters

use glam::Vec2;
use std::ops::RangeInclusive;
use thiserror::Error;

use crate::config::BloomConfig;

#[derive(Error, Debug, PartialEq)]
pub enum PipelineError {
    #[error("Pipeline has no passes")]
    Empty,
    #[error("First pass must be the base render, found {0:?}")]
    MissingBaseRender(PassKind),
    #[error("Pass {0:?} appears more than once")]
    Duplicate(PassKind),
    #[error("Bloom must be the final pass and run after anti-aliasing")]
    BloomOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Draws the scene through the camera into the composer's buffer
    Render,
    /// Screen-space anti-aliasing
    Fxaa,
    /// Bright-pass, blur and additive composite
    Bloom,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pass {
    pub kind: PassKind,
    pub enabled: bool,
}

/// Live bloom parameters, mutated by the debug panel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomParams {
    threshold: f32,
    strength: f32,
    radius: f32,
}

impl BloomParams {
    pub const THRESHOLD_RANGE: RangeInclusive<f32> = 0.0..=1.0;
    pub const STRENGTH_RANGE: RangeInclusive<f32> = 0.0..=10.0;
    pub const RADIUS_RANGE: RangeInclusive<f32> = 0.0..=1.0;

    pub fn new(threshold: f32, strength: f32, radius: f32) -> Self {
        let mut params = Self { threshold: 0.0, strength: 0.0, radius: 0.0 };
        params.set_threshold(threshold);
        params.set_strength(strength);
        params.set_radius(radius);
        params
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_threshold(&mut self, value: f32) {
        self.threshold = clamp_to(value, &Self::THRESHOLD_RANGE);
    }

    pub fn set_strength(&mut self, value: f32) {
        self.strength = clamp_to(value, &Self::STRENGTH_RANGE);
    }

    pub fn set_radius(&mut self, value: f32) {
        self.radius = clamp_to(value, &Self::RADIUS_RANGE);
    }
}

impl Default for BloomParams {
    fn default() -> Self {
        Self::new(0.0, 3.25, 0.15)
    }
}

impl From<&BloomConfig> for BloomParams {
    fn from(config: &BloomConfig) -> Self {
        Self::new(config.threshold, config.strength, config.radius)
    }
}

fn clamp_to(value: f32, range: &RangeInclusive<f32>) -> f32 {
    if value.is_nan() {
        *range.start()
    } else {
        value.clamp(*range.start(), *range.end())
    }
}

/// Ordered post-processing chain writing to the output surface
#[derive(Debug, Clone)]
pub struct Composer {
    passes: Vec<Pass>,
    pub bloom: BloomParams,
    size: (u32, u32),
    bloom_size: (u32, u32),
    fxaa_resolution: Vec2,
}

impl Composer {
    pub fn new(kinds: &[PassKind], bloom: BloomParams) -> Result<Self, PipelineError> {
        validate_order(kinds)?;
        let mut composer = Self {
            passes: kinds.iter().map(|&kind| Pass { kind, enabled: true }).collect(),
            bloom,
            size: (1, 1),
            bloom_size: (1, 1),
            fxaa_resolution: Vec2::ONE,
        };
        composer.set_size(1, 1);
        Ok(composer)
    }

    /// Base render, then FXAA, then bloom
    pub fn standard(bloom: BloomParams) -> Self {
        Self {
            passes: [PassKind::Render, PassKind::Fxaa, PassKind::Bloom]
                .into_iter()
                .map(|kind| Pass { kind, enabled: true })
                .collect(),
            bloom,
            size: (1, 1),
            bloom_size: (1, 1),
            fxaa_resolution: Vec2::ONE,
        }
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn pass_kinds(&self) -> Vec<PassKind> {
        self.passes.iter().map(|p| p.kind).collect()
    }

    pub fn is_enabled(&self, kind: PassKind) -> bool {
        self.passes.iter().any(|p| p.kind == kind && p.enabled)
    }

    /// Toggle a pass; the base render cannot be disabled
    pub fn set_enabled(&mut self, kind: PassKind, enabled: bool) {
        if kind == PassKind::Render {
            return;
        }
        for pass in self.passes.iter_mut().filter(|p| p.kind == kind) {
            pass.enabled = enabled;
        }
    }

    /// Resize every internal buffer to exactly `width` x `height`
    pub fn set_size(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        self.size = (width, height);
        self.bloom_size = ((width / 2).max(1), (height / 2).max(1));
        self.fxaa_resolution = Vec2::new(1.0 / width as f32, 1.0 / height as f32);
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Base resolution of the bloom mip chain
    pub fn bloom_size(&self) -> (u32, u32) {
        self.bloom_size
    }

    /// Texel size uniform fed to the FXAA pass
    pub fn fxaa_resolution(&self) -> Vec2 {
        self.fxaa_resolution
    }
}

fn validate_order(kinds: &[PassKind]) -> Result<(), PipelineError> {
    let first = *kinds.first().ok_or(PipelineError::Empty)?;
    if first != PassKind::Render {
        return Err(PipelineError::MissingBaseRender(first));
    }
    for (i, kind) in kinds.iter().enumerate() {
        if kinds[..i].contains(kind) {
            return Err(PipelineError::Duplicate(*kind));
        }
    }
    if let Some(bloom_at) = kinds.iter().position(|k| *k == PassKind::Bloom) {
        let last = bloom_at == kinds.len() - 1;
        let fxaa_before = kinds
            .iter()
            .position(|k| *k == PassKind::Fxaa)
            .map_or(true, |fxaa_at| fxaa_at < bloom_at);
        if !last || !fxaa_before {
            return Err(PipelineError::BloomOrder);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_order() {
        let composer = Composer::standard(BloomParams::default());
        assert_eq!(
            composer.pass_kinds(),
            vec![PassKind::Render, PassKind::Fxaa, PassKind::Bloom]
        );
        assert!(Composer::new(&composer.pass_kinds(), BloomParams::default()).is_ok());
    }

    #[test]
    fn test_rejects_bloom_before_fxaa() {
        let err = Composer::new(
            &[PassKind::Render, PassKind::Bloom, PassKind::Fxaa],
            BloomParams::default(),
        )
        .unwrap_err();
        assert_eq!(err, PipelineError::BloomOrder);
    }

    #[test]
    fn test_rejects_missing_base_render() {
        let err = Composer::new(&[PassKind::Fxaa, PassKind::Bloom], BloomParams::default()).unwrap_err();
        assert_eq!(err, PipelineError::MissingBaseRender(PassKind::Fxaa));
        assert_eq!(Composer::new(&[], BloomParams::default()).unwrap_err(), PipelineError::Empty);
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = Composer::new(&[PassKind::Render, PassKind::Render], BloomParams::default()).unwrap_err();
        assert_eq!(err, PipelineError::Duplicate(PassKind::Render));
    }

    #[test]
    fn test_set_size_is_exact() {
        let mut composer = Composer::standard(BloomParams::default());
        composer.set_size(1920, 1080);
        composer.set_size(801, 601);
        assert_eq!(composer.size(), (801, 601));
        assert_eq!(composer.bloom_size(), (400, 300));
        assert!((composer.fxaa_resolution().x - 1.0 / 801.0).abs() < 1e-9);
    }

    #[test]
    fn test_bloom_params_clamp() {
        let mut params = BloomParams::default();
        params.set_strength(42.0);
        params.set_threshold(-1.0);
        params.set_radius(f32::NAN);
        assert_eq!(params.strength(), 10.0);
        assert_eq!(params.threshold(), 0.0);
        assert_eq!(params.radius(), 0.0);
    }

    #[test]
    fn test_base_render_cannot_be_disabled() {
        let mut composer = Composer::standard(BloomParams::default());
        composer.set_enabled(PassKind::Render, false);
        composer.set_enabled(PassKind::Fxaa, false);
        assert!(composer.is_enabled(PassKind::Render));
        assert!(!composer.is_enabled(PassKind::Fxaa));
    }
}
