//! Visibility layer masks shared by cameras and scene nodes

use serde::{Deserialize, Serialize};

/// Layer every node belongs to unless told otherwise
pub const DEFAULT_LAYER: u8 = 0;

/// Layer holding the glowing effect objects (grid, boxes, rings)
pub const EFFECTS_LAYER: u8 = 1;

/// Number of distinct layers a mask can hold
pub const LAYER_COUNT: u8 = 32;

/// Bitmask of up to 32 render layers.
///
/// A camera draws a node when the two masks share at least one bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u32::MAX);

    /// Mask used by the direct full-scene pass.
    pub const FULL_SCENE: Self = Self::ALL;

    /// Mask used by the post-processed effects pass.
    pub const EFFECTS: Self = Self::layer(EFFECTS_LAYER);

    /// Mask containing only `layer`; empty when `layer` is out of range
    pub const fn layer(layer: u8) -> Self {
        if layer < LAYER_COUNT {
            Self(1 << layer)
        } else {
            Self::NONE
        }
    }

    /// Build a mask from a list of layers
    pub fn from_layers(layers: &[u8]) -> Self {
        layers.iter().fold(Self::NONE, |mask, &l| mask.with(l))
    }

    /// Replace the whole mask with a single layer
    pub fn set(&mut self, layer: u8) {
        *self = Self::layer(layer);
    }

    pub fn enable(&mut self, layer: u8) {
        self.0 |= Self::layer(layer).0;
    }

    pub fn disable(&mut self, layer: u8) {
        self.0 &= !Self::layer(layer).0;
    }

    pub const fn with(self, layer: u8) -> Self {
        Self(self.0 | Self::layer(layer).0)
    }

    pub fn contains(&self, layer: u8) -> bool {
        self.0 & Self::layer(layer).0 != 0
    }

    /// True when the two masks share at least one layer
    pub fn test(&self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Iterate the enabled layer indices in ascending order
    pub fn layers(&self) -> impl Iterator<Item = u8> + '_ {
        (0u8..LAYER_COUNT).filter(move |l| self.contains(*l))
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::layer(DEFAULT_LAYER)
    }
}
