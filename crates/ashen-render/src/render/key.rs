//! Pipeline identity.
//!
//! A pipeline is identified by (render stage, blend mode, wireframe). Keys map
//! to dense slots with `stage * B * 2 + blend * 2 + wireframe`, where `B` is
//! the number of blend modes in the key space.

/// Rendering purpose of one shader pipeline. Declaration order is slot order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum RenderStage {
    /// Untextured 2D primitives (position + colour vertices).
    Primitive2d,
    /// Textured 2D quads (position + uv vertices).
    Primitive2dTextured,
    /// Full-screen vignette post-process.
    Vignette,
}

impl RenderStage {
    pub const COUNT: usize = 3;

    pub const ALL: [RenderStage; Self::COUNT] = [
        RenderStage::Primitive2d,
        RenderStage::Primitive2dTextured,
        RenderStage::Vignette,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Color blending applied by a pipeline. Declaration order is slot order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum BlendMode {
    Opaque,
    Alpha,
    FastAlpha,
    Multiply,
    Add,
    Subtract,
    /// Marker mode for debug wireframe overlays; blends like `Opaque`.
    Wireframe,
}

impl BlendMode {
    pub const COUNT: usize = 7;

    pub const ALL: [BlendMode; Self::COUNT] = [
        BlendMode::Opaque,
        BlendMode::Alpha,
        BlendMode::FastAlpha,
        BlendMode::Multiply,
        BlendMode::Add,
        BlendMode::Subtract,
        BlendMode::Wireframe,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PipelineKey {
    pub stage: RenderStage,
    pub blend_mode: BlendMode,
    pub wireframe: bool,
}

impl PipelineKey {
    pub const fn new(stage: RenderStage, blend_mode: BlendMode, wireframe: bool) -> Self {
        Self { stage, blend_mode, wireframe }
    }
}

/// Dimensions of a built pipeline set.
///
/// Covers the first `stages` render stages and the first `blend_modes` blend
/// modes, each in declaration order. Slot mapping is a bijection between
/// keys inside the space and `0..len()`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PipelineKeySpace {
    stages: usize,
    blend_modes: usize,
}

impl PipelineKeySpace {
    /// Every stage and every blend mode.
    pub const FULL: PipelineKeySpace = PipelineKeySpace {
        stages: RenderStage::COUNT,
        blend_modes: BlendMode::COUNT,
    };

    /// Clamps to the number of declared stages and blend modes.
    pub fn new(stages: usize, blend_modes: usize) -> Self {
        Self {
            stages: stages.min(RenderStage::COUNT),
            blend_modes: blend_modes.min(BlendMode::COUNT),
        }
    }

    pub fn stages(&self) -> usize {
        self.stages
    }

    pub fn blend_modes(&self) -> usize {
        self.blend_modes
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.stages * self.blend_modes * 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: PipelineKey) -> bool {
        key.stage.index() < self.stages && key.blend_mode.index() < self.blend_modes
    }

    /// Slot of `key`, or `None` if the key lies outside this space.
    pub fn slot(&self, key: PipelineKey) -> Option<usize> {
        if !self.contains(key) {
            return None;
        }
        Some(key.stage.index() * self.blend_modes * 2 + key.blend_mode.index() * 2 + usize::from(key.wireframe))
    }

    /// Inverse of [`slot`](Self::slot).
    pub fn key(&self, slot: usize) -> Option<PipelineKey> {
        if slot >= self.len() {
            return None;
        }
        let per_stage = self.blend_modes * 2;
        let stage = RenderStage::from_index(slot / per_stage)?;
        let blend_mode = BlendMode::from_index(slot % per_stage / 2)?;
        Some(PipelineKey::new(stage, blend_mode, slot % 2 == 1))
    }

    /// All keys in slot order.
    pub fn keys(self) -> impl Iterator<Item = PipelineKey> {
        (0..self.len()).filter_map(move |slot| self.key(slot))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn full_space_is_a_bijection() {
        let space = PipelineKeySpace::FULL;
        assert_eq!(space.len(), RenderStage::COUNT * BlendMode::COUNT * 2);

        let mut seen = HashSet::new();
        for stage in RenderStage::ALL {
            for blend_mode in BlendMode::ALL {
                for wireframe in [false, true] {
                    let key = PipelineKey::new(stage, blend_mode, wireframe);
                    let slot = space.slot(key).unwrap();
                    assert!(slot < space.len());
                    assert!(seen.insert(slot), "slot {slot} reused");
                    assert_eq!(space.key(slot), Some(key));
                }
            }
        }
        assert_eq!(seen.len(), space.len());
    }

    #[test]
    fn partial_space_uses_its_own_blend_count() {
        let space = PipelineKeySpace::new(2, 3);
        assert_eq!(space.len(), 12);

        let key = PipelineKey::new(RenderStage::Primitive2dTextured, BlendMode::FastAlpha, true);
        assert_eq!(space.slot(key), Some(11));
        assert_eq!(space.key(11), Some(key));
    }

    #[test]
    fn keys_outside_space_have_no_slot() {
        let space = PipelineKeySpace::new(2, 3);
        assert_eq!(space.slot(PipelineKey::new(RenderStage::Vignette, BlendMode::Opaque, false)), None);
        assert_eq!(space.slot(PipelineKey::new(RenderStage::Primitive2d, BlendMode::Multiply, false)), None);
        assert_eq!(space.key(12), None);
    }

    #[test]
    fn keys_iterate_in_slot_order() {
        let space = PipelineKeySpace::new(1, 2);
        let keys: Vec<_> = space.keys().collect();
        assert_eq!(
            keys,
            vec![
                PipelineKey::new(RenderStage::Primitive2d, BlendMode::Opaque, false),
                PipelineKey::new(RenderStage::Primitive2d, BlendMode::Opaque, true),
                PipelineKey::new(RenderStage::Primitive2d, BlendMode::Alpha, false),
                PipelineKey::new(RenderStage::Primitive2d, BlendMode::Alpha, true),
            ]
        );
    }
}
