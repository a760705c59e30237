//! Blend state per [`BlendMode`].

use crate::device::{BlendComponent, BlendFactor, BlendOperation, BlendState, ColorTargetDesc, TextureFormat};

use super::BlendMode;

// ── blend ─────────────────────────────────────────────────────────────────

const fn component(src: BlendFactor, dst: BlendFactor, op: BlendOperation) -> BlendComponent {
    BlendComponent::new(src, dst, op)
}

const ALPHA: BlendState = BlendState {
    color: component(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha, BlendOperation::Add),
    alpha: component(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha, BlendOperation::Add),
};

const MULTIPLY: BlendState = BlendState {
    color: component(BlendFactor::SrcColor, BlendFactor::One, BlendOperation::Add),
    alpha: component(BlendFactor::SrcAlpha, BlendFactor::One, BlendOperation::Add),
};

const ADD: BlendState = BlendState {
    color: component(BlendFactor::One, BlendFactor::One, BlendOperation::Add),
    alpha: component(BlendFactor::One, BlendFactor::One, BlendOperation::Add),
};

const SUBTRACT: BlendState = BlendState {
    color: component(BlendFactor::One, BlendFactor::One, BlendOperation::Subtract),
    alpha: component(BlendFactor::One, BlendFactor::One, BlendOperation::Subtract),
};

/// Blend state for `mode`. `None` disables blending.
pub fn blend_state(mode: BlendMode) -> Option<BlendState> {
    match mode {
        BlendMode::Opaque | BlendMode::Wireframe => None,
        BlendMode::Alpha | BlendMode::FastAlpha => Some(ALPHA),
        BlendMode::Multiply => Some(MULTIPLY),
        BlendMode::Add => Some(ADD),
        BlendMode::Subtract => Some(SUBTRACT),
    }
}

pub fn color_target(format: TextureFormat, mode: BlendMode) -> ColorTargetDesc {
    ColorTargetDesc {
        format,
        blend: blend_state(mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_modes_disable_blending() {
        assert_eq!(blend_state(BlendMode::Opaque), None);
        assert_eq!(blend_state(BlendMode::Wireframe), None);
    }

    #[test]
    fn alpha_modes_share_state() {
        let alpha = blend_state(BlendMode::Alpha).unwrap();
        assert_eq!(blend_state(BlendMode::FastAlpha), Some(alpha));
        assert_eq!(alpha.color.src_factor, BlendFactor::SrcAlpha);
        assert_eq!(alpha.color.dst_factor, BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn additive_modes_differ_only_by_operation() {
        let add = blend_state(BlendMode::Add).unwrap();
        let sub = blend_state(BlendMode::Subtract).unwrap();
        assert_eq!(add.color.src_factor, sub.color.src_factor);
        assert_eq!(add.color.dst_factor, sub.color.dst_factor);
        assert_eq!(add.color.operation, BlendOperation::Add);
        assert_eq!(sub.color.operation, BlendOperation::Subtract);
    }

    #[test]
    fn multiply_uses_source_color() {
        let multiply = blend_state(BlendMode::Multiply).unwrap();
        assert_eq!(multiply.color.src_factor, BlendFactor::SrcColor);
        assert_eq!(multiply.alpha.src_factor, BlendFactor::SrcAlpha);
        assert_eq!(multiply.alpha.dst_factor, BlendFactor::One);
    }

    #[test]
    fn color_target_carries_format() {
        let target = color_target(TextureFormat::Rgba8Unorm, BlendMode::Add);
        assert_eq!(target.format, TextureFormat::Rgba8Unorm);
        assert!(target.blend.is_some());
    }
}
