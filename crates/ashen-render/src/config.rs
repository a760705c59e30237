//! Renderer configuration.
//!
//! [`RenderConfig`] is built once at startup and passed by reference to the
//! pieces that need it. Nothing here is global or mutable after start-up.

use std::path::PathBuf;

use crate::device::{ShaderFormat, TextureFormat};

/// Environment variable overriding [`RenderConfig::shaders_dir`].
pub const SHADERS_DIR_ENV: &str = "ASHEN_SHADERS_DIR";

#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Directory holding precompiled shader binaries.
    pub shaders_dir: PathBuf,

    /// Accepted shader formats, highest priority first.
    pub shader_formats: Vec<ShaderFormat>,

    /// Format of the surface pipelines render into.
    pub surface_format: TextureFormat,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            shaders_dir: PathBuf::from("shaders"),
            shader_formats: vec![ShaderFormat::Spirv, ShaderFormat::Msl, ShaderFormat::Dxil],
            surface_format: TextureFormat::Bgra8Unorm,
        }
    }
}

impl RenderConfig {
    /// Defaults, with `ASHEN_SHADERS_DIR` applied when set and non-empty.
    pub fn from_env() -> Self {
        Self::default().with_shaders_dir_override(std::env::var_os(SHADERS_DIR_ENV).map(PathBuf::from))
    }

    fn with_shaders_dir_override(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty()) {
            log::debug!("shaders dir overridden: {}", dir.display());
            self.shaders_dir = dir;
        }
        self
    }
}

/// Color target description consumed by the pipeline cache.
///
/// The windowing layer owns the real surface; pipelines only need its format.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SurfaceInfo {
    pub format: TextureFormat,
}

impl SurfaceInfo {
    pub fn new(format: TextureFormat) -> Self {
        Self { format }
    }
}

impl From<&RenderConfig> for SurfaceInfo {
    fn from(config: &RenderConfig) -> Self {
        Self::new(config.surface_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_prefer_spirv() {
        let config = RenderConfig::default();
        assert_eq!(config.shaders_dir, PathBuf::from("shaders"));
        assert_eq!(config.shader_formats[0], ShaderFormat::Spirv);
        assert_eq!(SurfaceInfo::from(&config).format, TextureFormat::Bgra8Unorm);
    }

    #[test]
    fn empty_override_is_ignored() {
        let config = RenderConfig::default().with_shaders_dir_override(Some(PathBuf::new()));
        assert_eq!(config.shaders_dir, PathBuf::from("shaders"));

        let config = RenderConfig::default().with_shaders_dir_override(Some("/opt/game/shaders".into()));
        assert_eq!(config.shaders_dir, PathBuf::from("/opt/game/shaders"));
    }
}
