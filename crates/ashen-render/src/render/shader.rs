//! Precompiled shader loading.
//!
//! Shader names carry their stage as a suffix (`Foo.vert`, `Foo.frag`). The
//! binary lives at `<dir>/<name>.<ext>`, where `ext` belongs to the first
//! accepted format the device supports.

use std::cell::Cell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::RenderConfig;
use crate::device::{Device, ShaderDesc, ShaderFormat, ShaderFormats, ShaderId, ShaderResourceCounts, ShaderStage};
use crate::error::{RenderError, Result};

// ── file access ───────────────────────────────────────────────────────────

/// Source of shader binaries.
pub trait ShaderFiles {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads shader binaries from the filesystem.
#[derive(Debug, Copy, Clone, Default)]
pub struct ShaderDir;

impl ShaderFiles for ShaderDir {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// In-memory shader binaries, e.g. embedded with `include_bytes!`.
///
/// Counts every read attempt, including misses.
#[derive(Debug, Default)]
pub struct MemoryShaderFiles {
    files: HashMap<PathBuf, Vec<u8>>,
    reads: Cell<usize>,
}

impl MemoryShaderFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    pub fn with(mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    /// Number of reads attempted so far.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl ShaderFiles for MemoryShaderFiles {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.reads.set(self.reads.get() + 1);
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

// ── loader ────────────────────────────────────────────────────────────────

/// Stage encoded in a shader name's suffix.
pub fn stage_from_name(name: &str) -> Option<ShaderStage> {
    match Path::new(name).extension()?.to_str()? {
        "vert" => Some(ShaderStage::Vertex),
        "frag" => Some(ShaderStage::Fragment),
        _ => None,
    }
}

#[derive(Debug)]
pub struct ShaderLoader<F = ShaderDir> {
    dir: PathBuf,
    /// Accepted formats, highest priority first.
    formats: Vec<ShaderFormat>,
    files: F,
}

impl ShaderLoader<ShaderDir> {
    /// Loader reading from `dir` with the default format priority.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_files(dir, ShaderDir)
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(config.shaders_dir.clone()).with_formats(config.shader_formats.clone())
    }
}

impl<F: ShaderFiles> ShaderLoader<F> {
    pub fn with_files(dir: impl Into<PathBuf>, files: F) -> Self {
        Self {
            dir: dir.into(),
            formats: RenderConfig::default().shader_formats,
            files,
        }
    }

    pub fn with_formats(mut self, formats: Vec<ShaderFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn formats(&self) -> &[ShaderFormat] {
        &self.formats
    }

    pub fn files(&self) -> &F {
        &self.files
    }

    /// First accepted format contained in `supported`.
    pub fn select_format(&self, supported: ShaderFormats) -> Result<ShaderFormat> {
        self.formats
            .iter()
            .copied()
            .find(|f| supported.contains(f.flag()))
            .ok_or(RenderError::UnsupportedFormat { supported })
    }

    pub fn path_for(&self, name: &str, format: ShaderFormat) -> PathBuf {
        self.dir.join(format!("{name}.{}", format.extension()))
    }

    /// Loads `name` and creates a device shader object.
    ///
    /// The returned handle is only meant as pipeline input; the caller
    /// releases it once the pipeline has been created or has failed.
    pub fn load<D: Device + ?Sized>(
        &self,
        device: &mut D,
        name: &str,
        resources: ShaderResourceCounts,
    ) -> Result<ShaderId> {
        let Some(stage) = stage_from_name(name) else {
            log::error!("shader `{name}` has no .vert/.frag suffix");
            return Err(RenderError::InvalidStage { name: name.to_owned() });
        };

        let format = self.select_format(device.shader_formats()).inspect_err(|e| log::error!("{e}"))?;
        log::debug!("shader `{name}`: using {format:?}");

        let path = self.path_for(name, format);
        let code = match self.files.read(&path) {
            Ok(code) => code,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::error!("shader file not found: {}", path.display());
                return Err(RenderError::FileNotFound { path });
            }
            Err(source) => {
                log::error!("failed to read shader {}: {source}", path.display());
                return Err(RenderError::ShaderIo { path, source });
            }
        };

        device
            .create_shader(&ShaderDesc {
                label: name,
                code: &code,
                entry_point: format.entry_point(),
                format,
                stage,
                resources,
            })
            .map_err(|e| {
                log::error!("failed to create shader `{name}`: {e}");
                RenderError::CompileError {
                    name: name.to_owned(),
                    reason: e.to_string(),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;
    use crate::error::{ErrorCategory, ResourceKind};

    const CODE: &[u8] = &[0x03, 0x02, 0x23, 0x07];

    fn loader(files: MemoryShaderFiles) -> ShaderLoader<MemoryShaderFiles> {
        ShaderLoader::with_files("shaders", files)
    }

    // ── stage ─────────────────────────────────────────────────────────────

    #[test]
    fn stage_comes_from_suffix() {
        assert_eq!(stage_from_name("2dPrimitive.vert"), Some(ShaderStage::Vertex));
        assert_eq!(stage_from_name("TexturedQuad.frag"), Some(ShaderStage::Fragment));
        assert_eq!(stage_from_name("foo.bin"), None);
        assert_eq!(stage_from_name("vert"), None);
    }

    #[test]
    fn invalid_stage_reads_nothing() {
        let loader = loader(MemoryShaderFiles::new().with("shaders/foo.bin.spv", CODE));
        let mut device = SoftwareDevice::default();

        let err = loader.load(&mut device, "foo.bin", ShaderResourceCounts::default()).unwrap_err();

        assert!(matches!(err, RenderError::InvalidStage { .. }));
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(loader.files().reads(), 0);
        assert_eq!(device.allocation_count(ResourceKind::Shader), 0);
    }

    // ── format selection ──────────────────────────────────────────────────

    #[test]
    fn first_supported_format_wins_every_time() {
        let loader = loader(MemoryShaderFiles::new())
            .with_formats(vec![ShaderFormat::Spirv, ShaderFormat::Msl, ShaderFormat::Dxil]);
        let supported = ShaderFormats::SPIRV | ShaderFormats::MSL;

        for _ in 0..3 {
            assert_eq!(loader.select_format(supported).unwrap(), ShaderFormat::Spirv);
        }
        assert_eq!(loader.select_format(ShaderFormats::DXIL | ShaderFormats::MSL).unwrap(), ShaderFormat::Msl);
    }

    #[test]
    fn no_accepted_format_is_unsupported() {
        let loader = loader(MemoryShaderFiles::new());
        let mut device = SoftwareDevice::new(ShaderFormats::METALLIB);

        let err = loader.load(&mut device, "a.vert", ShaderResourceCounts::default()).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedFormat { .. }));
        assert_eq!(loader.files().reads(), 0);
    }

    // ── loading ───────────────────────────────────────────────────────────

    #[test]
    fn loads_with_format_entry_point() {
        let files = MemoryShaderFiles::new().with("shaders/2dPrimitive.frag.msl", CODE);
        let loader = loader(files);
        let mut device = SoftwareDevice::new(ShaderFormats::MSL);
        let resources = ShaderResourceCounts {
            uniform_buffers: 1,
            ..Default::default()
        };

        let id = loader.load(&mut device, "2dPrimitive.frag", resources).unwrap();

        let record = device.shader(id).unwrap();
        assert_eq!(record.stage, ShaderStage::Fragment);
        assert_eq!(record.format, ShaderFormat::Msl);
        assert_eq!(record.entry_point, "main0");
        assert_eq!(record.resources, resources);
        assert_eq!(record.code_len, CODE.len());
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let loader = loader(MemoryShaderFiles::new());
        let mut device = SoftwareDevice::default();

        let err = loader.load(&mut device, "Missing.vert", ShaderResourceCounts::default()).unwrap_err();
        match err {
            RenderError::FileNotFound { path } => assert_eq!(path, Path::new("shaders/Missing.vert.spv")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(loader.files().reads(), 1);
    }

    #[test]
    fn device_rejection_is_a_compile_error() {
        let loader = loader(MemoryShaderFiles::new().with("shaders/Empty.vert.spv", Vec::new()));
        let mut device = SoftwareDevice::default();

        let err = loader.load(&mut device, "Empty.vert", ShaderResourceCounts::default()).unwrap_err();
        assert!(matches!(err, RenderError::CompileError { .. }));
        assert_eq!(err.category(), ErrorCategory::ResourceCreation);
        assert_eq!(device.live_count(ResourceKind::Shader), 0);
    }

    #[test]
    fn reads_from_disk() {
        let dir = std::env::temp_dir().join(format!("ashen-shaders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Disk.vert.spv"), CODE).unwrap();

        let loader = ShaderLoader::new(dir.clone());
        let mut device = SoftwareDevice::default();
        let id = loader.load(&mut device, "Disk.vert", ShaderResourceCounts::default());

        std::fs::remove_dir_all(&dir).unwrap();
        assert!(id.is_ok());
    }

    #[test]
    fn loader_follows_config() {
        let config = RenderConfig {
            shaders_dir: "assets/shaders".into(),
            shader_formats: vec![ShaderFormat::Dxil],
            ..Default::default()
        };
        let loader = ShaderLoader::from_config(&config);
        assert_eq!(loader.formats(), &[ShaderFormat::Dxil]);
        assert_eq!(
            loader.path_for("a.vert", ShaderFormat::Dxil),
            Path::new("assets/shaders/a.vert.dxil")
        );
    }
}
