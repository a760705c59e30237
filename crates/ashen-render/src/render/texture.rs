//! Device textures built from decoded pixel data.

use crate::device::{
    CopyPass, Device, RenderPass, TextureDesc, TextureFilter, TextureFormat, TextureId, TextureUsages,
};
use crate::error::{RenderError, ResourceKind, Result};

// ── pixel sources ─────────────────────────────────────────────────────────

/// Tightly packed pixel rows, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, format: TextureFormat, pixels: Vec<u8>) -> Self {
        Self { width, height, format, pixels }
    }

    /// Byte length implied by the dimensions and format.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() as usize
    }
}

/// Supplier of decoded pixels for [`Texture::new`].
pub trait PixelSource {
    /// Name used for labels and diagnostics.
    fn name(&self) -> &str;

    /// Decoded pixels, decoding first if they are not resident yet.
    fn decode(&mut self) -> anyhow::Result<&DecodedImage>;
}

impl PixelSource for DecodedImage {
    fn name(&self) -> &str {
        "image"
    }

    fn decode(&mut self) -> anyhow::Result<&DecodedImage> {
        Ok(self)
    }
}

/// Pixel asset decoded on first use and kept resident afterwards.
pub struct DeferredImage<F> {
    name: String,
    decoder: F,
    image: Option<DecodedImage>,
}

impl<F> DeferredImage<F>
where
    F: FnMut() -> anyhow::Result<DecodedImage>,
{
    pub fn new(name: impl Into<String>, decoder: F) -> Self {
        Self {
            name: name.into(),
            decoder,
            image: None,
        }
    }

    pub fn is_resident(&self) -> bool {
        self.image.is_some()
    }
}

impl<F> PixelSource for DeferredImage<F>
where
    F: FnMut() -> anyhow::Result<DecodedImage>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&mut self) -> anyhow::Result<&DecodedImage> {
        if self.image.is_none() {
            log::debug!("decoding `{}`", self.name);
            self.image = Some((self.decoder)()?);
        }
        match &self.image {
            Some(image) => Ok(image),
            None => anyhow::bail!("`{}` decoded to nothing", self.name),
        }
    }
}

// ── texture ───────────────────────────────────────────────────────────────

/// Exclusively owned device texture.
///
/// Release with [`Texture::release`] before the device goes away. Dropping a
/// `Texture` without releasing it leaks the device texture; `SoftwareDevice`
/// reports such leaks when it is dropped.
#[derive(Debug)]
pub struct Texture {
    name: String,
    id: TextureId,
    width: u32,
    height: u32,
    format: TextureFormat,
}

impl Texture {
    /// Creates a sampled texture and records the upload of `source` into `pass`.
    ///
    /// The staging memory is released right away; the release takes effect
    /// after the command buffer holding `pass` is submitted.
    pub fn new<D, S>(device: &mut D, pass: &mut CopyPass<'_>, source: &mut S) -> Result<Self>
    where
        D: Device + ?Sized,
        S: PixelSource + ?Sized,
    {
        let name = source.name().to_owned();
        let image = source
            .decode()
            .map_err(|e| RenderError::creation(ResourceKind::Texture, &name, format!("{e:#}")))?;

        if image.pixels.len() != image.expected_len() {
            return Err(RenderError::creation(
                ResourceKind::Texture,
                &name,
                format!(
                    "{}x{} {:?} needs {} bytes, got {}",
                    image.width,
                    image.height,
                    image.format,
                    image.expected_len(),
                    image.pixels.len()
                ),
            ));
        }

        let id = device
            .create_texture(&TextureDesc {
                label: &name,
                width: image.width,
                height: image.height,
                format: image.format,
                usage: TextureUsages::SAMPLER,
            })
            .map_err(|e| RenderError::creation(ResourceKind::Texture, &name, e))?;

        let transfer = match device.create_transfer_buffer(&name, image.pixels.len() as u64) {
            Ok(transfer) => transfer,
            Err(e) => {
                device.release_texture(id);
                return Err(RenderError::creation(ResourceKind::TransferBuffer, &name, e));
            }
        };

        if let Err(e) = device.write_transfer_buffer(transfer, 0, &image.pixels) {
            device.release_transfer_buffer(transfer);
            device.release_texture(id);
            return Err(RenderError::creation(ResourceKind::TransferBuffer, &name, e));
        }

        pass.upload_to_texture(transfer, 0, id, image.width, image.height);
        device.release_transfer_buffer(transfer);

        log::debug!("texture `{name}`: {}x{} {:?}", image.width, image.height, image.format);

        Ok(Self {
            id,
            width: image.width,
            height: image.height,
            format: image.format,
            name,
        })
    }

    /// Creates an empty texture usable as a render target and for sampling,
    /// e.g. the scene texture read by a post-process stage.
    pub fn render_target<D: Device + ?Sized>(
        device: &mut D,
        name: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Self> {
        let id = device
            .create_texture(&TextureDesc {
                label: name,
                width,
                height,
                format,
                usage: TextureUsages::SAMPLER | TextureUsages::COLOR_TARGET,
            })
            .map_err(|e| RenderError::creation(ResourceKind::Texture, name, e))?;

        Ok(Self {
            name: name.to_owned(),
            id,
            width,
            height,
            format,
        })
    }

    /// Binds the texture to fragment sampler `slot`.
    pub fn bind(&self, pass: &mut RenderPass<'_>, slot: u32, filter: TextureFilter) {
        pass.bind_fragment_texture(slot, self.id, filter);
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn release<D: Device + ?Sized>(self, device: &mut D) {
        device.release_texture(self.id);
    }
}
