use slotmap::new_key_type;

new_key_type! {
    /// Device-local buffer (vertex, index or indirect data).
    pub struct BufferId;

    /// Host-visible staging memory used for uploads.
    pub struct TransferBufferId;

    /// Compiled shader object. Only valid as pipeline-creation input.
    pub struct ShaderId;

    /// Graphics pipeline.
    pub struct PipelineId;

    /// Device texture.
    pub struct TextureId;
}
