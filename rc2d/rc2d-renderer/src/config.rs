//! Renderer configuration: output format and composite tone mapping.
//! Per-frame GI settings are not here; they arrive with every frame as `render_api::GiSettings`.

/// Tone mapping applied by the composite pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToneMapping {
    /// Straight overwrite of the host color target.
    #[default]
    None,
    Reinhard,
}

impl ToneMapping {
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            ToneMapping::None => 0,
            ToneMapping::Reinhard => 1,
        }
    }
}

/// Construction-time renderer configuration.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Format of the host color target the composite pass writes (e.g. swapchain format).
    pub output_format: wgpu::TextureFormat,
    pub tone_mapping: ToneMapping,
    /// Bit `n` set: meshes on layer `n` are drawn into the GI scene mask.
    pub light_layer_mask: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            output_format: wgpu::TextureFormat::Rgba8Unorm,
            tone_mapping: ToneMapping::default(),
            light_layer_mask: u32::MAX,
        }
    }
}
