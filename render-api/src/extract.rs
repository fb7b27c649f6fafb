//! Data types for extraction from the host engine into the render world.
//! The host fills these each frame.

use std::collections::HashMap;

use crate::settings::GiSettings;

/// Bytes per mask vertex: position `[f32; 2]` + linear RGBA `[f32; 4]`.
pub const MASK_VERTEX_STRIDE: usize = 24;

/// Per-mesh 2D instance data extracted from the main world.
#[derive(Clone, Debug)]
pub struct ExtractedMesh {
    /// Host-defined entity or instance id.
    pub entity_id: u64,
    /// Vertex data, `MASK_VERTEX_STRIDE` bytes per vertex. Alpha is the occupancy of
    /// the pixels the mesh covers; emissive color goes in rgb.
    pub vertex_data: Vec<u8>,
    /// Index data (u32 indices).
    pub index_data: Vec<u8>,
    /// World transform: column-major 4x4 matrix (WGSL/wgpu convention).
    pub transform: [f32; 16],
    /// Whether this instance is visible.
    pub visible: bool,
    /// Render layer, `0..=31`. Only layers in the renderer's light layer mask feed the
    /// GI scene mask; every visible mesh is still drawn when GI is off.
    pub layer: u32,
}

/// All extracted meshes for the current frame.
#[derive(Default, Debug)]
pub struct ExtractedMeshes {
    pub meshes: HashMap<u64, ExtractedMesh>,
}

/// View/camera data for the current frame.
#[derive(Clone, Debug)]
pub struct ExtractedView {
    pub view_proj: [f32; 16],
    pub viewport_size: (u32, u32),
    /// GI settings snapshot for this frame. `None` means the host never registered
    /// a settings object, which the renderer treats as a configuration error.
    pub gi_settings: Option<GiSettings>,
}

impl Default for ExtractedView {
    fn default() -> Self {
        Self {
            view_proj: [
                1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
            ],
            viewport_size: (800, 600),
            gi_settings: Some(GiSettings::default()),
        }
    }
}
