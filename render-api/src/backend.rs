//! Host-side seam for the 2D GI renderer. The host never sees wgpu: it hands over
//! extracted meshes and one view per frame, and the backend decides whether the GI
//! chain runs from `view.gi_settings`.

use crate::{ExtractedMeshes, ExtractedView};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

pub trait RenderBackend: Send {
    /// Sync the backend's mesh cache with this frame's extraction. Meshes missing from
    /// `extracted` or marked invisible are dropped.
    fn prepare(&mut self, extracted: &ExtractedMeshes);

    /// Draw one frame into the backend's own color target. An inactive or empty view
    /// still draws the scene without GI; a view with no settings object is an error.
    fn render_frame(&mut self, view: &ExtractedView) -> Result<(), String>;
}

/// Backend that can also put the frame on screen.
pub trait RenderBackendWindow: RenderBackend + Send {
    /// Like `render_frame`, but the frame lands in the window's next swapchain image,
    /// sized from `view.viewport_size`. A zero-sized viewport presents nothing.
    fn render_frame_to_window(
        &mut self,
        view: &ExtractedView,
        raw_window_handle: RawWindowHandle,
        raw_display_handle: RawDisplayHandle,
    ) -> Result<(), String>;
}
