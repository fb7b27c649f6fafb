//! Shared render backend API for the rc2d GI renderer.
//! Defines extract types, the GI settings snapshot and the RenderBackend trait so the
//! host drives the renderer through one code path (prepare + render_frame).

mod backend;
mod extract;
mod settings;

pub use backend::{RenderBackend, RenderBackendWindow};
pub use extract::{ExtractedMesh, ExtractedMeshes, ExtractedView, MASK_VERTEX_STRIDE};
pub use settings::{GiSettings, Overridable, DEFAULT_CASCADE_COUNT};
pub use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
