//! Swapchain output for the GI plugin. The host hands over raw window handles every
//! frame; the composite pass (or the unlit scene, when GI is off) lands directly in
//! the acquired swapchain image, so no offscreen copy is kept.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use rc2d_renderer::{GiError, RendererConfig, ToneMapping};
use render_api::{ExtractedMeshes, ExtractedView, RenderBackend, RenderBackendWindow};
use wgpu::SurfaceTargetUnsafe;

use crate::plugin::Rc2dPlugin;

/// GI plugin bound to one window's surface format.
pub struct Rc2dWindowBackend {
    instance: wgpu::Instance,
    plugin: Rc2dPlugin,
}

/// Surface built from raw handles. The window behind the handles must outlive it.
unsafe fn surface_from_raw(
    instance: &wgpu::Instance,
    raw_window_handle: RawWindowHandle,
    raw_display_handle: RawDisplayHandle,
) -> Result<wgpu::Surface<'static>, GiError> {
    let target = SurfaceTargetUnsafe::RawHandle { raw_window_handle, raw_display_handle };
    instance.create_surface_unsafe(target).map_err(|e| GiError::Surface(e.to_string()))
}

impl Rc2dWindowBackend {
    /// Picks an adapter that can present to `window` and composites in the surface's
    /// preferred format. Only the window's handles are read here.
    pub fn from_window(
        window: &(impl HasWindowHandle + HasDisplayHandle),
        tone_mapping: ToneMapping,
    ) -> Result<Box<dyn RenderBackendWindow>, String> {
        let wh = window.window_handle().map_err(|e| e.to_string())?;
        let dh = window.display_handle().map_err(|e| e.to_string())?;
        let backend = pollster::block_on(Self::for_surface(wh.as_raw(), dh.as_raw(), tone_mapping))
            .map_err(|e| e.to_string())?;
        Ok(Box::new(backend))
    }

    async fn for_surface(
        raw_window_handle: RawWindowHandle,
        raw_display_handle: RawDisplayHandle,
        tone_mapping: ToneMapping,
    ) -> Result<Self, GiError> {
        let instance = wgpu::Instance::default();
        // SAFETY: the caller's window is borrowed for the whole call and the surface
        // is dropped before returning.
        let surface = unsafe { surface_from_raw(&instance, raw_window_handle, raw_display_handle)? };
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| GiError::Surface("no adapter can present to this window".to_string()))?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .map_err(|e| GiError::Surface(e.to_string()))?;
        let format = surface
            .get_capabilities(&adapter)
            .formats
            .first()
            .copied()
            .unwrap_or(wgpu::TextureFormat::Rgba8Unorm);
        log::info!("GI composites into {:?} on {}", format, adapter.get_info().name);
        let config = RendererConfig { output_format: format, tone_mapping, ..RendererConfig::default() };
        let plugin = Rc2dPlugin::new_with_config(device, queue, config)?;
        Ok(Self { instance, plugin })
    }

    fn surface_config(&self, width: u32, height: u32) -> wgpu::SurfaceConfiguration {
        wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: self.plugin.renderer().config().output_format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        }
    }

    /// Next swapchain image, reconfiguring once if the surface went stale.
    fn acquire(&self, surface: &wgpu::Surface<'_>, width: u32, height: u32) -> Result<wgpu::SurfaceTexture, GiError> {
        let config = self.surface_config(width, height);
        surface.configure(self.plugin.device(), &config);
        match surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                surface.configure(self.plugin.device(), &config);
                surface.get_current_texture().map_err(|e| GiError::Surface(e.to_string()))
            }
            Err(e) => Err(GiError::Surface(e.to_string())),
        }
    }

    fn present(
        &mut self,
        view: &ExtractedView,
        raw_window_handle: RawWindowHandle,
        raw_display_handle: RawDisplayHandle,
    ) -> Result<(), GiError> {
        let (width, height) = view.viewport_size;
        if width == 0 || height == 0 {
            // Minimized: no image to draw, but a missing settings object still fails.
            rc2d_renderer::resolve(view.gi_settings.as_ref(), view.viewport_size)?;
            return Ok(());
        }
        // SAFETY: the host keeps the window alive across this call; the surface does
        // not outlive it.
        let surface = unsafe { surface_from_raw(&self.instance, raw_window_handle, raw_display_handle)? };
        let frame = self.acquire(&surface, width, height)?;
        let target = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        // Writes every pixel of the image: GI composite, or the unlit scene when skipped.
        self.plugin.render_frame_to_view(view, &target)?;
        frame.present();
        Ok(())
    }
}

impl RenderBackend for Rc2dWindowBackend {
    fn prepare(&mut self, extracted: &ExtractedMeshes) {
        self.plugin.prepare(extracted);
    }

    fn render_frame(&mut self, view: &ExtractedView) -> Result<(), String> {
        self.plugin.render_frame(view)
    }
}

impl RenderBackendWindow for Rc2dWindowBackend {
    fn render_frame_to_window(
        &mut self,
        view: &ExtractedView,
        raw_window_handle: RawWindowHandle,
        raw_display_handle: RawDisplayHandle,
    ) -> Result<(), String> {
        self.present(view, raw_window_handle, raw_display_handle).map_err(|e| e.to_string())
    }
}
