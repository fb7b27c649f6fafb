//! Backend-agnostic window demo: only render-api + Rc2dWindowBackend, the host never
//! touches wgpu. The light orbits the occluder and the sun angle sweeps over time.
//! Run: cargo run -p debug --bin gi_window

use std::collections::HashMap;
use std::time::Instant;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rc2d_renderer::{pack_vertices, ToneMapping};
use render_api::{ExtractedMesh, ExtractedMeshes, ExtractedView, GiSettings, RenderBackendWindow};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::WindowId;

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

/// Orthographic projection (column-major) keeping world units square on screen.
fn ortho_fit(width: u32, height: u32) -> [f32; 16] {
    let aspect = if height > 0 { width as f32 / height as f32 } else { 1.0 };
    let (sx, sy) = if aspect >= 1.0 { (1.0 / aspect, 1.0) } else { (1.0, aspect) };
    [
        sx, 0.0, 0.0, 0.0,
        0.0, sy, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]
}

fn translation(x: f32, y: f32) -> [f32; 16] {
    let mut m = IDENTITY;
    m[12] = x;
    m[13] = y;
    m
}

fn square(half: f32, color: [f32; 4]) -> (Vec<u8>, Vec<u8>) {
    let vertices = pack_vertices(&[
        ([-half, -half], color),
        ([half, -half], color),
        ([half, half], color),
        ([-half, half], color),
    ]);
    let indices: Vec<u8> = bytemuck::cast_slice(&[0u32, 1, 2, 0, 2, 3]).to_vec();
    (vertices, indices)
}

struct App {
    window: Option<winit::window::Window>,
    backend: Option<Box<dyn RenderBackendWindow>>,
    size: (u32, u32),
    start: Instant,
    light: (Vec<u8>, Vec<u8>),
    wall: (Vec<u8>, Vec<u8>),
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            backend: None,
            size: (800, 600),
            start: Instant::now(),
            light: square(0.06, [6.0, 4.0, 2.0, 1.0]),
            wall: square(0.15, [0.02, 0.02, 0.02, 1.0]),
        }
    }

    fn extract(&self, t: f32) -> (ExtractedMeshes, ExtractedView) {
        let mut meshes = HashMap::new();
        meshes.insert(1u64, ExtractedMesh {
            entity_id: 1,
            vertex_data: self.light.0.clone(),
            index_data: self.light.1.clone(),
            transform: translation(0.6 * t.cos(), 0.6 * t.sin()),
            visible: true,
            layer: 0,
        });
        meshes.insert(2u64, ExtractedMesh {
            entity_id: 2,
            vertex_data: self.wall.0.clone(),
            index_data: self.wall.1.clone(),
            transform: IDENTITY,
            visible: true,
            layer: 0,
        });
        let settings = GiSettings {
            sky_radiance: true,
            sun_angle: (t * 0.25).rem_euclid(std::f32::consts::TAU).min(6.28),
            ..GiSettings::active()
        };
        let view = ExtractedView {
            view_proj: ortho_fit(self.size.0, self.size.1),
            viewport_size: self.size,
            gi_settings: Some(settings),
        };
        (ExtractedMeshes { meshes }, view)
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = winit::window::WindowAttributes::default()
            .with_title("rc2d radiance cascades")
            .with_inner_size(winit::dpi::LogicalSize::new(800, 600));
        let window = match event_loop.create_window(attrs) {
            Ok(w) => w,
            Err(e) => {
                log::error!("create window failed: {}", e);
                event_loop.exit();
                return;
            }
        };
        let phys = window.inner_size();
        self.size = (phys.width, phys.height);
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(physical) => {
                self.size = (physical.width, physical.height);
                if let Some(ref w) = self.window {
                    w.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(window) = &self.window else { return };
                let phys = window.inner_size();
                self.size = (phys.width, phys.height);
                if self.backend.is_none() {
                    match rc2d_bridge::Rc2dWindowBackend::from_window(window, ToneMapping::Reinhard) {
                        Ok(backend) => self.backend = Some(backend),
                        Err(e) => {
                            log::error!("Rc2dWindowBackend::from_window failed: {}", e);
                            event_loop.exit();
                            return;
                        }
                    }
                }
                let (raw_window, raw_display) = match (window.window_handle(), window.display_handle()) {
                    (Ok(wh), Ok(dh)) => (wh.as_raw(), dh.as_raw()),
                    _ => return,
                };
                let (extracted, view) = self.extract(self.start.elapsed().as_secs_f32());
                let Some(backend) = &mut self.backend else { return };
                backend.prepare(&extracted);
                if let Err(e) = backend.render_frame_to_window(&view, raw_window, raw_display) {
                    log::error!("frame failed: {}", e);
                    event_loop.exit();
                    return;
                }
                if let Some(ref w) = self.window {
                    w.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn main() -> Result<(), String> {
    env_logger::init();
    let event_loop = winit::event_loop::EventLoop::new().map_err(|e| e.to_string())?;
    let mut app = App::new();
    event_loop.run_app(&mut app).map_err(|e| e.to_string())?;
    Ok(())
}
