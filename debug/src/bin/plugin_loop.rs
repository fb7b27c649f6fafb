//! Host loop: use render_api types and Rc2dPlugin as RenderBackend (prepare + render_frame),
//! then read the composited frame back and write it to rc2d_frame.png.

use std::collections::HashMap;

use rc2d_bridge::Rc2dPlugin;
use rc2d_renderer::pack_vertices;
use render_api::{ExtractedMesh, ExtractedMeshes, ExtractedView, GiSettings, Overridable, RenderBackend};

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

/// Axis-aligned quad in clip space with one flat color.
fn quad(entity_id: u64, min: [f32; 2], max: [f32; 2], color: [f32; 4]) -> ExtractedMesh {
    let vertex_data = pack_vertices(&[
        ([min[0], min[1]], color),
        ([max[0], min[1]], color),
        ([max[0], max[1]], color),
        ([min[0], max[1]], color),
    ]);
    let index_data: Vec<u8> = bytemuck::cast_slice(&[0u32, 1, 2, 0, 2, 3]).to_vec();
    ExtractedMesh { entity_id, vertex_data, index_data, transform: IDENTITY, visible: true, layer: 0 }
}

fn main() -> Result<(), String> {
    env_logger::init();
    let (device, queue) = pollster::block_on(request_device())?;
    let mut plugin = Rc2dPlugin::new(device, queue).map_err(|e| e.to_string())?;

    // A warm light on the left, a dark occluder in the middle.
    let mut meshes = HashMap::new();
    for mesh in [
        quad(1, [-0.8, -0.2], [-0.6, 0.2], [4.0, 3.0, 1.5, 1.0]),
        quad(2, [-0.1, -0.5], [0.1, 0.5], [0.0, 0.0, 0.0, 1.0]),
    ] {
        meshes.insert(mesh.entity_id, mesh);
    }
    let extracted = ExtractedMeshes { meshes };
    let view = ExtractedView {
        view_proj: IDENTITY,
        viewport_size: (640, 360),
        gi_settings: Some(GiSettings {
            cascade_count: Overridable::overridden(6),
            sky_radiance: true,
            ..GiSettings::active()
        }),
    };

    let backend: &mut dyn RenderBackend = &mut plugin;
    backend.prepare(&extracted);
    backend.render_frame(&view)?;

    let (width, height, pixels) = plugin
        .read_output_rgba8()
        .map_err(|e| e.to_string())?
        .ok_or("no frame was rendered")?;
    let img = image::RgbaImage::from_raw(width, height, pixels).ok_or("readback size mismatch")?;
    img.save("rc2d_frame.png").map_err(|e| e.to_string())?;
    println!("rc2d plugin_loop: {}x{} frame written to rc2d_frame.png", width, height);
    Ok(())
}

async fn request_device() -> Result<(wgpu::Device, wgpu::Queue), String> {
    let instance = wgpu::Instance::default();
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions::default())
        .await
        .ok_or("No adapter")?;
    adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await
        .map_err(|e| e.to_string())
}
