//! rc2d plugin: implements RenderBackend for the host, rendering into an offscreen
//! host color target or a caller-provided view. Frames with GI off still draw the
//! scene, unlit, so the target never shows stale contents.

use std::collections::{HashMap, HashSet};
use std::sync::{mpsc, Arc};

use rc2d_renderer::{layer_visible, GiError, MaskDraw, MeshMaskPass, MeshScene, Renderer, RendererConfig};
use render_api::{ExtractedMeshes, ExtractedView, RenderBackend, MASK_VERTEX_STRIDE};

/// Cached GPU buffers and world transform for one mesh.
struct CachedMesh {
    vertex_buf: Arc<wgpu::Buffer>,
    index_buf: Arc<wgpu::Buffer>,
    index_count: u32,
    vertex_len: usize,
    index_len: usize,
    transform: [f32; 16],
    layer: u32,
}

/// Offscreen stand-in for the host color target when no window is attached.
struct OutputTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

/// rc2d plugin: owns the renderer and the mesh cache; implements RenderBackend.
pub struct Rc2dPlugin {
    renderer: Renderer,
    mask_pass: MeshMaskPass,
    /// Draws the scene straight into the host target when GI is skipped.
    unlit_pass: MeshMaskPass,
    /// Cache by entity_id. Updated in prepare() from ExtractedMeshes.
    mesh_cache: HashMap<u64, CachedMesh>,
    output: Option<OutputTarget>,
}

impl Rc2dPlugin {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Result<Self, GiError> {
        Self::new_with_config(device, queue, RendererConfig::default())
    }

    pub fn new_with_config(device: wgpu::Device, queue: wgpu::Queue, config: RendererConfig) -> Result<Self, GiError> {
        let renderer = Renderer::new_with_config(device, queue, config)?;
        let mask_pass = MeshMaskPass::new(renderer.device())?;
        let unlit_pass = MeshMaskPass::with_format(renderer.device(), renderer.config().output_format)?;
        Ok(Self { renderer, mask_pass, unlit_pass, mesh_cache: HashMap::new(), output: None })
    }

    pub fn device(&self) -> &wgpu::Device {
        self.renderer.device()
    }
    pub fn queue(&self) -> &wgpu::Queue {
        self.renderer.queue()
    }
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Number of meshes currently uploaded.
    pub fn cached_mesh_count(&self) -> usize {
        self.mesh_cache.len()
    }

    /// Render one frame into `target_view` (e.g. a swapchain view) instead of the
    /// offscreen output.
    pub fn render_frame_to_view(&mut self, view: &ExtractedView, target_view: &wgpu::TextureView) -> Result<(), GiError> {
        let lights = self.mask_draws(self.renderer.config().light_layer_mask);
        let scene = MeshScene { pass: &self.mask_pass, meshes: &lights, view_proj: view.view_proj };
        match self.renderer.render_frame(view.gi_settings.as_ref(), view.viewport_size, &scene, target_view)? {
            Some(cmd) => self.renderer.submit([cmd]),
            None => self.draw_unlit(view, target_view),
        }
        Ok(())
    }

    /// Every cached mesh, cleared to black, no GI.
    fn draw_unlit(&self, view: &ExtractedView, target_view: &wgpu::TextureView) {
        let meshes = self.mask_draws(u32::MAX);
        let device = self.renderer.device();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("rc2d_unlit") });
        {
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("rc2d_unlit"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target_view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.unlit_pass.draw_meshes(&mut rp, device, self.renderer.queue(), &meshes, &view.view_proj);
        }
        self.renderer.submit([encoder.finish()]);
    }

    /// Read the offscreen output back as tightly packed RGBA8 rows.
    /// `None` before the first offscreen frame.
    pub fn read_output_rgba8(&self) -> Result<Option<(u32, u32, Vec<u8>)>, GiError> {
        let Some(output) = &self.output else {
            return Ok(None);
        };
        let format = self.renderer.config().output_format;
        if format.block_copy_size(None) != Some(4) {
            return Err(GiError::Readback(format!("output format {:?} is not 4 bytes per pixel", format)));
        }
        let (width, height) = output.size;
        let padded = padded_bytes_per_row(width);
        let device = self.renderer.device();
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("rc2d_readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("rc2d_readback") });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &output.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout { offset: 0, bytes_per_row: Some(padded), rows_per_image: Some(height) },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.renderer.submit([encoder.finish()]);

        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| GiError::Readback(e.to_string()))?
            .map_err(|e| GiError::Readback(e.to_string()))?;
        let pixels = unpad_rows(&slice.get_mapped_range(), width * 4, padded, height);
        buffer.unmap();
        Ok(Some((width, height, pixels)))
    }

    /// Cached meshes whose layer is in `layer_mask`.
    fn mask_draws(&self, layer_mask: u32) -> Vec<MaskDraw> {
        self.mesh_cache
            .values()
            .filter(|c| layer_visible(c.layer, layer_mask))
            .map(|c| MaskDraw {
                vertex_buf: Arc::clone(&c.vertex_buf),
                index_buf: Arc::clone(&c.index_buf),
                index_count: c.index_count,
                transform: c.transform,
            })
            .collect()
    }

    fn ensure_output(&mut self, size: (u32, u32)) {
        if matches!(&self.output, Some(o) if o.size == size) {
            return;
        }
        log::debug!("allocating offscreen output {}x{}", size.0, size.1);
        let texture = self.renderer.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("rc2d_output"),
            size: wgpu::Extent3d { width: size.0, height: size.1, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.renderer.config().output_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.output = Some(OutputTarget { texture, view, size });
    }

    fn render_offscreen(&mut self, view: &ExtractedView) -> Result<(), GiError> {
        let (width, height) = view.viewport_size;
        if width > 0 && height > 0 {
            self.ensure_output((width, height));
        }
        let Some(output) = self.output.take() else {
            // Nothing to composite over yet; a missing settings object is still an error.
            rc2d_renderer::resolve(view.gi_settings.as_ref(), view.viewport_size)?;
            return Ok(());
        };
        let rendered = self.render_frame_to_view(view, &output.view);
        self.output = Some(output);
        rendered
    }
}

impl RenderBackend for Rc2dPlugin {
    fn prepare(&mut self, extracted: &ExtractedMeshes) {
        let device = self.renderer.device();
        let queue = self.renderer.queue();
        let current_entities: HashSet<u64> = extracted.meshes.keys().copied().collect();
        self.mesh_cache.retain(|k, _| current_entities.contains(k));
        for (&entity_id, mesh) in &extracted.meshes {
            if !mesh.visible || mesh.vertex_data.is_empty() || mesh.index_data.is_empty() {
                self.mesh_cache.remove(&entity_id);
                continue;
            }
            if mesh.vertex_data.len() % MASK_VERTEX_STRIDE != 0 || mesh.index_data.len() % 4 != 0 {
                log::warn!("mesh {} has malformed vertex or index data, skipped", entity_id);
                self.mesh_cache.remove(&entity_id);
                continue;
            }
            if mesh.layer >= 32 {
                log::warn!("mesh {} is on layer {}, outside 0..=31, skipped", entity_id, mesh.layer);
                self.mesh_cache.remove(&entity_id);
                continue;
            }
            let vertex_len = mesh.vertex_data.len();
            let index_len = mesh.index_data.len();
            let index_count = (index_len / 4) as u32;
            if let Some(cached) = self.mesh_cache.get_mut(&entity_id) {
                if cached.vertex_len == vertex_len && cached.index_len == index_len {
                    queue.write_buffer(&cached.vertex_buf, 0, &mesh.vertex_data);
                    queue.write_buffer(&cached.index_buf, 0, &mesh.index_data);
                    cached.transform = mesh.transform;
                    cached.layer = mesh.layer;
                    continue;
                }
            }
            let vertex_buf = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("rc2d_mesh_vertex"),
                size: vertex_len as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            queue.write_buffer(&vertex_buf, 0, &mesh.vertex_data);
            let index_buf = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("rc2d_mesh_index"),
                size: index_len as u64,
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            queue.write_buffer(&index_buf, 0, &mesh.index_data);
            self.mesh_cache.insert(
                entity_id,
                CachedMesh {
                    vertex_buf: Arc::new(vertex_buf),
                    index_buf: Arc::new(index_buf),
                    index_count,
                    vertex_len,
                    index_len,
                    transform: mesh.transform,
                    layer: mesh.layer,
                },
            );
        }
    }

    fn render_frame(&mut self, view: &ExtractedView) -> Result<(), String> {
        self.render_offscreen(view).map_err(|e| e.to_string())
    }
}

/// Row pitch of a texture-to-buffer copy of an RGBA8 row.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(align) * align
}

pub(crate) fn unpad_rows(data: &[u8], row_bytes: u32, padded: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity((row_bytes * height) as usize);
    for row in data.chunks(padded as usize).take(height as usize) {
        out.extend_from_slice(&row[..row_bytes as usize]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc2d_renderer::pack_vertices;
    use render_api::{ExtractedMesh, GiSettings};

    fn gpu() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let adapter = wgpu::Instance::default()
                .request_adapter(&wgpu::RequestAdapterOptions::default())
                .await?;
            adapter.request_device(&wgpu::DeviceDescriptor::default(), None).await.ok()
        })
    }

    fn quad(entity_id: u64, min: [f32; 2], max: [f32; 2], color: [f32; 4], layer: u32) -> ExtractedMesh {
        let vertex_data = pack_vertices(&[
            ([min[0], min[1]], color),
            ([max[0], min[1]], color),
            ([max[0], max[1]], color),
            ([min[0], max[1]], color),
        ]);
        let index_data = [0u32, 1, 2, 0, 2, 3].iter().flat_map(|i| i.to_ne_bytes()).collect();
        let transform = ExtractedView::default().view_proj;
        ExtractedMesh { entity_id, vertex_data, index_data, transform, visible: true, layer }
    }

    fn scene(meshes: impl IntoIterator<Item = ExtractedMesh>) -> ExtractedMeshes {
        ExtractedMeshes { meshes: meshes.into_iter().map(|m| (m.entity_id, m)).collect() }
    }

    #[test]
    fn light_layer_mask_filters_gi_meshes() {
        let Some((device, queue)) = gpu() else {
            eprintln!("no wgpu adapter, skipping");
            return;
        };
        let config = RendererConfig { light_layer_mask: 0b1, ..RendererConfig::default() };
        let mut plugin = Rc2dPlugin::new_with_config(device, queue, config).unwrap();
        plugin.prepare(&scene([
            quad(1, [-0.5, -0.5], [0.0, 0.0], [1.0; 4], 0),
            quad(2, [0.0, 0.0], [0.5, 0.5], [1.0; 4], 3),
            quad(3, [0.5, 0.5], [1.0, 1.0], [1.0; 4], 40),
        ]));
        assert_eq!(plugin.cached_mesh_count(), 2);
        assert_eq!(plugin.mask_draws(plugin.renderer().config().light_layer_mask).len(), 1);
        assert_eq!(plugin.mask_draws(u32::MAX).len(), 2);
    }

    #[test]
    fn skipped_frame_draws_scene_unlit() {
        let Some((device, queue)) = gpu() else {
            eprintln!("no wgpu adapter, skipping");
            return;
        };
        let mut plugin = Rc2dPlugin::new(device, queue).unwrap();
        plugin.prepare(&scene([quad(1, [-1.0, -1.0], [1.0, 1.0], [1.0, 0.0, 0.0, 1.0], 0)]));
        let view = ExtractedView { viewport_size: (16, 16), gi_settings: Some(GiSettings::default()), ..Default::default() };
        plugin.render_frame(&view).unwrap();
        let (width, height, pixels) = plugin.read_output_rgba8().unwrap().unwrap();
        assert_eq!((width, height), (16, 16));
        assert!(pixels.chunks_exact(4).all(|p| p == [255, 0, 0, 255]));
    }

    #[test]
    fn row_pitch_is_copy_aligned() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(800), 3328);
    }

    #[test]
    fn unpad_drops_row_padding() {
        let padded = 8;
        let data: Vec<u8> = (0..24).collect();
        let out = unpad_rows(&data, 4, padded, 3);
        assert_eq!(out, vec![0, 1, 2, 3, 8, 9, 10, 11, 16, 17, 18, 19]);
    }
}
