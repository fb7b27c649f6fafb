//! Scene mask: the host's 2D scene rasterized into the GI color texture. RGB is
//! emitted radiance (or albedo-as-light), alpha marks occupied pixels.

use std::sync::Arc;

use render_api::MASK_VERTEX_STRIDE;

use crate::error::Result;
use crate::kernels::{self, KernelId};
use crate::resolve::FrameResolution;
use crate::resources::COLOR_FORMAT;

/// Anything that can draw the scene into the open color-target pass.
pub trait SceneMask {
    fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        resolution: FrameResolution,
    ) -> Result<()>;
}

/// An uploaded mesh: `vertex_buf` holds `position: vec2, color: vec4` per vertex.
#[derive(Clone)]
pub struct MaskDraw {
    pub vertex_buf: Arc<wgpu::Buffer>,
    pub index_buf: Arc<wgpu::Buffer>,
    pub index_count: u32,
    pub transform: [f32; 16],
}

/// Whether a mesh on `layer` passes the light layer `mask`. Layers past 31 never do.
pub fn layer_visible(layer: u32, mask: u32) -> bool {
    layer < 32 && mask & (1 << layer) != 0
}

pub struct MeshMaskPass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    view_proj_buf: wgpu::Buffer,
}

impl MeshMaskPass {
    /// Pass writing the GI color texture.
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        Self::with_format(device, COLOR_FORMAT)
    }

    /// Same meshes drawn into a target of `format`, e.g. the host color target on
    /// frames where GI is skipped.
    pub fn with_format(device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<Self> {
        let shader = kernels::shader_module(device, KernelId::SceneMask, kernels::SCENE_MASK_SHADER)?;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene_mask_bgl"),
            entries: &[
                kernels::uniform_entry(0, wgpu::ShaderStages::VERTEX, 64, false),
                kernels::uniform_entry(1, wgpu::ShaderStages::VERTEX, 64, false),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene_mask_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = kernels::checked(device, KernelId::SceneMask, || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("scene_mask"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: MASK_VERTEX_STRIDE as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute { offset: 0, shader_location: 0, format: wgpu::VertexFormat::Float32x2 },
                            wgpu::VertexAttribute { offset: 8, shader_location: 1, format: wgpu::VertexFormat::Float32x4 },
                        ],
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs"),
                    targets: &[Some(format.into())],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;
        let view_proj_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene_mask_view_proj"),
            size: 64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(Self { pipeline, bind_group_layout, view_proj_buf })
    }

    pub fn draw_meshes(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        meshes: &[MaskDraw],
        view_proj: &[f32; 16],
    ) {
        queue.write_buffer(&self.view_proj_buf, 0, bytemuck::cast_slice(view_proj));
        pass.set_pipeline(&self.pipeline);
        for mesh in meshes.iter().filter(|m| m.index_count > 0) {
            let model_buf = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("scene_mask_model"),
                size: 64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            queue.write_buffer(&model_buf, 0, bytemuck::cast_slice(&mesh.transform));
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("scene_mask_bg"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: self.view_proj_buf.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: model_buf.as_entire_binding() },
                ],
            });
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buf.slice(..));
            pass.set_index_buffer(mesh.index_buf.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}

/// Meshes drawn through a [`MeshMaskPass`] with one camera.
pub struct MeshScene<'a> {
    pub pass: &'a MeshMaskPass,
    pub meshes: &'a [MaskDraw],
    pub view_proj: [f32; 16],
}

impl SceneMask for MeshScene<'_> {
    fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        _resolution: FrameResolution,
    ) -> Result<()> {
        self.pass.draw_meshes(pass, device, queue, self.meshes, &self.view_proj);
        Ok(())
    }
}

/// Pack `(position, color)` pairs into the mask vertex layout.
pub fn pack_vertices(vertices: &[([f32; 2], [f32; 4])]) -> Vec<u8> {
    let floats: Vec<f32> = vertices
        .iter()
        .flat_map(|(p, c)| [p[0], p[1], c[0], c[1], c[2], c[3]])
        .collect();
    bytemuck::cast_slice(&floats).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_vertices_match_stride() {
        let data = pack_vertices(&[([0.0, 1.0], [1.0, 0.5, 0.25, 1.0]), ([2.0, 3.0], [0.0; 4])]);
        assert_eq!(data.len(), 2 * MASK_VERTEX_STRIDE);
        let floats: Vec<f32> = data.chunks_exact(4).map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])).collect();
        assert_eq!(&floats[..6], &[0.0, 1.0, 1.0, 0.5, 0.25, 1.0]);
        assert_eq!(floats[6], 2.0);
    }

    #[test]
    fn layer_mask_selects_bits() {
        assert!(layer_visible(0, u32::MAX));
        assert!(layer_visible(31, u32::MAX));
        assert!(layer_visible(3, 0b1000));
        assert!(!layer_visible(2, 0b1000));
        assert!(!layer_visible(0, 0));
        assert!(!layer_visible(32, u32::MAX));
    }
}
