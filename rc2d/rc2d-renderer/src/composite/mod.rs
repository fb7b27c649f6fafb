//! Composite pass: overwrite the host color target with the GI color texture,
//! optionally tone mapped.

use wgpu::CommandEncoder;

use crate::config::ToneMapping;
use crate::error::Result;
use crate::kernels::{self, KernelId};

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct CompositeParams {
    source_size: [f32; 2],
    target_size: [f32; 2],
    tone_mode: u32,
    _pad: [u32; 3],
}

impl CompositeParams {
    pub(crate) fn new(source: (u32, u32), target: (u32, u32), tone_mapping: ToneMapping) -> Self {
        Self {
            source_size: [source.0 as f32, source.1 as f32],
            target_size: [target.0.max(1) as f32, target.1.max(1) as f32],
            tone_mode: tone_mapping.as_u32(),
            _pad: [0; 3],
        }
    }
}

pub struct CompositePass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    tone_mapping: ToneMapping,
    params_buf: wgpu::Buffer,
}

impl CompositePass {
    pub fn new(
        device: &wgpu::Device,
        output_format: wgpu::TextureFormat,
        tone_mapping: ToneMapping,
    ) -> Result<Self> {
        let shader = kernels::shader_module(device, KernelId::Composite, kernels::COMPOSITE_SHADER)?;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite_bind_group_layout"),
            entries: &[
                kernels::texture_entry(0, wgpu::ShaderStages::FRAGMENT, wgpu::TextureViewDimension::D2),
                kernels::uniform_entry(
                    1,
                    wgpu::ShaderStages::FRAGMENT,
                    std::mem::size_of::<CompositeParams>() as u64,
                    false,
                ),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("composite_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = kernels::fullscreen_pipeline(
            device,
            KernelId::Composite,
            &pipeline_layout,
            &shader,
            "fs",
            output_format,
        )?;
        let params_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("composite_params"),
            size: std::mem::size_of::<CompositeParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(Self { pipeline, bind_group_layout, tone_mapping, params_buf })
    }

    /// `source` is the GI resolution, `target` the host color target size.
    pub fn upload(&self, queue: &wgpu::Queue, source: (u32, u32), target: (u32, u32)) {
        let params = CompositeParams::new(source, target, self.tone_mapping);
        queue.write_buffer(&self.params_buf, 0, bytemuck::bytes_of(&params));
    }

    pub fn encode(
        &self,
        encoder: &mut CommandEncoder,
        device: &wgpu::Device,
        gi_color_view: &wgpu::TextureView,
        output_view: &wgpu::TextureView,
    ) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(gi_color_view) },
                wgpu::BindGroupEntry { binding: 1, resource: self.params_buf.as_entire_binding() },
            ],
        });
        // The whole target is overwritten, so its previous contents are not loaded.
        let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("composite_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        rp.set_pipeline(&self.pipeline);
        rp.set_bind_group(0, &bind_group, &[]);
        rp.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<CompositeParams>(), 32);
    }

    #[test]
    fn params_encode_tone_mode() {
        let p = CompositeParams::new((512, 256), (500, 250), ToneMapping::Reinhard);
        assert_eq!(p.tone_mode, 1);
        assert_eq!(p.source_size, [512.0, 256.0]);
        assert_eq!(p.target_size, [500.0, 250.0]);
        assert_eq!(CompositeParams::new((1, 1), (0, 0), ToneMapping::None).tone_mode, 0);
        assert_eq!(CompositeParams::new((1, 1), (0, 0), ToneMapping::None).target_size, [1.0, 1.0]);
    }
}
