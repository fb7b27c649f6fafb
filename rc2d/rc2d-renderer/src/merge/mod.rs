//! Cascade merge: collapse the two layers of the finest cascade into the color texture.

use wgpu::CommandEncoder;

use crate::error::Result;
use crate::kernels::{self, KernelId};
use crate::resolve::{FrameParams, FrameResolution};
use crate::resources::COLOR_FORMAT;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct MergeParams {
    resolution: [f32; 2],
    _pad: [f32; 2],
}

/// CPU form of the merge kernel for one texel: mean of both layers' rgb, opaque.
pub fn merge_layers(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [(a[0] + b[0]) * 0.5, (a[1] + b[1]) * 0.5, (a[2] + b[2]) * 0.5, 1.0]
}

pub struct MergePass {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buf: wgpu::Buffer,
}

impl MergePass {
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let shader = kernels::shader_module(device, KernelId::CascadeMerge, kernels::MERGE_SHADER)?;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("merge_bind_group_layout"),
            entries: &[
                kernels::texture_entry(0, wgpu::ShaderStages::COMPUTE, wgpu::TextureViewDimension::D2Array),
                kernels::storage_entry(1, COLOR_FORMAT, wgpu::TextureViewDimension::D2),
                kernels::uniform_entry(
                    2,
                    wgpu::ShaderStages::COMPUTE,
                    std::mem::size_of::<MergeParams>() as u64,
                    false,
                ),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("merge_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = kernels::compute_pipeline(device, KernelId::CascadeMerge, &pipeline_layout, &shader)?;
        let params_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("merge_params"),
            size: std::mem::size_of::<MergeParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(Self { pipeline, bind_group_layout, params_buf })
    }

    pub fn upload(&self, queue: &wgpu::Queue, params: &FrameParams) {
        let uniform = MergeParams { resolution: params.resolution.as_f32(), _pad: [0.0; 2] };
        queue.write_buffer(&self.params_buf, 0, bytemuck::bytes_of(&uniform));
    }

    pub fn encode(
        &self,
        encoder: &mut CommandEncoder,
        device: &wgpu::Device,
        cascade: &wgpu::TextureView,
        color: &wgpu::TextureView,
        resolution: FrameResolution,
    ) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("merge_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(cascade) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(color) },
                wgpu::BindGroupEntry { binding: 2, resource: self.params_buf.as_entire_binding() },
            ],
        });
        let (tiles_x, tiles_y) = resolution.tiles();
        let mut cp = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("cascade_merge"),
            timestamp_writes: None,
        });
        cp.set_pipeline(&self.pipeline);
        cp.set_bind_group(0, &bind_group, &[]);
        cp.dispatch_workgroups(tiles_x, tiles_y, 1);
    }
}
