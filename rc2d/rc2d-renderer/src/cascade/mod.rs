//! Radiance cascade pass: one compute dispatch per level, coarsest first. Each level
//! reads the level above from one cascade array and writes the other.

use wgpu::CommandEncoder;

use crate::error::Result;
use crate::kernels::{self, KernelId, UniformSlots};
use crate::resolve::{FrameParams, FrameResolution, MAX_CASCADE_COUNT};
use crate::resources::{CASCADE_FORMAT, CASCADE_LAYERS};

/// Frame-constant inputs of the GI kernel, bound once per frame.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct CascadeGlobals {
    sky_color: [f32; 4],
    sun_color: [f32; 4],
    aspect: [f32; 2],
    resolution: [f32; 2],
    cascade_count: u32,
    sky_radiance: f32,
    sun_angle: f32,
    _pad: f32,
}

impl CascadeGlobals {
    pub(crate) fn from_params(params: &FrameParams) -> Self {
        Self {
            sky_color: params.sky_color,
            sun_color: params.sun_color,
            aspect: params.aspect,
            resolution: params.resolution.as_f32(),
            cascade_count: params.cascade_count,
            sky_radiance: if params.sky_radiance { 1.0 } else { 0.0 },
            sun_angle: params.sun_angle,
            _pad: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct CascadeLevel {
    level: u32,
    _pad: [u32; 3],
}

/// Texel layout of one cascade level, matching `cascade.wgsl`.
///
/// Level `i` places a cell every `2^i` pixels. Each cell owns a `2^i x 2^i` block in
/// both array layers, so it stores `2 * 4^i` directions. Direction `angle` covers the
/// arc `[angle, angle + 1) * TAU / angle_count`.
pub mod layout {
    use std::f32::consts::TAU;

    use crate::resources::CASCADE_LAYERS;

    pub fn block(level: u32) -> u32 {
        1 << level
    }

    pub fn angle_count(level: u32) -> u32 {
        CASCADE_LAYERS * block(level) * block(level)
    }

    /// `(cell, angle)` stored at `texel` of array `layer`.
    pub fn texel_to_cell_angle(level: u32, texel: (u32, u32), layer: u32) -> ((u32, u32), u32) {
        let b = block(level);
        let cell = (texel.0 / b, texel.1 / b);
        let local = (texel.0 % b, texel.1 % b);
        (cell, (local.1 * b + local.0) * CASCADE_LAYERS + layer)
    }

    /// `(texel, layer)` holding `angle` of `cell`.
    pub fn cell_angle_to_texel(level: u32, cell: (u32, u32), angle: u32) -> ((u32, u32), u32) {
        let b = block(level);
        let layer = angle % CASCADE_LAYERS;
        let idx = angle / CASCADE_LAYERS;
        ((cell.0 * b + idx % b, cell.1 * b + idx / b), layer)
    }

    /// Directions of the next coarser level that continue `angle`.
    pub fn child_angles(angle: u32) -> [u32; 4] {
        [angle * 4, angle * 4 + 1, angle * 4 + 2, angle * 4 + 3]
    }

    /// Arc covered by `angle` at `level`, in radians.
    pub fn arc(level: u32, angle: u32) -> (f32, f32) {
        let n = angle_count(level) as f32;
        (angle as f32 / n * TAU, (angle + 1) as f32 / n * TAU)
    }

    /// March interval of `level` in pixels: `[(4^i - 1) / 3, (4^(i+1) - 1) / 3)`.
    pub fn interval(level: u32) -> (f32, f32) {
        let start = (4f32.powi(level as i32) - 1.0) / 3.0;
        let end = (4f32.powi(level as i32 + 1) - 1.0) / 3.0;
        (start, end)
    }
}

pub struct CascadePass {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    globals_buf: wgpu::Buffer,
    levels: UniformSlots,
}

impl CascadePass {
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let shader = kernels::shader_module(device, KernelId::CascadeGi, kernels::CASCADE_SHADER)?;
        let compute = wgpu::ShaderStages::COMPUTE;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cascade_bind_group_layout"),
            entries: &[
                kernels::texture_entry(0, compute, wgpu::TextureViewDimension::D2),
                kernels::texture_entry(1, compute, wgpu::TextureViewDimension::D2),
                kernels::uniform_entry(2, compute, std::mem::size_of::<CascadeGlobals>() as u64, false),
                kernels::uniform_entry(3, compute, std::mem::size_of::<CascadeLevel>() as u64, true),
                kernels::texture_entry(4, compute, wgpu::TextureViewDimension::D2Array),
                kernels::storage_entry(5, CASCADE_FORMAT, wgpu::TextureViewDimension::D2Array),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cascade_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = kernels::compute_pipeline(device, KernelId::CascadeGi, &pipeline_layout, &shader)?;
        let globals_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cascade_globals"),
            size: std::mem::size_of::<CascadeGlobals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let levels = UniformSlots::new(
            device,
            "cascade_levels",
            std::mem::size_of::<CascadeLevel>() as u64,
            MAX_CASCADE_COUNT,
        );
        Ok(Self { pipeline, bind_group_layout, globals_buf, levels })
    }

    /// Frame-constant globals plus one level slot per cascade.
    pub fn upload(&self, queue: &wgpu::Queue, params: &FrameParams) {
        queue.write_buffer(&self.globals_buf, 0, bytemuck::bytes_of(&CascadeGlobals::from_params(params)));
        for level in 0..params.cascade_count.min(MAX_CASCADE_COUNT) {
            self.levels.write(queue, level, &CascadeLevel { level, _pad: [0; 3] });
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn encode_level(
        &self,
        encoder: &mut CommandEncoder,
        device: &wgpu::Device,
        level: u32,
        color: &wgpu::TextureView,
        distance: &wgpu::TextureView,
        upper: &wgpu::TextureView,
        lower: &wgpu::TextureView,
        resolution: FrameResolution,
    ) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cascade_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(color) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(distance) },
                wgpu::BindGroupEntry { binding: 2, resource: self.globals_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: self.levels.binding() },
                wgpu::BindGroupEntry { binding: 4, resource: wgpu::BindingResource::TextureView(upper) },
                wgpu::BindGroupEntry { binding: 5, resource: wgpu::BindingResource::TextureView(lower) },
            ],
        });
        let (tiles_x, tiles_y) = resolution.tiles();
        let mut cp = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("cascade_gi"),
            timestamp_writes: None,
        });
        cp.set_pipeline(&self.pipeline);
        cp.set_bind_group(0, &bind_group, &[self.levels.offset(level.min(MAX_CASCADE_COUNT - 1))]);
        cp.dispatch_workgroups(tiles_x, tiles_y, CASCADE_LAYERS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{resolve, Resolved};
    use render_api::GiSettings;

    #[test]
    fn uniforms_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<CascadeGlobals>(), 64);
        assert_eq!(std::mem::size_of::<CascadeLevel>(), 16);
    }

    #[test]
    fn globals_carry_frame_params() {
        let settings = GiSettings { sky_radiance: true, ..GiSettings::active() };
        let Ok(Resolved::Run(params)) = resolve(Some(&settings), (256, 128)) else {
            panic!("frame should run");
        };
        let g = CascadeGlobals::from_params(&params);
        assert_eq!(g.cascade_count, params.cascade_count);
        assert_eq!(g.resolution, [256.0, 128.0]);
        assert_eq!(g.aspect, [1.0, 0.5]);
        assert_eq!(g.sky_radiance, 1.0);
        assert_eq!(g.sun_color, settings.sun_color);
    }

    #[test]
    fn texel_encoding_round_trips() {
        let (w, h) = (64u32, 32u32);
        for level in 0..5 {
            let mut seen = std::collections::HashSet::new();
            for layer in 0..CASCADE_LAYERS {
                for y in 0..h {
                    for x in 0..w {
                        let (cell, angle) = layout::texel_to_cell_angle(level, (x, y), layer);
                        assert!(angle < layout::angle_count(level));
                        assert_eq!(layout::cell_angle_to_texel(level, cell, angle), ((x, y), layer));
                        assert!(seen.insert((cell, angle)), "level {level}: ({cell:?}, {angle}) stored twice");
                    }
                }
            }
            // Every (cell, direction) pair has exactly one texel.
            let cells = (w / layout::block(level)) * (h / layout::block(level));
            assert_eq!(seen.len() as u32, cells * layout::angle_count(level));
        }
    }

    #[test]
    fn children_tile_parent_arc() {
        for level in 0..5 {
            for angle in 0..layout::angle_count(level) {
                let (start, end) = layout::arc(level, angle);
                let children = layout::child_angles(angle);
                assert!(children.iter().all(|&c| c < layout::angle_count(level + 1)));
                let arcs: Vec<_> = children.iter().map(|&c| layout::arc(level + 1, c)).collect();
                assert!((arcs[0].0 - start).abs() < 1e-5);
                assert!((arcs[3].1 - end).abs() < 1e-5);
                for pair in arcs.windows(2) {
                    assert!((pair[0].1 - pair[1].0).abs() < 1e-5);
                }
            }
        }
    }

    #[test]
    fn intervals_are_contiguous() {
        assert_eq!(layout::interval(0), (0.0, 1.0));
        for level in 0..MAX_CASCADE_COUNT {
            let (start, end) = layout::interval(level);
            assert!(end > start);
            assert_eq!(end, layout::interval(level + 1).0);
        }
    }

    #[test]
    fn sky_off_is_zero() {
        let Ok(Resolved::Run(params)) = resolve(Some(&GiSettings::active()), (64, 64)) else {
            panic!("frame should run");
        };
        assert_eq!(CascadeGlobals::from_params(&params).sky_radiance, 0.0);
    }
}
