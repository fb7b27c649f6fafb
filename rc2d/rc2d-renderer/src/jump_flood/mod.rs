//! Jump flood pass: seed UVs from the scene mask, log2(max side) flood steps between
//! the two flood buffers, then resolve the nearest seed into a distance field.

use wgpu::CommandEncoder;

use crate::error::Result;
use crate::kernels::{self, KernelId, UniformSlots};
use crate::resolve::{jump_flood_step_size, FrameParams};
use crate::resources::{DISTANCE_FORMAT, FLOOD_FORMAT};

/// One slot per flood step. A u32-sized side needs at most 32 steps.
const FLOOD_SLOTS: u32 = 32;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct FloodUniform {
    aspect: [f32; 2],
    resolution: [f32; 2],
    step_size: f32,
    _pad: [f32; 3],
}

pub struct FloodPass {
    screen_uv: wgpu::RenderPipeline,
    jump_flood: wgpu::RenderPipeline,
    distance_field: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniforms: UniformSlots,
}

impl FloodPass {
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let shader = kernels::shader_module(device, KernelId::JumpFlood, kernels::FLOOD_SHADER)?;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("flood_bind_group_layout"),
            entries: &[
                kernels::texture_entry(0, wgpu::ShaderStages::FRAGMENT, wgpu::TextureViewDimension::D2),
                kernels::uniform_entry(1, wgpu::ShaderStages::FRAGMENT, std::mem::size_of::<FloodUniform>() as u64, true),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("flood_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let screen_uv = kernels::fullscreen_pipeline(
            device,
            KernelId::ScreenUv,
            &pipeline_layout,
            &shader,
            "fs_screen_uv",
            FLOOD_FORMAT,
        )?;
        let jump_flood = kernels::fullscreen_pipeline(
            device,
            KernelId::JumpFlood,
            &pipeline_layout,
            &shader,
            "fs_jump_flood",
            FLOOD_FORMAT,
        )?;
        let distance_field = kernels::fullscreen_pipeline(
            device,
            KernelId::DistanceField,
            &pipeline_layout,
            &shader,
            "fs_distance_field",
            DISTANCE_FORMAT,
        )?;
        let uniforms = UniformSlots::new(
            device,
            "flood_uniforms",
            std::mem::size_of::<FloodUniform>() as u64,
            FLOOD_SLOTS,
        );
        Ok(Self { screen_uv, jump_flood, distance_field, bind_group_layout, uniforms })
    }

    /// Write the per-step uniforms for this frame. Slot 0 also serves the seed and
    /// distance kernels, which ignore `step_size`.
    pub fn upload(&self, queue: &wgpu::Queue, params: &FrameParams) {
        for n in 0..params.flood_steps.clamp(1, FLOOD_SLOTS) {
            let uniform = FloodUniform {
                aspect: params.aspect,
                resolution: params.resolution.as_f32(),
                step_size: jump_flood_step_size(n),
                _pad: [0.0; 3],
            };
            self.uniforms.write(queue, n, &uniform);
        }
    }

    pub fn encode_screen_uv(
        &self,
        encoder: &mut CommandEncoder,
        device: &wgpu::Device,
        color: &wgpu::TextureView,
        dst: &wgpu::TextureView,
    ) {
        self.blit(encoder, device, &self.screen_uv, "screen_uv", color, dst, 0);
    }

    pub fn encode_step(
        &self,
        encoder: &mut CommandEncoder,
        device: &wgpu::Device,
        step: u32,
        src: &wgpu::TextureView,
        dst: &wgpu::TextureView,
    ) {
        self.blit(encoder, device, &self.jump_flood, "jump_flood", src, dst, step.min(FLOOD_SLOTS - 1));
    }

    pub fn encode_distance(
        &self,
        encoder: &mut CommandEncoder,
        device: &wgpu::Device,
        src: &wgpu::TextureView,
        dst: &wgpu::TextureView,
    ) {
        self.blit(encoder, device, &self.distance_field, "distance_field", src, dst, 0);
    }

    #[allow(clippy::too_many_arguments)]
    fn blit(
        &self,
        encoder: &mut CommandEncoder,
        device: &wgpu::Device,
        pipeline: &wgpu::RenderPipeline,
        label: &str,
        src: &wgpu::TextureView,
        dst: &wgpu::TextureView,
        slot: u32,
    ) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("flood_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(src) },
                wgpu::BindGroupEntry { binding: 1, resource: self.uniforms.binding() },
            ],
        });
        let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dst,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        rp.set_pipeline(pipeline);
        rp.set_bind_group(0, &bind_group, &[self.uniforms.offset(slot)]);
        rp.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::jump_flood_steps;

    #[test]
    fn uniform_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<FloodUniform>(), 32);
    }

    /// CPU mirror of fs_jump_flood over a w x h grid, seeds in pixel units.
    fn flood(w: usize, h: usize, seeds: &[(usize, usize)]) -> Vec<Option<(usize, usize)>> {
        let mut grid: Vec<Option<(usize, usize)>> = vec![None; w * h];
        for &(x, y) in seeds {
            grid[y * w + x] = Some((x, y));
        }
        let longest = w.max(h) as u32;
        for n in 0..jump_flood_steps(longest) {
            let jump = ((jump_flood_step_size(n) * longest as f32).round() as i64).max(1);
            let src = grid.clone();
            for y in 0..h as i64 {
                for x in 0..w as i64 {
                    let mut best: Option<((usize, usize), i64)> = None;
                    for dy in -1..=1i64 {
                        for dx in -1..=1i64 {
                            let (sx, sy) = (x + dx * jump, y + dy * jump);
                            if sx < 0 || sy < 0 || sx >= w as i64 || sy >= h as i64 {
                                continue;
                            }
                            if let Some(seed) = src[(sy as usize) * w + sx as usize] {
                                let d = (seed.0 as i64 - x).pow(2) + (seed.1 as i64 - y).pow(2);
                                if best.map_or(true, |(_, bd)| d < bd) {
                                    best = Some((seed, d));
                                }
                            }
                        }
                    }
                    grid[(y as usize) * w + x as usize] = best.map(|(s, _)| s);
                }
            }
        }
        grid
    }

    fn nearest_sq(x: usize, y: usize, seeds: &[(usize, usize)]) -> i64 {
        seeds
            .iter()
            .map(|&(sx, sy)| (sx as i64 - x as i64).pow(2) + (sy as i64 - y as i64).pow(2))
            .min()
            .unwrap()
    }

    #[test]
    fn step_schedule_reaches_every_pixel() {
        let (w, h) = (64, 32);
        let seeds = [(3, 4), (60, 30), (31, 0)];
        let grid = flood(w, h, &seeds);
        for y in 0..h {
            for x in 0..w {
                let seed = grid[y * w + x].expect("pixel left without a seed");
                let d = (seed.0 as i64 - x as i64).pow(2) + (seed.1 as i64 - y as i64).pow(2);
                // Jump flooding is approximate; allow a small error over the exact nearest.
                let exact = nearest_sq(x, y, &seeds);
                assert!(d <= exact * 2 + 2, "({x},{y}) got {d}, exact {exact}");
            }
        }
    }

    #[test]
    fn single_seed_is_exact() {
        let (w, h) = (40, 40);
        let grid = flood(w, h, &[(17, 23)]);
        assert!(grid.iter().all(|s| *s == Some((17, 23))));
    }

    #[test]
    fn no_seed_stays_empty() {
        let grid = flood(16, 16, &[]);
        assert!(grid.iter().all(|s| s.is_none()));
    }
}
