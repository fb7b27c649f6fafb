//! rc2d Renderer: wgpu-based 2D global illumination with radiance cascades.
//!
//! One frame: scene mask -> jump flood -> distance field -> cascades (coarsest first)
//! -> merge -> composite over the host color target.

pub mod cascade;
pub mod composite;
pub mod config;
pub mod error;
pub mod frame;
pub mod graph;
pub mod jump_flood;
pub mod kernels;
pub mod merge;
pub mod resolve;
pub mod resources;
pub mod scene_mask;

pub use cascade::CascadePass;
pub use composite::CompositePass;
pub use config::{RendererConfig, ToneMapping};
pub use error::{GiError, Result};
pub use frame::{run_frame, FrameOutcome};
pub use graph::{cascade_slots, flood_slots, FramePlan, PassEncoder, PassNode, ResourceUsage, Slot};
pub use jump_flood::FloodPass;
pub use kernels::KernelId;
pub use merge::MergePass;
pub use resolve::{resolve, FrameParams, FrameResolution, Resolved, SkipReason};
pub use resources::{DeviceAllocator, FrameTargets, GpuTarget, TargetAllocator, TargetPool};
pub use scene_mask::{layer_visible, pack_vertices, MaskDraw, MeshMaskPass, MeshScene, SceneMask};

use render_api::GiSettings;

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RendererConfig,
    flood_pass: FloodPass,
    cascade_pass: CascadePass,
    merge_pass: MergePass,
    composite_pass: CompositePass,
    targets: TargetPool<GpuTarget>,
}

impl Renderer {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Result<Self> {
        Self::new_with_config(device, queue, RendererConfig::default())
    }

    /// Compiles every kernel up front; a kernel that fails validation fails here.
    pub fn new_with_config(device: wgpu::Device, queue: wgpu::Queue, config: RendererConfig) -> Result<Self> {
        let flood_pass = FloodPass::new(&device)?;
        let cascade_pass = CascadePass::new(&device)?;
        let merge_pass = MergePass::new(&device)?;
        let composite_pass = CompositePass::new(&device, config.output_format, config.tone_mapping)?;
        log::info!(
            "rc2d kernels ready (output {:?}, tone mapping {:?})",
            config.output_format,
            config.tone_mapping
        );
        Ok(Self {
            device,
            queue,
            config,
            flood_pass,
            cascade_pass,
            merge_pass,
            composite_pass,
            targets: TargetPool::new(),
        })
    }

    pub fn device(&self) -> &wgpu::Device { &self.device }
    pub fn queue(&self) -> &wgpu::Queue { &self.queue }
    pub fn config(&self) -> &RendererConfig { &self.config }

    /// Working textures of the last rendered frame.
    pub fn frame_targets(&self) -> Option<&FrameTargets<GpuTarget>> {
        self.targets.current()
    }

    /// Drop the working textures; the next frame reallocates them.
    pub fn release_targets(&mut self) {
        self.targets.release();
    }

    /// Encode one GI frame into `encoder`, compositing over `output_view`.
    ///
    /// `viewport` is the host color target size. Uniforms are written to the queue
    /// here, so the encoder must be submitted before the next `encode_frame`. Commands
    /// the device rejects while recording come back as `GiError::Dispatch`; errors
    /// raised later by `finish` are the caller's to scope.
    pub fn encode_frame(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        settings: Option<&GiSettings>,
        viewport: (u32, u32),
        scene: &dyn SceneMask,
        output_view: &wgpu::TextureView,
    ) -> Result<FrameOutcome> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let recorded = self.record_frame(encoder, settings, viewport, scene, output_view);
        kernels::pop_frame_scope(&self.device, recorded)
    }

    /// Encode and finish a command buffer for one frame. `None` when the frame was
    /// skipped. Validation errors up to and including `finish` fail the frame.
    pub fn render_frame(
        &mut self,
        settings: Option<&GiSettings>,
        viewport: (u32, u32),
        scene: &dyn SceneMask,
        output_view: &wgpu::TextureView,
    ) -> Result<Option<wgpu::CommandBuffer>> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("rc2d_frame") });
        let recorded = self
            .record_frame(&mut encoder, settings, viewport, scene, output_view)
            .map(|outcome| match outcome {
                FrameOutcome::Skipped(_) => None,
                FrameOutcome::Rendered(_) => Some(encoder.finish()),
            });
        kernels::pop_frame_scope(&self.device, recorded)
    }

    fn record_frame(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        settings: Option<&GiSettings>,
        viewport: (u32, u32),
        scene: &dyn SceneMask,
        output_view: &wgpu::TextureView,
    ) -> Result<FrameOutcome> {
        let device = &self.device;
        let queue = &self.queue;
        let (flood, cascade, merge, composite) =
            (&self.flood_pass, &self.cascade_pass, &self.merge_pass, &self.composite_pass);
        let limit = device.limits().max_texture_dimension_2d;
        run_frame(&mut self.targets, &mut DeviceAllocator { device }, settings, viewport, limit, |plan, targets| {
            let params = plan.params();
            let res = params.resolution;
            flood.upload(queue, params);
            cascade.upload(queue, params);
            merge.upload(queue, params);
            composite.upload(queue, (res.width, res.height), viewport);
            let mut gpu = GpuPassEncoder {
                device,
                queue,
                encoder,
                targets,
                flood,
                cascade,
                merge,
                composite,
                scene,
                output_view,
            };
            plan.encode(&mut gpu)
        })
    }

    pub fn submit(&self, command_buffers: impl IntoIterator<Item = wgpu::CommandBuffer>) {
        self.queue.submit(command_buffers);
    }
}

/// Records plan nodes with the renderer's passes and this frame's targets.
struct GpuPassEncoder<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    encoder: &'a mut wgpu::CommandEncoder,
    targets: &'a FrameTargets<GpuTarget>,
    flood: &'a FloodPass,
    cascade: &'a CascadePass,
    merge: &'a MergePass,
    composite: &'a CompositePass,
    scene: &'a dyn SceneMask,
    output_view: &'a wgpu::TextureView,
}

impl PassEncoder for GpuPassEncoder<'_> {
    fn encode_pass(&mut self, node: &PassNode, params: &FrameParams) -> Result<()> {
        let t = self.targets;
        match *node {
            PassNode::SceneMask => {
                let mut rp = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("scene_mask"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &t.color.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                self.scene.draw(&mut rp, self.device, self.queue, params.resolution)?;
            }
            PassNode::ScreenUv { dst } => {
                self.flood.encode_screen_uv(self.encoder, self.device, &t.color.view, &t.flood[dst].view);
            }
            PassNode::JumpFlood { step, src, dst, .. } => {
                self.flood.encode_step(self.encoder, self.device, step, &t.flood[src].view, &t.flood[dst].view);
            }
            PassNode::DistanceField { src } => {
                self.flood.encode_distance(self.encoder, self.device, &t.flood[src].view, &t.distance.view);
            }
            // Globals were uploaded with the frame's other uniforms.
            PassNode::CascadeGlobals => {}
            PassNode::Cascade { level, upper, lower } => {
                self.cascade.encode_level(
                    self.encoder,
                    self.device,
                    level,
                    &t.color.view,
                    &t.distance.view,
                    &t.cascades[upper].view,
                    &t.cascades[lower].view,
                    params.resolution,
                );
            }
            PassNode::Merge { src } => {
                self.merge.encode(self.encoder, self.device, &t.cascades[src].view, &t.color.view, params.resolution);
            }
            PassNode::Composite => {
                self.composite.encode(self.encoder, self.device, &t.color.view, self.output_view);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let adapter = wgpu::Instance::default()
                .request_adapter(&wgpu::RequestAdapterOptions::default())
                .await?;
            adapter.request_device(&wgpu::DeviceDescriptor::default(), None).await.ok()
        })
    }

    /// Draws without binding a pipeline, which the device rejects.
    struct UnboundDraw;

    impl SceneMask for UnboundDraw {
        fn draw(
            &self,
            pass: &mut wgpu::RenderPass<'_>,
            _device: &wgpu::Device,
            _queue: &wgpu::Queue,
            _resolution: FrameResolution,
        ) -> Result<()> {
            pass.draw(0..3, 0..1);
            Ok(())
        }
    }

    fn output(device: &wgpu::Device, format: wgpu::TextureFormat) -> wgpu::TextureView {
        device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("test_output"),
                size: wgpu::Extent3d { width: 64, height: 64, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    #[test]
    fn rejected_commands_fail_the_frame() {
        let Some((device, queue)) = gpu() else {
            eprintln!("no wgpu adapter, skipping");
            return;
        };
        let mut renderer = Renderer::new(device, queue).unwrap();
        let view = output(renderer.device(), renderer.config().output_format);

        let skipped = renderer.render_frame(Some(&GiSettings::default()), (64, 64), &UnboundDraw, &view).unwrap();
        assert!(skipped.is_none());
        assert!(renderer.frame_targets().is_none());

        let result = renderer.render_frame(Some(&GiSettings::active()), (64, 64), &UnboundDraw, &view);
        assert!(matches!(result, Err(GiError::Dispatch(_))), "got {:?}", result.map(|b| b.is_some()));
    }
}
