//! Minimal wgpu init (no window). Builds the rc2d renderer, renders one GI frame into
//! an offscreen target and reports the frame plan.

use rc2d_renderer::{FrameOutcome, MeshMaskPass, MeshScene, Renderer};
use render_api::GiSettings;

fn main() {
    env_logger::init();
    pollster::block_on(async {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .expect("No adapter");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .expect("No device");
        let mut renderer = Renderer::new(device, queue).expect("Renderer::new");
        let mask_pass = MeshMaskPass::new(renderer.device()).expect("MeshMaskPass::new");

        let size = (320, 240);
        let target = renderer.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("minimal_output"),
            size: wgpu::Extent3d { width: size.0, height: size.1, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: renderer.config().output_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let identity: [f32; 16] = [
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ];
        let scene = MeshScene { pass: &mask_pass, meshes: &[], view_proj: identity };
        let settings = GiSettings { sky_radiance: true, ..GiSettings::active() };

        let mut encoder = renderer
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("minimal_frame") });
        let outcome = renderer
            .encode_frame(&mut encoder, Some(&settings), size, &scene, &target_view)
            .expect("encode_frame");
        renderer.submit([encoder.finish()]);
        match outcome {
            FrameOutcome::Rendered(plan) => {
                let p = plan.params();
                println!(
                    "rc2d minimal_wgpu: OK ({}x{}, {} cascades, {} flood steps, {} passes)",
                    p.resolution.width,
                    p.resolution.height,
                    p.cascade_count,
                    p.flood_steps,
                    plan.passes().len()
                );
            }
            FrameOutcome::Skipped(reason) => println!("rc2d minimal_wgpu: skipped ({:?})", reason),
        }
    });
}
