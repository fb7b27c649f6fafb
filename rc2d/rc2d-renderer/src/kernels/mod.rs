//! GPU kernel bindings: WGSL sources, kernel names, and pipeline creation under a
//! validation error scope so a broken kernel fails construction instead of a frame.

use std::fmt;

use crate::error::{GiError, Result};

pub(crate) const FLOOD_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/flood.wgsl"));
pub(crate) const CASCADE_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/cascade.wgsl"));
pub(crate) const MERGE_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/merge.wgsl"));
pub(crate) const COMPOSITE_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/composite.wgsl"));
pub(crate) const SCENE_MASK_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/scene_mask.wgsl"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelId {
    ScreenUv,
    JumpFlood,
    DistanceField,
    CascadeGi,
    CascadeMerge,
    Composite,
    SceneMask,
}

impl KernelId {
    pub fn name(self) -> &'static str {
        match self {
            KernelId::ScreenUv => "ScreenUV",
            KernelId::JumpFlood => "JumpFlood",
            KernelId::DistanceField => "DistanceField",
            KernelId::CascadeGi => "CascadeGI",
            KernelId::CascadeMerge => "CascadeMerge",
            KernelId::Composite => "Composite",
            KernelId::SceneMask => "SceneMask",
        }
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run `create` inside a validation error scope and attribute any error to `kernel`.
pub(crate) fn checked<T>(device: &wgpu::Device, kernel: KernelId, create: impl FnOnce() -> T) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(value),
        Some(err) => Err(GiError::Kernel { kernel, message: err.to_string() }),
    }
}

/// Pop the validation scope pushed before recording a frame. A recording error takes
/// precedence over the validation error it may have caused.
pub(crate) fn pop_frame_scope<T>(device: &wgpu::Device, recorded: Result<T>) -> Result<T> {
    let validation = pollster::block_on(device.pop_error_scope());
    let value = recorded?;
    match validation {
        None => Ok(value),
        Some(err) => Err(GiError::Dispatch(err.to_string())),
    }
}

pub(crate) fn shader_module(device: &wgpu::Device, kernel: KernelId, source: &str) -> Result<wgpu::ShaderModule> {
    checked(device, kernel, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kernel.name()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    })
}

pub(crate) fn compute_pipeline(
    device: &wgpu::Device,
    kernel: KernelId,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
) -> Result<wgpu::ComputePipeline> {
    checked(device, kernel, || {
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kernel.name()),
            layout: Some(layout),
            module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        })
    })
}

/// Fullscreen-triangle pipeline writing one color target without blending.
pub(crate) fn fullscreen_pipeline(
    device: &wgpu::Device,
    kernel: KernelId,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    fragment_entry: &str,
    format: wgpu::TextureFormat,
) -> Result<wgpu::RenderPipeline> {
    checked(device, kernel, || {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(kernel.name()),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_fullscreen"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some(fragment_entry),
                targets: &[Some(wgpu::ColorTargetState { format, blend: None, write_mask: wgpu::ColorWrites::ALL })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    })
}

pub(crate) fn texture_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    size: u64,
    dynamic: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    }
}

pub(crate) fn storage_entry(
    binding: u32,
    format: wgpu::TextureFormat,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension,
        },
        count: None,
    }
}

/// Uniform buffer holding `slots` copies of a `T`-sized struct at dynamic offsets.
/// Dispatches recorded into one command buffer each read their own slot.
pub(crate) struct UniformSlots {
    pub buffer: wgpu::Buffer,
    pub stride: u32,
    pub size: u64,
    pub slots: u32,
}

impl UniformSlots {
    pub fn new(device: &wgpu::Device, label: &str, size: u64, slots: u32) -> Self {
        let align = device.limits().min_uniform_buffer_offset_alignment;
        let stride = slot_stride(size as u32, align);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: stride as u64 * slots as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer, stride, size, slots }
    }

    pub fn offset(&self, slot: u32) -> u32 {
        debug_assert!(slot < self.slots);
        slot * self.stride
    }

    pub fn write<T: bytemuck::Pod>(&self, queue: &wgpu::Queue, slot: u32, value: &T) {
        queue.write_buffer(&self.buffer, self.offset(slot) as u64, bytemuck::bytes_of(value));
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: wgpu::BufferSize::new(self.size),
        })
    }
}

/// Round `size` up to the device's dynamic offset alignment.
pub(crate) fn slot_stride(size: u32, align: u32) -> u32 {
    size.div_ceil(align) * align
}
