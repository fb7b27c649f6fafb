//! Frame resources: the six GI working textures (color, distance, two jump-flood
//! buffers, two cascade arrays). Recreated only when the frame resolution changes.

use crate::error::{GiError, Result};
use crate::resolve::FrameResolution;

/// Array depth of the cascade textures.
pub const CASCADE_LAYERS: u32 = 2;

/// Half float: renderable and storage-writable without optional features, so the
/// same targets work on Vulkan, Metal, DX12 and GL.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DISTANCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;
pub const FLOOD_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;
pub const CASCADE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    Color,
    Distance,
    JumpFlood1,
    JumpFlood2,
    Gi1,
    Gi2,
}

impl TargetKind {
    pub const ALL: [TargetKind; 6] = [
        TargetKind::Color,
        TargetKind::Distance,
        TargetKind::JumpFlood1,
        TargetKind::JumpFlood2,
        TargetKind::Gi1,
        TargetKind::Gi2,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TargetKind::Color => "rc2d_color",
            TargetKind::Distance => "rc2d_distance",
            TargetKind::JumpFlood1 => "rc2d_jump_flood_1",
            TargetKind::JumpFlood2 => "rc2d_jump_flood_2",
            TargetKind::Gi1 => "rc2d_gi_1",
            TargetKind::Gi2 => "rc2d_gi_2",
        }
    }

    pub fn desc(self, resolution: FrameResolution) -> TargetDesc {
        let sampled = wgpu::TextureUsages::TEXTURE_BINDING;
        let (format, layers, usage) = match self {
            // Scene mask is rasterized into it, merge writes it from compute, composite reads it.
            TargetKind::Color => (
                COLOR_FORMAT,
                1,
                sampled | wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::STORAGE_BINDING,
            ),
            TargetKind::Distance => (DISTANCE_FORMAT, 1, sampled | wgpu::TextureUsages::RENDER_ATTACHMENT),
            TargetKind::JumpFlood1 | TargetKind::JumpFlood2 => {
                (FLOOD_FORMAT, 1, sampled | wgpu::TextureUsages::RENDER_ATTACHMENT)
            }
            TargetKind::Gi1 | TargetKind::Gi2 => {
                (CASCADE_FORMAT, CASCADE_LAYERS, sampled | wgpu::TextureUsages::STORAGE_BINDING)
            }
        };
        TargetDesc { kind: self, width: resolution.width, height: resolution.height, layers, format, usage }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TargetDesc {
    pub kind: TargetKind,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

/// Creates one working texture. Implemented for the wgpu device; tests count calls.
pub trait TargetAllocator {
    type Target;
    fn allocate(&mut self, desc: &TargetDesc) -> Result<Self::Target>;
}

/// The six working textures of one frame. Ping-pong pairs are 2-element arrays so
/// the pass that picks a buffer does it by index.
pub struct FrameTargets<T> {
    pub color: T,
    pub distance: T,
    pub flood: [T; 2],
    pub cascades: [T; 2],
    resolution: FrameResolution,
}

impl<T> FrameTargets<T> {
    pub fn resolution(&self) -> FrameResolution {
        self.resolution
    }

    fn allocate<A: TargetAllocator<Target = T>>(alloc: &mut A, resolution: FrameResolution) -> Result<Self> {
        let mut make = |kind: TargetKind| alloc.allocate(&kind.desc(resolution));
        Ok(Self {
            color: make(TargetKind::Color)?,
            distance: make(TargetKind::Distance)?,
            flood: [make(TargetKind::JumpFlood1)?, make(TargetKind::JumpFlood2)?],
            cascades: [make(TargetKind::Gi1)?, make(TargetKind::Gi2)?],
            resolution,
        })
    }
}

/// Owns the working textures between frames so an unchanged resolution reuses them.
pub struct TargetPool<T> {
    current: Option<FrameTargets<T>>,
}

impl<T> Default for TargetPool<T> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<T> TargetPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Textures sized to `resolution`, allocating only when the size changed.
    pub fn acquire<A: TargetAllocator<Target = T>>(
        &mut self,
        alloc: &mut A,
        resolution: FrameResolution,
    ) -> Result<&FrameTargets<T>> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(GiError::Allocation("frame resolution must be > 0".to_string()));
        }
        let reuse = matches!(&self.current, Some(t) if t.resolution == resolution);
        if !reuse {
            // Drop the old set first so peak memory holds one set.
            self.current = None;
            log::debug!("allocating GI targets at {}x{}", resolution.width, resolution.height);
            self.current = Some(FrameTargets::allocate(alloc, resolution)?);
        }
        self.current.as_ref().ok_or_else(|| GiError::Allocation("no targets".to_string()))
    }

    pub fn current(&self) -> Option<&FrameTargets<T>> {
        self.current.as_ref()
    }

    pub fn release(&mut self) {
        self.current = None;
    }
}

/// A working texture plus the views the passes bind.
pub struct GpuTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Allocates working textures on a wgpu device.
pub struct DeviceAllocator<'a> {
    pub device: &'a wgpu::Device,
}

impl TargetAllocator for DeviceAllocator<'_> {
    type Target = GpuTarget;

    fn allocate(&mut self, desc: &TargetDesc) -> Result<GpuTarget> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.kind.label()),
            size: wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: desc.layers },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        let dimension = if desc.layers > 1 {
            wgpu::TextureViewDimension::D2Array
        } else {
            wgpu::TextureViewDimension::D2
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(desc.kind.label()),
            dimension: Some(dimension),
            ..Default::default()
        });
        Ok(GpuTarget { texture, view })
    }
}
