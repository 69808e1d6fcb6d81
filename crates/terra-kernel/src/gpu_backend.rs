//! wgpu tile backend.
//!
//! Each render target is an `R8Uint` texture holding one tile's cell bytes.
//! Each renderer owns a uniform buffer carrying one batch of strokes. A brush
//! pass binds the read texture as a sampled `texture_2d<u32>` and draws a
//! fullscreen triangle into the write texture.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use terra_common::{GpuError, IdAllocator, RendererId, TargetId, TerraError, TerraResult};
use tracing::{debug, info, warn};

use crate::backend::{BrushPass, BrushUniform, TileBackend};
use crate::brush_kernel::BRUSH_SHADER;
use crate::pool::ResourceFactory;
use crate::validation::request_headless_device;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Uint;

/// Row pitch required for texture-to-buffer copies.
const COPY_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

struct GpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuRenderer {
    uniform: wgpu::Buffer,
}

/// GPU implementation of [`TileBackend`].
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    staging: wgpu::Buffer,
    tile_size: u32,
    padded_row: u32,
    ids: IdAllocator,
    targets: HashMap<TargetId, GpuTarget>,
    renderers: HashMap<RendererId, GpuRenderer>,
    device_lost: Arc<AtomicBool>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("tile_size", &self.tile_size)
            .field("targets", &self.targets.len())
            .field("renderers", &self.renderers.len())
            .field("device_lost", &self.device_lost.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl WgpuBackend {
    /// Builds the brush pipeline on an existing device.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, tile_size: u32) -> TerraResult<Self> {
        if tile_size == 0 {
            return Err(TerraError::Configuration("tile size must be non-zero".into()));
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Brush Shader"),
            source: wgpu::ShaderSource::Wgsl(BRUSH_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Brush Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Uint,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Brush Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Brush Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let padded_row = tile_size.div_ceil(COPY_ROW_ALIGNMENT) * COPY_ROW_ALIGNMENT;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Tile Readback Staging"),
            size: u64::from(padded_row) * u64::from(tile_size),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let device_lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&device_lost);
        device.set_device_lost_callback(move |reason, message| {
            warn!("GPU device lost ({reason:?}): {message}");
            lost_flag.store(true, Ordering::Relaxed);
        });

        info!(
            "wgpu tile backend initialized (tile_size={tile_size}, uniform {} bytes)",
            std::mem::size_of::<BrushUniform>()
        );

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            staging,
            tile_size,
            padded_row,
            ids: IdAllocator::new(),
            targets: HashMap::new(),
            renderers: HashMap::new(),
            device_lost,
        })
    }

    /// Opens a headless device and builds the backend on it.
    ///
    /// Fails with a GPU init error when no adapter is available.
    pub fn new_headless(tile_size: u32, force_fallback: bool) -> TerraResult<Self> {
        let (device, queue) = request_headless_device(force_fallback)?;
        Self::new(device, queue, tile_size)
    }

    /// Whether the device has been lost. Every handle is invalid afterwards.
    #[must_use]
    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Relaxed)
    }

    fn target(&self, id: TargetId) -> TerraResult<&GpuTarget> {
        self.targets
            .get(&id)
            .ok_or_else(|| GpuError::InvalidHandle(id.to_string()).into())
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.tile_size,
            height: self.tile_size,
            depth_or_array_layers: 1,
        }
    }

    fn write_bytes(&self, target: TargetId, bytes: &[u8]) -> TerraResult<()> {
        let texture = &self.target(target)?.texture;
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.tile_size),
                rows_per_image: Some(self.tile_size),
            },
            self.extent(),
        );
        Ok(())
    }
}

impl ResourceFactory<TargetId> for WgpuBackend {
    fn create(&mut self) -> TerraResult<TargetId> {
        let id = self.ids.next_target();
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Tile Render Target"),
            size: self.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.targets.insert(id, GpuTarget { texture, view });
        Ok(id)
    }

    fn is_valid(&self, resource: &TargetId) -> bool {
        !self.is_device_lost() && self.targets.contains_key(resource)
    }

    fn destroy(&mut self, resource: TargetId) {
        if let Some(target) = self.targets.remove(&resource) {
            target.texture.destroy();
        }
    }
}

impl ResourceFactory<RendererId> for WgpuBackend {
    fn create(&mut self) -> TerraResult<RendererId> {
        let id = self.ids.next_renderer();
        let uniform = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Brush Uniform"),
            size: std::mem::size_of::<BrushUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.renderers.insert(id, GpuRenderer { uniform });
        Ok(id)
    }

    fn is_valid(&self, resource: &RendererId) -> bool {
        !self.is_device_lost() && self.renderers.contains_key(resource)
    }

    fn destroy(&mut self, resource: RendererId) {
        if let Some(renderer) = self.renderers.remove(&resource) {
            renderer.uniform.destroy();
        }
    }
}

impl TileBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn fill_target(&mut self, target: TargetId, value: u8) -> TerraResult<()> {
        let len = (self.tile_size as usize) * (self.tile_size as usize);
        self.write_bytes(target, &vec![value; len])
    }

    fn upload_target(&mut self, target: TargetId, bytes: &[u8]) -> TerraResult<()> {
        let expected = (self.tile_size as usize) * (self.tile_size as usize);
        if bytes.len() != expected {
            return Err(GpuError::UploadSize {
                expected,
                actual: bytes.len(),
            }
            .into());
        }
        self.write_bytes(target, bytes)
    }

    fn read_target(&mut self, target: TargetId) -> TerraResult<Vec<u8>> {
        let texture = &self.target(target)?.texture;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Tile Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_row),
                    rows_per_image: Some(self.tile_size),
                },
            },
            self.extent(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(GpuError::ReadbackFailed(e.to_string()).into()),
            Err(e) => return Err(GpuError::ReadbackFailed(e.to_string()).into()),
        }

        let size = self.tile_size as usize;
        let padded = self.padded_row as usize;
        let mut bytes = Vec::with_capacity(size * size);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks_exact(padded).take(size) {
                bytes.extend_from_slice(&row[..size]);
            }
        }
        self.staging.unmap();
        Ok(bytes)
    }

    fn render_brush(&mut self, pass: &BrushPass<'_>) -> TerraResult<()> {
        if pass.source == pass.dest {
            return Err(TerraError::PoolInvariant(format!(
                "brush pass reads and writes {}",
                pass.source
            )));
        }
        let renderer = self
            .renderers
            .get(&pass.renderer)
            .ok_or_else(|| GpuError::InvalidHandle(pass.renderer.to_string()))?;
        let source = self.target(pass.source)?;
        let dest = self.target(pass.dest)?;

        let uniform = BrushUniform::from_pass(pass, self.tile_size);
        self.queue
            .write_buffer(&renderer.uniform, 0, bytemuck::bytes_of(&uniform));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Brush Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: renderer.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Brush Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Brush Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &dest.view,
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
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        debug!(
            "Brush pass {} -> {} ({} strokes)",
            pass.source, pass.dest, uniform.header[2]
        );
        Ok(())
    }
}
