use bytemuck::{
    Pod,
    Zeroable,
};
use glam::Mat4;

use crate::{
    render::GpuPointCloud,
    sort::{
        DepthOrder,
        radix::RadixSortBuffers,
    },
};


const DEPTH_SHADER: &str = include_str!("depth.wgsl");
const WORKGROUP_SIZE: u32 = 256;


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Pod,
    Zeroable,
)]
#[repr(C)]
pub struct DepthUniforms {
    pub view: [[f32; 4]; 4],
    pub num_points: u32,
    pub record_words: u32,
    pub key_sign: f32,
    pub near: f32,
}

static_assertions::assert_eq_size!(DepthUniforms, [u8; 80]);


/// per-cloud uniforms of the key stage, owned by that cloud's sort session
pub struct DepthKeyBindings {
    pub uniform_buffer: wgpu::Buffer,
}

impl DepthKeyBindings {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("depth_key_uniforms"),
            size: std::mem::size_of::<DepthUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self { uniform_buffer }
    }

    pub fn write(
        &self,
        queue: &wgpu::Queue,
        cloud: &GpuPointCloud,
        view: Mat4,
        order: DepthOrder,
        near: f32,
    ) {
        let uniforms = DepthUniforms {
            view: view.to_cols_array_2d(),
            num_points: cloud.count as u32,
            record_words: cloud.record_words as u32,
            key_sign: order.key_sign(),
            near,
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    }
}


/// device-side key extraction that appends visible keys for an indirect sort
pub struct DepthKeyPipeline {
    pub layout: wgpu::BindGroupLayout,
    pub pipeline: wgpu::ComputePipeline,
}

impl DepthKeyPipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer_entry = |binding: u32, ty: wgpu::BufferBindingType| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let read_write = wgpu::BufferBindingType::Storage { read_only: false };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("depth_key_layout"),
            entries: &[
                buffer_entry(0, wgpu::BufferBindingType::Uniform),
                buffer_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_entry(2, read_write),
                buffer_entry(3, read_write),
                buffer_entry(4, read_write),
                buffer_entry(5, read_write),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("depth_key_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("depth_key_shader"),
            source: wgpu::ShaderSource::Wgsl(DEPTH_SHADER.into()),
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("extract_depth"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("extract_depth"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            layout,
            pipeline,
        }
    }

    /// records the key stage into `encoder`
    ///
    /// `bindings` must already hold this frame's uniforms and `buffers` a reset live count.
    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        cloud: &GpuPointCloud,
        buffers: &RadixSortBuffers,
        bindings: &DepthKeyBindings,
    ) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("depth_key_bind_group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: bindings.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: cloud.gaussian_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.info_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.dispatch_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: buffers.key_buffers[0].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: buffers.payload_buffers[0].as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("depth_key_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups((cloud.count as u32).div_ceil(WORKGROUP_SIZE).max(1), 1, 1);
    }
}
