use bytemuck::{
    Pod,
    Zeroable,
};
use wgpu::util::DeviceExt;

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    sort::{
        DepthKeys,
        KEY_BITS,
        RADIX_BITS,
        RADIX_PASSES,
        RADIX_SIZE,
        num_blocks,
        padded_size,
        result_buffer,
    },
};


const RADIX_SHADER: &str = include_str!("radix.wgsl");


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Pod,
    Zeroable,
)]
#[repr(C)]
pub struct GeneralInfo {
    /// live keys; written by the host (direct) or the depth stage (indirect)
    pub keys_size: u32,
    pub padded_size: u32,
    pub key_bits: u32,
    pub passes: u32,
    pub result_buffer: u32,
    _pad: [u32; 3],
}

impl GeneralInfo {
    pub fn new(keys_size: usize, padded_size: usize) -> Self {
        Self {
            keys_size: keys_size as u32,
            padded_size: padded_size as u32,
            key_bits: KEY_BITS,
            passes: RADIX_PASSES as u32,
            result_buffer: result_buffer(RADIX_PASSES) as u32,
            _pad: [0; 3],
        }
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Pod,
    Zeroable,
)]
#[repr(C)]
pub struct PassInfo {
    pub pass: u32,
    pub shift: u32,
    _pad: [u32; 2],
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Pod,
    Zeroable,
)]
#[repr(C)]
pub struct IndirectDispatch {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Default for IndirectDispatch {
    fn default() -> Self {
        Self { x: 0, y: 1, z: 1 }
    }
}

static_assertions::assert_eq_size!(GeneralInfo, [u32; 8]);
static_assertions::assert_eq_size!(PassInfo, [u32; 4]);
static_assertions::assert_eq_size!(IndirectDispatch, [u32; 3]);


fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}


pub struct RadixSortPipeline {
    pub radix_sort_layout: wgpu::BindGroupLayout,
    pub radix_sort_pipelines: [wgpu::ComputePipeline; 3],
}

impl RadixSortPipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let radix_sort_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("radix_sort_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<PassInfo>() as u64),
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, true),
                storage_entry(4, false),
                storage_entry(5, true),
                storage_entry(6, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("radix_sort_pipeline_layout"),
            bind_group_layouts: &[&radix_sort_layout],
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("radix_sort_shader"),
            source: wgpu::ShaderSource::Wgsl(RADIX_SHADER.into()),
        });

        let radix_sort_pipelines = ["calculate_histogram", "prefix_histogram", "scatter"].map(|entry_point| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        });

        Self {
            radix_sort_layout,
            radix_sort_pipelines,
        }
    }
}


/// one sort session: every buffer sized for a fixed padded capacity
///
/// pass `i` reads the pair `i % 2` and writes the other, so after
/// `RADIX_PASSES` scatters the result lands in pair `result_buffer(RADIX_PASSES)`.
pub struct RadixSortBuffers {
    capacity: usize,
    pub info_buffer: wgpu::Buffer,
    pub histogram_buffer: wgpu::Buffer,
    pub dispatch_buffer: wgpu::Buffer,
    pub key_buffers: [wgpu::Buffer; 2],
    pub payload_buffers: [wgpu::Buffer; 2],
    pub sorting_pass_buffers: [wgpu::Buffer; RADIX_PASSES],
    pub radix_sort_bind_groups: [wgpu::BindGroup; RADIX_PASSES],
}

impl RadixSortBuffers {
    pub fn new(
        device: &wgpu::Device,
        pipeline: &RadixSortPipeline,
        count: usize,
    ) -> Self {
        let capacity = padded_size(count);
        let blocks = num_blocks(capacity);

        let info_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("radix_sort_info_buffer"),
            contents: bytemuck::bytes_of(&GeneralInfo::new(0, capacity)),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        });

        let histogram_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("radix_sort_histogram_buffer"),
            size: (RADIX_PASSES * blocks * RADIX_SIZE * std::mem::size_of::<u32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let dispatch_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("radix_sort_dispatch_buffer"),
            contents: bytemuck::bytes_of(&IndirectDispatch::default()),
            usage: wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let pair_buffer = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: (capacity * std::mem::size_of::<u32>()) as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let key_buffers = [pair_buffer("radix_sort_keys_a"), pair_buffer("radix_sort_keys_b")];
        let payload_buffers = [pair_buffer("radix_sort_payload_a"), pair_buffer("radix_sort_payload_b")];

        let sorting_pass_buffers: [wgpu::Buffer; RADIX_PASSES] = std::array::from_fn(|idx| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(format!("radix_sort_pass_buffer {idx}").as_str()),
                contents: bytemuck::bytes_of(&PassInfo {
                    pass: idx as u32,
                    shift: idx as u32 * RADIX_BITS,
                    _pad: [0; 2],
                }),
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let radix_sort_bind_groups: [wgpu::BindGroup; RADIX_PASSES] = std::array::from_fn(|idx| {
            let (src, dst) = (idx % 2, (idx + 1) % 2);

            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(format!("radix_sort_bind_group {idx}").as_str()),
                layout: &pipeline.radix_sort_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: sorting_pass_buffers[idx].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: info_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: histogram_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: key_buffers[src].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: key_buffers[dst].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: payload_buffers[src].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: payload_buffers[dst].as_entire_binding(),
                    },
                ],
            })
        });

        Self {
            capacity,
            info_buffer,
            histogram_buffer,
            dispatch_buffer,
            key_buffers,
            payload_buffers,
            sorting_pass_buffers,
            radix_sort_bind_groups,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// payload buffer holding the sorted permutation once every pass has run
    pub fn sorted_payload(&self) -> &wgpu::Buffer {
        &self.payload_buffers[result_buffer(RADIX_PASSES)]
    }

    fn check_capacity(&self, requested: usize) -> SplatResult<()> {
        if padded_size(requested) > self.capacity {
            return Err(SplatError::SortCapacity {
                requested,
                capacity: self.capacity,
            });
        }

        Ok(())
    }

    /// writes host keys, an identity payload and the session info for a direct sort
    pub fn upload_keys(
        &self,
        queue: &wgpu::Queue,
        keys: &DepthKeys,
    ) -> SplatResult<()> {
        self.check_capacity(keys.len())?;

        let padded_keys = keys.padded_keys();
        queue.write_buffer(&self.key_buffers[0], 0, bytemuck::cast_slice(&padded_keys));
        queue.write_buffer(&self.payload_buffers[0], 0, bytemuck::cast_slice(&keys.payload()));
        queue.write_buffer(
            &self.info_buffer,
            0,
            bytemuck::bytes_of(&GeneralInfo::new(keys.len(), self.capacity)),
        );
        queue.write_buffer(
            &self.dispatch_buffer,
            0,
            bytemuck::bytes_of(&IndirectDispatch {
                x: num_blocks(keys.padded_size()) as u32,
                ..Default::default()
            }),
        );

        Ok(())
    }

    /// zeroes the live count and dispatch size before a device-side key stage appends
    pub fn reset_indirect(&self, queue: &wgpu::Queue) {
        queue.write_buffer(
            &self.info_buffer,
            0,
            bytemuck::bytes_of(&GeneralInfo::new(0, self.capacity)),
        );
        queue.write_buffer(
            &self.dispatch_buffer,
            0,
            bytemuck::bytes_of(&IndirectDispatch::default()),
        );
    }

    pub fn record_reset(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.histogram_buffer, 0, None);
    }

    /// records every pass with a host-known element count
    pub fn record_sort(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &RadixSortPipeline,
        count: usize,
    ) -> SplatResult<()> {
        self.check_capacity(count)?;

        let blocks = num_blocks(padded_size(count)) as u32;
        self.record_passes(encoder, pipeline, |pass| {
            pass.dispatch_workgroups(blocks, 1, 1);
        });

        Ok(())
    }

    /// records every pass, block count read from the dispatch buffer on the device
    pub fn record_sort_indirect(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &RadixSortPipeline,
    ) {
        self.record_passes(encoder, pipeline, |pass| {
            pass.dispatch_workgroups_indirect(&self.dispatch_buffer, 0);
        });
    }

    fn record_passes(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &RadixSortPipeline,
        dispatch_blocks: impl Fn(&mut wgpu::ComputePass<'_>),
    ) {
        let [histogram, prefix, scatter] = &pipeline.radix_sort_pipelines;

        for pass_idx in 0..RADIX_PASSES {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(format!("radix_sort_pass {pass_idx}").as_str()),
                timestamp_writes: None,
            });
            pass.set_bind_group(0, &self.radix_sort_bind_groups[pass_idx], &[]);

            pass.set_pipeline(histogram);
            dispatch_blocks(&mut pass);

            pass.set_pipeline(prefix);
            pass.dispatch_workgroups(1, 1, 1);

            pass.set_pipeline(scatter);
            dispatch_blocks(&mut pass);
        }
    }

    /// patches the instance count of a `DrawIndirect` record from the live key count
    pub fn record_draw_args(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        draw_args: &wgpu::Buffer,
    ) {
        let instance_count_offset = std::mem::size_of::<u32>() as u64;

        encoder.copy_buffer_to_buffer(
            &self.info_buffer,
            0,
            draw_args,
            instance_count_offset,
            std::mem::size_of::<u32>() as u64,
        );
    }
}
