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
    gaussian::cloud::PointCloud,
    math::pad_4,
};

#[cfg(feature = "sort_radix")]
pub mod depth;

pub mod manager;

pub use manager::SortManager;


/// `draw_indirect` arguments, one instanced quad per splat
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
pub struct DrawIndirect {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

impl DrawIndirect {
    pub fn new(instance_count: u32) -> Self {
        Self {
            vertex_count: 4,
            instance_count,
            first_vertex: 0,
            first_instance: 0,
        }
    }
}

static_assertions::assert_eq_size!(DrawIndirect, [u8; 16]);


/// packed point cloud buffers, read-only to the sort and render stages
pub struct GpuPointCloud {
    pub count: usize,
    pub record_words: usize,
    pub gaussian_buffer: wgpu::Buffer,
    pub sh_buffer: wgpu::Buffer,
    pub covariance_buffer: Option<wgpu::Buffer>,
    pub quantization_buffer: Option<wgpu::Buffer>,

    #[cfg(feature = "debug_gpu")]
    pub debug_gpu: PointCloud,
}

impl GpuPointCloud {
    pub fn new(device: &wgpu::Device, cloud: &PointCloud) -> Self {
        let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC;

        let gaussian_buffer = create_mapped_buffer(device, "gaussian_buffer", cloud.gaussian_bytes(), storage);
        let sh_buffer = create_mapped_buffer(device, "sh_buffer", cloud.sh_bytes(), storage);

        let covariance_buffer = cloud
            .covars_bytes()
            .map(|bytes| create_mapped_buffer(device, "covariance_buffer", bytes, storage));

        let quantization_buffer = cloud.quantization().map(|quantization| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quantization_buffer"),
                contents: bytemuck::bytes_of(quantization),
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        tracing::debug!(
            "uploaded {} gaussians ({} bytes, compressed: {})",
            cloud.num_points(),
            cloud.gaussian_bytes().len() + cloud.sh_bytes().len(),
            cloud.is_compressed(),
        );

        Self {
            count: cloud.num_points(),
            record_words: cloud.record_words(),
            gaussian_buffer,
            sh_buffer,
            covariance_buffer,
            quantization_buffer,

            #[cfg(feature = "debug_gpu")]
            debug_gpu: cloud.clone(),
        }
    }
}


/// synchronously fills a buffer through a mapping made at creation
pub fn create_mapped_buffer(
    device: &wgpu::Device,
    label: &str,
    contents: &[u8],
    usage: wgpu::BufferUsages,
) -> wgpu::Buffer {
    let size = pad_4(contents.len().max(4));

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size as u64,
        usage,
        mapped_at_creation: true,
    });

    {
        let mut view = buffer.slice(..).get_mapped_range_mut();
        view[..contents.len()].copy_from_slice(contents);
    }
    buffer.unmap();

    buffer
}


pub async fn request_device() -> SplatResult<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| SplatError::Device("no compatible gpu adapter".to_string()))?;

    tracing::info!("using adapter {:?}", adapter.get_info().name);

    adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("splat_sort_device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        )
        .await
        .map_err(|err| SplatError::Device(err.to_string()))
}


/// blocking readback of the first `len` words of `buffer`
pub fn read_buffer_u32(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    len: usize,
) -> SplatResult<Vec<u32>> {
    let size = (len * std::mem::size_of::<u32>()) as u64;

    let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback_staging_buffer"),
        size: size.max(4),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_encoder"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size);
    queue.submit(Some(encoder.finish()));

    let slice = staging_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|err| SplatError::Device(err.to_string()))?
        .map_err(|err| SplatError::Device(err.to_string()))?;

    let words = {
        let view = slice.get_mapped_range();
        bytemuck::cast_slice::<u8, u32>(&view)[..len].to_vec()
    };
    staging_buffer.unmap();

    Ok(words)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_indirect_layout() {
        let args = DrawIndirect::new(7);
        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&args));

        assert_eq!(words, &[4, 7, 0, 0]);
    }
}
