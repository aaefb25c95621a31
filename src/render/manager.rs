use wgpu::util::DeviceExt;

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    render::DrawIndirect,
    sort::{
        DepthKeys,
        DepthSorter,
        SortMode,
        SortedIndices,
        cpu_sorter,
        padded_size,
    },
};

#[cfg(feature = "sort_radix")]
use crate::{
    render::{
        GpuPointCloud,
        depth::{
            DepthKeyBindings,
            DepthKeyPipeline,
        },
    },
    sort::{
        DepthOrder,
        radix::{
            RadixSortBuffers,
            RadixSortPipeline,
        },
    },
};


enum SessionSorter {
    Host {
        sorter: Box<dyn DepthSorter>,
        index_buffer: wgpu::Buffer,
    },

    #[cfg(feature = "sort_radix")]
    Radix {
        buffers: RadixSortBuffers,
        depth: DepthKeyBindings,
    },
}

/// every buffer a sort needs for one point count
struct SortSession {
    count: usize,
    sorter: SessionSorter,
}

impl SortSession {
    fn index_buffer(&self) -> &wgpu::Buffer {
        match &self.sorter {
            SessionSorter::Host { index_buffer, .. } => index_buffer,

            #[cfg(feature = "sort_radix")]
            SessionSorter::Radix { buffers, .. } => buffers.sorted_payload(),
        }
    }
}


/// owns a point cloud's sort session and its indirect draw record
///
/// the session is rebuilt whole whenever the live point count changes;
/// without a session the identity permutation is drawn instead.
pub struct SortManager {
    mode: SortMode,
    session: Option<SortSession>,
    draw_args: wgpu::Buffer,
    identity: Option<(usize, wgpu::Buffer)>,

    #[cfg(feature = "sort_radix")]
    radix_pipeline: Option<RadixSortPipeline>,
}

impl SortManager {
    pub fn new(device: &wgpu::Device, mode: SortMode) -> Self {
        let draw_args = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("draw_indirect_buffer"),
            contents: bytemuck::bytes_of(&DrawIndirect::new(0)),
            usage: wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC,
        });

        Self {
            mode,
            session: None,
            draw_args,
            identity: None,

            #[cfg(feature = "sort_radix")]
            radix_pipeline: mode.is_gpu().then(|| RadixSortPipeline::new(device)),
        }
    }

    pub fn mode(&self) -> SortMode {
        self.mode
    }

    /// padded size of the live session, `None` before the first prepare or after teardown
    pub fn capacity(&self) -> Option<usize> {
        self.session.as_ref().map(|session| padded_size(session.count))
    }

    pub fn draw_args(&self) -> &wgpu::Buffer {
        &self.draw_args
    }

    /// sorted permutation, or the identity fallback when no session exists
    pub fn index_buffer(&self) -> Option<&wgpu::Buffer> {
        self.session
            .as_ref()
            .map(SortSession::index_buffer)
            .or(self.identity.as_ref().map(|(_, buffer)| buffer))
    }

    /// matches the session to `count`, rebuilding every sort buffer on a mismatch
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        count: usize,
    ) {
        if self.identity.as_ref().is_none_or(|(identity_count, _)| *identity_count != count) {
            let identity = SortedIndices::identity(count);
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("identity_index_buffer"),
                contents: bytemuck::cast_slice(&identity.indices),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });
            self.identity = Some((count, buffer));
        }

        if self.mode == SortMode::None {
            self.write_draw_args(queue, count as u32);
            return;
        }

        if let Some(session) = &self.session {
            if session.count == count {
                return;
            }

            tracing::info!("sort session resized from {} to {} points, rebuilding buffers", session.count, count);
        } else {
            tracing::debug!("creating {} sort session for {} points", self.mode, count);
        }

        // drop the old session before allocating its replacement
        self.session = None;
        self.session = self.create_session(device, count);

        if self.session.is_none() {
            self.write_draw_args(queue, count as u32);
        }
    }

    fn create_session(&self, device: &wgpu::Device, count: usize) -> Option<SortSession> {
        #[cfg(feature = "sort_radix")]
        if let Some(pipeline) = &self.radix_pipeline {
            return Some(SortSession {
                count,
                sorter: SessionSorter::Radix {
                    buffers: RadixSortBuffers::new(device, pipeline, count),
                    depth: DepthKeyBindings::new(device),
                },
            });
        }

        let sorter = cpu_sorter(self.mode)?;
        let index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sorted_index_buffer"),
            size: (padded_size(count) * std::mem::size_of::<u32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        Some(SortSession {
            count,
            sorter: SessionSorter::Host {
                sorter,
                index_buffer,
            },
        })
    }

    /// destroys the session; the identity permutation is drawn until the next prepare
    pub fn teardown(&mut self, queue: &wgpu::Queue) {
        if self.session.take().is_some() {
            tracing::warn!("sort session torn down");
        }

        if let Some((count, _)) = &self.identity {
            self.write_draw_args(queue, *count as u32);
        }
    }

    fn write_draw_args(&self, queue: &wgpu::Queue, instance_count: u32) {
        queue.write_buffer(&self.draw_args, 0, bytemuck::bytes_of(&DrawIndirect::new(instance_count)));
    }

    /// sorts host-extracted keys, recording any device work into `encoder`
    pub fn sort(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        keys: &DepthKeys,
    ) -> SplatResult<()> {
        self.prepare(device, queue, keys.len());
        self.sort_prepared(queue, encoder, keys)
    }

    /// sorts into the current session without resizing it
    ///
    /// a capacity or device failure tears the session down before it is returned,
    /// leaving the identity permutation in place until the next `prepare`.
    pub fn sort_prepared(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        keys: &DepthKeys,
    ) -> SplatResult<()> {
        let result = self.sort_session(queue, encoder, keys);
        if let Err(err) = &result {
            if err.is_session_fatal() {
                tracing::error!("sort failed: {err}");
                self.teardown(queue);
            }
        }

        result
    }

    fn sort_session(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        keys: &DepthKeys,
    ) -> SplatResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let capacity = padded_size(session.count);
        if keys.padded_size() > capacity {
            return Err(SplatError::SortCapacity {
                requested: keys.len(),
                capacity,
            });
        }

        match &mut session.sorter {
            SessionSorter::Host { sorter, index_buffer } => {
                let sorted = sorter.sort(keys)?;
                queue.write_buffer(index_buffer, 0, bytemuck::cast_slice(&sorted.indices));
                queue.write_buffer(
                    &self.draw_args,
                    0,
                    bytemuck::bytes_of(&DrawIndirect::new(sorted.instance_count)),
                );
            },

            #[cfg(feature = "sort_radix")]
            SessionSorter::Radix { buffers, .. } => {
                let Some(pipeline) = &self.radix_pipeline else {
                    return Ok(());
                };

                buffers.upload_keys(queue, keys)?;
                buffers.record_reset(encoder);
                buffers.record_sort(encoder, pipeline, keys.len())?;
                buffers.record_draw_args(encoder, &self.draw_args);
            },
        }

        Ok(())
    }

    /// extracts keys and sorts entirely on the device, no host readback of the visible count
    #[cfg(feature = "sort_radix")]
    #[allow(clippy::too_many_arguments)]
    pub fn sort_indirect(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        depth: &DepthKeyPipeline,
        cloud: &GpuPointCloud,
        view: glam::Mat4,
        order: DepthOrder,
        near: f32,
    ) -> SplatResult<()> {
        self.prepare(device, queue, cloud.count);

        let (Some(session), Some(pipeline)) = (&self.session, &self.radix_pipeline) else {
            return Err(SplatError::Device(format!(
                "indirect sorting needs the radix sort mode, found {}",
                self.mode,
            )));
        };
        let SessionSorter::Radix { buffers, depth: bindings } = &session.sorter else {
            return Ok(());
        };

        buffers.reset_indirect(queue);
        bindings.write(queue, cloud, view, order, near);
        depth.record(device, encoder, cloud, buffers, bindings);
        buffers.record_reset(encoder);
        buffers.record_sort_indirect(encoder, pipeline);
        buffers.record_draw_args(encoder, &self.draw_args);

        Ok(())
    }
}
