use glam::Vec3;

use splat_sort::{
    Camera,
    DepthKeys,
    DepthOrder,
    DepthSorter,
    GpuPointCloud,
    PerspectiveCamera,
    SortManager,
    SortMode,
    SplatError,
    gaussian::rand::{
        random_cloud_seeded,
        random_keys,
    },
    render::{
        depth::DepthKeyPipeline,
        request_device,
    },
    sort::{
        KEYS_PER_BLOCK,
        radix_host::HostRadixSorter,
    },
};


fn device() -> Option<(wgpu::Device, wgpu::Queue)> {
    match pollster::block_on(request_device()) {
        Ok(device) => Some(device),
        Err(err) => {
            eprintln!("skipping gpu test: {err}");
            None
        },
    }
}

fn read_u32(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    len: usize,
) -> Vec<u32> {
    let size = (len * std::mem::size_of::<u32>()) as u64;
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("test_readback"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        tx.send(result).unwrap();
    });
    let _ = device.poll(wgpu::Maintain::Wait);
    pollster::block_on(rx.receive()).unwrap().unwrap();

    let words = bytemuck::cast_slice::<u8, u32>(&slice.get_mapped_range()).to_vec();
    staging.unmap();
    words
}

fn sort_on_device(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    manager: &mut SortManager,
    keys: &DepthKeys,
) -> (Vec<u32>, [u32; 4]) {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    manager.sort(device, queue, &mut encoder, keys).unwrap();
    queue.submit(Some(encoder.finish()));

    let indices = read_u32(device, queue, manager.index_buffer().unwrap(), keys.padded_size());
    let draw_args = read_u32(device, queue, manager.draw_args(), 4);

    (indices, [draw_args[0], draw_args[1], draw_args[2], draw_args[3]])
}


#[test]
fn test_radix_matches_host() {
    let Some((device, queue)) = device() else {
        return;
    };

    let keys = DepthKeys::from_keys(random_keys(5000, 41));
    let mut manager = SortManager::new(&device, SortMode::Radix);
    let (indices, draw_args) = sort_on_device(&device, &queue, &mut manager, &keys);

    let expected = HostRadixSorter::default().sort(&keys).unwrap();
    assert_eq!(indices, expected.indices);
    assert_eq!(draw_args, [4, 5000, 0, 0]);
}

#[test]
fn test_sign_boundary_on_device() {
    let Some((device, queue)) = device() else {
        return;
    };

    let keys = DepthKeys::from_keys(vec![-1.0, 0.0, 1.0, -0.5]);
    let mut manager = SortManager::new(&device, SortMode::Radix);
    let (indices, draw_args) = sort_on_device(&device, &queue, &mut manager, &keys);

    assert_eq!(&indices[..4], &[0, 3, 1, 2]);
    assert_eq!(draw_args[1], 4);
}

#[test]
fn test_session_grows_with_point_count() {
    let Some((device, queue)) = device() else {
        return;
    };

    let mut manager = SortManager::new(&device, SortMode::Radix);

    let small = DepthKeys::from_keys(random_keys(1000, 51));
    sort_on_device(&device, &queue, &mut manager, &small);
    assert_eq!(manager.capacity(), Some(KEYS_PER_BLOCK));

    let raw = random_keys(2000, 52);
    let large = DepthKeys::from_keys(raw.clone());
    let (indices, draw_args) = sort_on_device(&device, &queue, &mut manager, &large);

    assert_eq!(manager.capacity(), Some(2 * KEYS_PER_BLOCK));
    assert_eq!(indices.len(), 2 * KEYS_PER_BLOCK);
    assert_eq!(draw_args[1], 2000);
    assert!(indices[..2000].windows(2).all(|pair| {
        raw[pair[0] as usize].total_cmp(&raw[pair[1] as usize]).is_le()
    }));
}

#[test]
fn test_disabled_sort_draws_identity() {
    let Some((device, queue)) = device() else {
        return;
    };

    let mut manager = SortManager::new(&device, SortMode::None);
    let keys = DepthKeys::from_keys(vec![3.0, 2.0, 1.0]);
    let (indices, draw_args) = sort_on_device(&device, &queue, &mut manager, &keys);

    assert_eq!(manager.capacity(), None);
    assert_eq!(&indices[..3], &[0, 1, 2]);
    assert_eq!(draw_args, [4, 3, 0, 0]);
}

#[test]
fn test_indirect_sort_culls_and_orders() {
    let Some((device, queue)) = device() else {
        return;
    };

    let cloud = random_cloud_seeded(3000, 61);
    let camera = PerspectiveCamera::look_at(Vec3::new(0.0, 0.0, 50.0), Vec3::ZERO, Vec3::Y);
    let near = 50.0;

    let gpu_cloud = GpuPointCloud::new(&device, &cloud);
    let depth = DepthKeyPipeline::new(&device);
    let mut manager = SortManager::new(&device, SortMode::Radix);

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    manager
        .sort_indirect(
            &device,
            &queue,
            &mut encoder,
            &depth,
            &gpu_cloud,
            camera.view_matrix(),
            DepthOrder::FrontToBack,
            near,
        )
        .unwrap();
    queue.submit(Some(encoder.finish()));

    let draw_args = read_u32(&device, &queue, manager.draw_args(), 4);
    let visible = draw_args[1] as usize;

    #[cfg(feature = "debug_gpu")]
    let cloud = &gpu_cloud.debug_gpu;
    #[cfg(not(feature = "debug_gpu"))]
    let cloud = &cloud;

    let host_depths = DepthKeys::extract(&camera, cloud, DepthOrder::FrontToBack);
    let surely_visible = host_depths.keys().iter().filter(|&&d| d > near + 1e-3).count();
    let maybe_visible = host_depths.keys().iter().filter(|&&d| d >= near - 1e-3).count();
    assert!((surely_visible..=maybe_visible).contains(&visible));

    let indices = read_u32(&device, &queue, manager.index_buffer().unwrap(), visible);
    let depths = indices
        .iter()
        .map(|&idx| host_depths.keys()[idx as usize])
        .collect::<Vec<_>>();

    assert!(depths.iter().all(|&d| d >= near - 1e-3));
    assert!(depths.windows(2).all(|pair| pair[0] <= pair[1] + 1e-3));
}

#[test]
fn test_oversubscribed_session_falls_back_to_identity() {
    let Some((device, queue)) = device() else {
        return;
    };

    for mode in [SortMode::Radix, SortMode::RadixHost] {
        let mut manager = SortManager::new(&device, mode);
        manager.prepare(&device, &queue, 1000);
        assert_eq!(manager.capacity(), Some(KEYS_PER_BLOCK), "{mode}");

        let raw = random_keys(2000, 71);
        let keys = DepthKeys::from_keys(raw.clone());

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        let err = manager.sort_prepared(&queue, &mut encoder, &keys).unwrap_err();
        queue.submit(Some(encoder.finish()));

        assert!(matches!(
            err,
            SplatError::SortCapacity { requested: 2000, capacity: KEYS_PER_BLOCK },
        ));
        assert!(err.is_session_fatal());
        assert_eq!(manager.capacity(), None, "{mode}");

        let identity = read_u32(&device, &queue, manager.index_buffer().unwrap(), 1000);
        assert_eq!(identity, (0..1000).collect::<Vec<u32>>(), "{mode}");
        assert_eq!(read_u32(&device, &queue, manager.draw_args(), 4), vec![4, 1000, 0, 0], "{mode}");

        // the next prepare rebuilds a session sized for the new count
        let (indices, draw_args) = sort_on_device(&device, &queue, &mut manager, &keys);
        assert_eq!(manager.capacity(), Some(2 * KEYS_PER_BLOCK), "{mode}");
        assert_eq!(draw_args[1], 2000, "{mode}");
        assert!(indices[..2000].windows(2).all(|pair| {
            raw[pair[0] as usize].total_cmp(&raw[pair[1] as usize]).is_le()
        }));
    }
}

#[test]
fn test_indirect_sorts_two_clouds_in_one_submission() {
    let Some((device, queue)) = device() else {
        return;
    };

    let camera = PerspectiveCamera::look_at(Vec3::new(0.0, 0.0, 50.0), Vec3::ZERO, Vec3::Y);
    let depth = DepthKeyPipeline::new(&device);

    let clouds = [random_cloud_seeded(700, 81), random_cloud_seeded(2500, 82)];
    let gpu_clouds = clouds.iter().map(|cloud| GpuPointCloud::new(&device, cloud)).collect::<Vec<_>>();
    let mut managers = clouds
        .iter()
        .map(|_| SortManager::new(&device, SortMode::Radix))
        .collect::<Vec<_>>();

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    for (manager, gpu_cloud) in managers.iter_mut().zip(&gpu_clouds) {
        manager
            .sort_indirect(
                &device,
                &queue,
                &mut encoder,
                &depth,
                gpu_cloud,
                camera.view_matrix(),
                DepthOrder::FrontToBack,
                0.0,
            )
            .unwrap();
    }
    queue.submit(Some(encoder.finish()));

    for (manager, cloud) in managers.iter().zip(&clouds) {
        let count = cloud.num_points();
        let draw_args = read_u32(&device, &queue, manager.draw_args(), 4);
        assert_eq!(draw_args[1] as usize, count);

        let host_depths = DepthKeys::extract(&camera, cloud, DepthOrder::FrontToBack);
        let indices = read_u32(&device, &queue, manager.index_buffer().unwrap(), count);

        let mut seen = vec![false; count];
        for &idx in &indices {
            assert!(!std::mem::replace(&mut seen[idx as usize], true));
        }

        let depths = indices
            .iter()
            .map(|&idx| host_depths.keys()[idx as usize])
            .collect::<Vec<_>>();
        assert!(depths.windows(2).all(|pair| pair[0] <= pair[1] + 1e-3));
    }
}
