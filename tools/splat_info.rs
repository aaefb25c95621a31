use byte_unit::{
    Byte,
    UnitType,
};
use clap::Parser;
use glam::Vec3;

use splat_sort::{
    Camera,
    DecodeSettings,
    DepthKeys,
    FrameProfiler,
    GpuPointCloud,
    PerspectiveCamera,
    PointCloud,
    SortManager,
    SplatResult,
    gaussian::{
        rand::random_cloud,
        settings::CloudSettings,
    },
    load_file,
    render::{
        read_buffer_u32,
        request_device,
    },
    sort::cpu_sorter,
    utils::{
        SplatInfoArgs,
        setup_logging,
    },
};


fn main() -> SplatResult<()> {
    setup_logging();

    let args = SplatInfoArgs::parse();
    let settings = args.cloud_settings()?;

    let cloud = if args.input_file.is_empty() {
        println!("generating {} random gaussians", args.gaussian_count);
        random_cloud(args.gaussian_count)
    } else {
        println!("loading `{}`", args.input_file);
        load_file(&args.input_file, &DecodeSettings::from(&settings))?
    };

    print_summary(&cloud);

    let camera = framing_camera(&cloud);

    if settings.sort_mode.is_gpu() {
        pollster::block_on(sort_gpu(&cloud, &camera, &settings, args.frames))
    } else {
        sort_cpu(&cloud, &camera, &settings, args.frames)
    }
}


fn print_summary(cloud: &PointCloud) {
    let bytes = cloud.gaussian_bytes().len()
        + cloud.sh_bytes().len()
        + cloud.covars_bytes().map_or(0, <[u8]>::len);

    println!("points: {}", cloud.num_points());
    println!("sh degree: {}", cloud.sh_deg());
    println!("compressed: {}", cloud.is_compressed());
    println!("packed size: {}", Byte::from_u64(bytes as u64).get_appropriate_unit(UnitType::Decimal));
    println!("aabb: {:?} .. {:?} (radius {:.3})", cloud.aabb().min, cloud.aabb().max, cloud.aabb().radius());
    println!("center: {:?}", cloud.center());

    if let Some(up) = cloud.up() {
        println!("up: {up:?}");
    }

    let metadata = cloud.metadata();
    if let Some(kernel_size) = metadata.kernel_size {
        println!("kernel size: {kernel_size}");
    }
    if let Some(mip_splatting) = metadata.mip_splatting {
        println!("mip splatting: {mip_splatting}");
    }
    if let Some(background_color) = metadata.background_color {
        println!("background color: {background_color:?}");
    }
}

/// looks at the cloud center from two radii along +z
fn framing_camera(cloud: &PointCloud) -> PerspectiveCamera {
    let center = cloud.center();
    let distance = 2.0 * cloud.aabb().radius().max(1.0);
    let up = cloud
        .up()
        .filter(|up| up.cross(Vec3::Z).length() > 1e-3)
        .unwrap_or(Vec3::Y);

    PerspectiveCamera::look_at(center + Vec3::Z * distance, center, up)
}


fn sort_cpu(
    cloud: &PointCloud,
    camera: &PerspectiveCamera,
    settings: &CloudSettings,
    frames: usize,
) -> SplatResult<()> {
    let Some(mut sorter) = cpu_sorter(settings.sort_mode) else {
        println!("sort mode `{}` performs no sort", settings.sort_mode);
        return Ok(());
    };

    let mut profiler = FrameProfiler::default();
    for frame in 0..frames {
        profiler.reset();

        let keys = profiler.time("extract", || DepthKeys::extract(camera, cloud, settings.depth_order));
        let sorted = profiler.time("sort", || sorter.sort(&keys))?;

        println!(
            "frame {frame}: sorted {} of {} padded entries, extract {:?}, sort {:?}",
            sorted.instance_count,
            sorted.padded_size(),
            profiler.get("extract").unwrap_or_default(),
            profiler.get("sort").unwrap_or_default(),
        );
        profiler.report();
    }

    Ok(())
}


async fn sort_gpu(
    cloud: &PointCloud,
    camera: &PerspectiveCamera,
    settings: &CloudSettings,
    frames: usize,
) -> SplatResult<()> {
    let (device, queue) = request_device().await?;

    let gpu_cloud = GpuPointCloud::new(&device, cloud);
    let mut manager = SortManager::new(&device, settings.sort_mode);
    let depth_pipeline = splat_sort::render::depth::DepthKeyPipeline::new(&device);

    let mut profiler = FrameProfiler::default();
    for frame in 0..frames {
        profiler.reset();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("splat_info_encoder"),
        });

        if settings.near_cull > 0.0 {
            profiler.time("record", || {
                manager.sort_indirect(
                    &device,
                    &queue,
                    &mut encoder,
                    &depth_pipeline,
                    &gpu_cloud,
                    camera.view_matrix(),
                    settings.depth_order,
                    settings.near_cull,
                )
            })?;
        } else {
            let keys = profiler.time("extract", || DepthKeys::extract(camera, cloud, settings.depth_order));
            profiler.time("record", || manager.sort(&device, &queue, &mut encoder, &keys))?;
        }

        profiler.time("device", || {
            queue.submit(Some(encoder.finish()));
            let _ = device.poll(wgpu::Maintain::Wait);
        });

        let draw_args = read_buffer_u32(&device, &queue, manager.draw_args(), 4)?;
        println!(
            "frame {frame}: {} instances, {:?} total",
            draw_args[1],
            profiler.total(),
        );
        profiler.report();
    }

    Ok(())
}
