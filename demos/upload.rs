//! Example: Upload a raw YUV frame
//!
//! Creates a Vulkan 1.1 device with sampler YCbCr conversion enabled, uploads a
//! raw frame into a linear multi-plane image and builds a conversion sampler.
//!
//! Usage: `cargo run --example upload -- <file> <width> <height> <YU12|NV12|422P> [--disjoint]`

use ash::vk;
use std::ffi::{CStr, CString};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use yuvtex::{Image, ImageConfig, ImageFormat, VulkanContext};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 4 {
        eprintln!("Usage: upload <file> <width> <height> <YU12|NV12|422P> [--disjoint]");
        return Ok(());
    }
    let path = &args[0];
    let width: u32 = args[1].parse()?;
    let height: u32 = args[2].parse()?;
    let format: ImageFormat = args[3].parse()?;
    let disjoint = args.iter().skip(4).any(|arg| arg == "--disjoint");

    // Load Vulkan.
    let entry = unsafe { ash::Entry::load() }?;

    let app_name = CString::new("yuvtex upload")?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_1);
    let create_info = vk::InstanceCreateInfo::default().application_info(&app_info);
    let instance = unsafe { entry.create_instance(&create_info, None) }?;

    // Pick the first device with a graphics queue.
    let mut selected = None;
    for physical_device in unsafe { instance.enumerate_physical_devices() }? {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        if let Some(family) = queue_families
            .iter()
            .position(|props| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        {
            selected = Some((physical_device, family as u32));
            break;
        }
    }
    let Some((physical_device, queue_family_index)) = selected else {
        eprintln!("No Vulkan device with a graphics queue found");
        unsafe { instance.destroy_instance(None) };
        return Ok(());
    };

    let props = unsafe { instance.get_physical_device_properties(physical_device) };
    let device_name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();
    println!("Device: {device_name}");

    let queue_priorities = [1.0];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family_index)
        .queue_priorities(&queue_priorities)];

    // Enable sampler YCbCr conversion feature.
    let mut ycbcr_features =
        vk::PhysicalDeviceSamplerYcbcrConversionFeatures::default().sampler_ycbcr_conversion(true);
    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .push_next(&mut ycbcr_features);
    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }?;

    let result = upload(
        VulkanContext::new(instance.clone(), physical_device, device.clone(), queue_family_index),
        path,
        ImageConfig::new(width, height, format).with_disjoint(disjoint),
    );

    unsafe {
        device.destroy_device(None);
        instance.destroy_instance(None);
    }
    result
}

fn upload(
    context: yuvtex::Result<VulkanContext>,
    path: &str,
    config: ImageConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let context = context?;
    let mut image = Image::init_from_file(context, path, config)?;
    let mut sampler = image.create_sampler()?;

    println!(
        "Uploaded {} {}x{} into {} allocation(s)",
        image.format(),
        image.width(),
        image.height(),
        image.allocation_count()
    );
    for plane in 0..image.plane_count() {
        let layout = image.plane_layout(plane)?;
        println!(
            "  plane {plane}: offset={} row_pitch={} size={}",
            layout.offset, layout.row_pitch, layout.size
        );
    }
    println!("Sampler: {:?}", sampler.sampler());

    sampler.finish();
    image.finish();
    Ok(())
}
