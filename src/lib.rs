//! # yuvtex
//!
//! Upload chroma-subsampled planar YUV frames into linear multi-plane Vulkan images
//! and sample them through a YCbCr conversion.
//!
//! ## Supported formats
//!
//! | Format | Planes | Chroma subsampling | Vulkan format |
//! |--------|--------|--------------------|---------------|
//! | YU12 (I420) | 3 | 2x2 | `G8_B8_R8_3PLANE_420_UNORM` |
//! | NV12 | 2 | 2x2, interleaved CbCr | `G8_B8R8_2PLANE_420_UNORM` |
//! | 422P | 3 | 2x1 | `G8_B8_R8_3PLANE_422_UNORM` |
//!
//! ## Example
//!
//! ```no_run
//! use yuvtex::{Image, ImageConfig, ImageFormat, VulkanContext};
//!
//! # fn run(context: VulkanContext) -> yuvtex::Result<()> {
//! let config = ImageConfig::new(1920, 1080, ImageFormat::Nv12).with_disjoint(true);
//! let mut image = Image::init_from_file(context, "frame.nv12", config)?;
//! let mut sampler = image.create_sampler()?;
//!
//! // Hand `image.image()` and `sampler.immutable_samplers()` to the descriptor layer,
//! // transition the image before first use, then release both.
//! sampler.finish();
//! image.finish();
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod error;
pub mod format;
pub mod image;
pub mod sampler;
pub mod vulkan;

pub use device::ImageDevice;
pub use error::{Result, YuvTexError};
pub use format::{ImageFormat, PlaneExtent, MAX_PLANES};
pub use image::{BindStrategy, Image, ImageConfig};
pub use sampler::{ConversionConfig, YcbcrModel, YcbcrRange, YcbcrSampler};
pub use vulkan::VulkanContext;
