//! YCbCr conversion samplers.
//!
//! A [`YcbcrSampler`] pairs a `VkSamplerYcbcrConversion` with a sampler that has the
//! conversion attached, so a multi-plane image can be sampled as one RGB texture.
//! The sampler has to be declared as an immutable sampler when the descriptor set
//! layout is created; see [`YcbcrSampler::immutable_samplers`].

use crate::device::ImageDevice;
use crate::error::{Result, YuvTexError};
use crate::format::ImageFormat;
use crate::vulkan::VulkanContext;
use ash::vk;
use tracing::debug;

/// YCbCr color model/matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YcbcrModel {
    /// ITU-R BT.601 (SDTV)
    Bt601,
    /// ITU-R BT.709 (HDTV)
    Bt709,
    /// ITU-R BT.2020 (UHDTV)
    Bt2020,
    /// Identity (RGB passthrough)
    Identity,
}

impl YcbcrModel {
    /// Convert to Vulkan sampler YCbCr model.
    pub fn to_vk(self) -> vk::SamplerYcbcrModelConversion {
        match self {
            YcbcrModel::Bt601 => vk::SamplerYcbcrModelConversion::YCBCR_601,
            YcbcrModel::Bt709 => vk::SamplerYcbcrModelConversion::YCBCR_709,
            YcbcrModel::Bt2020 => vk::SamplerYcbcrModelConversion::YCBCR_2020,
            YcbcrModel::Identity => vk::SamplerYcbcrModelConversion::RGB_IDENTITY,
        }
    }
}

/// YCbCr value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YcbcrRange {
    /// ITU narrow range (Y: 16-235, Cb/Cr: 16-240)
    Narrow,
    /// Full range (0-255)
    Full,
}

impl YcbcrRange {
    /// Convert to Vulkan sampler YCbCr range.
    pub fn to_vk(self) -> vk::SamplerYcbcrRange {
        match self {
            YcbcrRange::Narrow => vk::SamplerYcbcrRange::ITU_NARROW,
            YcbcrRange::Full => vk::SamplerYcbcrRange::ITU_FULL,
        }
    }
}

/// Parameters of the YCbCr conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct ConversionConfig {
    pub model: YcbcrModel,
    pub range: YcbcrRange,
    /// Horizontal chroma siting.
    pub x_chroma_offset: vk::ChromaLocation,
    /// Vertical chroma siting.
    pub y_chroma_offset: vk::ChromaLocation,
    /// Filter used to reconstruct subsampled chroma.
    pub chroma_filter: vk::Filter,
}

impl Default for ConversionConfig {
    /// BT.709, full range, chroma sited at the sample midpoint, nearest chroma filtering.
    fn default() -> Self {
        Self {
            model: YcbcrModel::Bt709,
            range: YcbcrRange::Full,
            x_chroma_offset: vk::ChromaLocation::MIDPOINT,
            y_chroma_offset: vk::ChromaLocation::MIDPOINT,
            chroma_filter: vk::Filter::NEAREST,
        }
    }
}

impl ConversionConfig {
    pub fn with_model(mut self, model: YcbcrModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_range(mut self, range: YcbcrRange) -> Self {
        self.range = range;
        self
    }

    /// Set the chroma siting on both axes.
    pub fn with_chroma_offsets(mut self, x: vk::ChromaLocation, y: vk::ChromaLocation) -> Self {
        self.x_chroma_offset = x;
        self.y_chroma_offset = y;
        self
    }

    pub fn with_chroma_filter(mut self, filter: vk::Filter) -> Self {
        self.chroma_filter = filter;
        self
    }
}

/// A YCbCr conversion and the sampler it is attached to.
///
/// Independent of any [`crate::Image`]: one sampler can serve every image of its
/// format. [`YcbcrSampler::finish`] destroys both handles; it runs on drop too.
pub struct YcbcrSampler<D: ImageDevice = VulkanContext> {
    device: D,
    format: ImageFormat,
    config: ConversionConfig,
    conversion: vk::SamplerYcbcrConversion,
    sampler: vk::Sampler,
}

impl<D: ImageDevice> YcbcrSampler<D> {
    /// Create a sampler for `format` with the default conversion.
    pub fn new(device: D, format: ImageFormat) -> Result<Self> {
        Self::with_conversion(device, format, ConversionConfig::default())
    }

    /// Create a sampler for `format` with a custom conversion.
    pub fn with_conversion(device: D, format: ImageFormat, config: ConversionConfig) -> Result<Self> {
        let conversion_create_info = vk::SamplerYcbcrConversionCreateInfo::default()
            .format(format.to_device_format())
            .ycbcr_model(config.model.to_vk())
            .ycbcr_range(config.range.to_vk())
            .components(vk::ComponentMapping::default())
            .x_chroma_offset(config.x_chroma_offset)
            .y_chroma_offset(config.y_chroma_offset)
            .chroma_filter(config.chroma_filter)
            .force_explicit_reconstruction(false);

        let conversion = unsafe { device.create_sampler_ycbcr_conversion(&conversion_create_info) }
            .map_err(|e| {
                YuvTexError::SamplerCreationFailed(format!("YCbCr conversion for {}: {}", format, e))
            })?;

        let mut conversion_info = vk::SamplerYcbcrConversionInfo::default().conversion(conversion);
        let sampler_create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .anisotropy_enable(false)
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(0.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .push_next(&mut conversion_info);

        let sampler = match unsafe { device.create_sampler(&sampler_create_info) } {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe { device.destroy_sampler_ycbcr_conversion(conversion) };
                return Err(YuvTexError::SamplerCreationFailed(format!(
                    "sampler for {}: {}",
                    format, e
                )));
            }
        };

        debug!(
            "Created {} sampler ({:?}, {:?} range)",
            format, config.model, config.range
        );

        Ok(Self {
            device,
            format,
            config,
            conversion,
            sampler,
        })
    }

    /// Destroy the sampler, then the conversion.
    ///
    /// Calling this again, or dropping the sampler afterwards, does nothing.
    pub fn finish(&mut self) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(self.sampler);
                self.sampler = vk::Sampler::null();
            }
            if self.conversion != vk::SamplerYcbcrConversion::null() {
                self.device.destroy_sampler_ycbcr_conversion(self.conversion);
                self.conversion = vk::SamplerYcbcrConversion::null();
            }
        }
    }

    /// Get the sampler handle (null once finished).
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Get the conversion handle (null once finished).
    pub fn conversion(&self) -> vk::SamplerYcbcrConversion {
        self.conversion
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Conversion info to chain into the image view of a sampled image.
    pub fn conversion_info(&self) -> vk::SamplerYcbcrConversionInfo<'static> {
        vk::SamplerYcbcrConversionInfo::default().conversion(self.conversion)
    }

    /// Slice for `vk::DescriptorSetLayoutBinding::immutable_samplers`.
    pub fn immutable_samplers(&self) -> &[vk::Sampler] {
        std::slice::from_ref(&self.sampler)
    }
}

impl<D: ImageDevice> Drop for YcbcrSampler<D> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<D: ImageDevice> std::fmt::Debug for YcbcrSampler<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YcbcrSampler")
            .field("format", &self.format)
            .field("config", &self.config)
            .field("conversion", &self.conversion)
            .field("sampler", &self.sampler)
            .finish()
    }
}
