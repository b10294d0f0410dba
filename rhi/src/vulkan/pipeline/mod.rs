mod compute;
mod raster;

pub use compute::VulkanComputePipeline;
pub use raster::VulkanRasterPipeline;

use crate::RhiError;

use super::VulkanDevice;

pub(crate) fn create_raster_pipeline(device: &VulkanDevice, desc: &crate::RasterPipelineDescriptor) -> Result<Box<dyn crate::RasterPipeline>, RhiError> {
    raster::create(device, desc)
}

pub(crate) fn create_compute_pipeline(device: &VulkanDevice, desc: &crate::ComputePipelineDescriptor) -> Result<Box<dyn crate::ComputePipeline>, RhiError> {
    compute::create(device, desc)
}
