mod adapter;
mod catalog;
mod descriptor;
mod params;
mod registry;

pub use adapter::{ModelAdapter, TransformFn, UpstreamPayload, ValidateFn, ValidatedInput};
pub use catalog::default_adapters;
pub use descriptor::{Capabilities, ModelDescriptor, ModelMetadata, Provider};
pub use params::{Fields, InputReader, ValidationError, REFERENCE_IMAGES_KEY};
pub use registry::{ModelRegistry, RegistryError};
