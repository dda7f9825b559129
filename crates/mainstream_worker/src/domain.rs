mod device_directory;
#[cfg(test)]
pub(crate) mod in_memory_repositories;
mod sync_scheduler;
mod sync_service;
mod telemetry_ingest_service;
mod timestamp_normalizer;
mod transient;
mod upstream;

pub use device_directory::*;
pub use sync_scheduler::*;
pub use sync_service::*;
pub use telemetry_ingest_service::*;
pub use timestamp_normalizer::*;
pub use transient::*;
pub use upstream::*;
