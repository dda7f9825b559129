mod cache_entry;
mod clock;
mod device;
mod probe;
mod result;
mod telemetry_reading;

pub use cache_entry::*;
pub use clock::*;
pub use device::*;
pub use probe::*;
pub use result::*;
pub use telemetry_reading::*;
