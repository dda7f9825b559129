pub mod domain;
pub mod mainstream;
pub mod mainstream_worker;

pub use domain::*;
pub use mainstream::*;
pub use mainstream_worker::*;
