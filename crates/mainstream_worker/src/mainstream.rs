mod client;
mod models;
mod translation;

pub use client::*;
pub use models::*;
pub use translation::*;
