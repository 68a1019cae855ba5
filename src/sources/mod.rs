mod base;
pub mod vk;

pub use base::*;
