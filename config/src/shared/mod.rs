mod app;
mod base;
mod pipeline;

pub use app::*;
pub use base::*;
pub use pipeline::*;
