//! Configuration types and layered loading shared by the stagepipe binaries.

mod environment;
mod load;
pub mod shared;

pub use environment::{APP_ENVIRONMENT_ENV_NAME, Environment};
pub use load::{CONFIGURATION_DIR, Config, LoadConfigError, load_config, load_config_from};
