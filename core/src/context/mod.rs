mod config;
mod identifiers;
mod session;

pub use config::{ConfigError, LoadedConfig, load_config, parse_config, store_config, validate};
pub use identifiers::{COUNTER_SYSTEM, IdentifierCache};
pub use session::{PendingCleanup, SessionContext};
