mod config;
mod context;
mod record;

pub use self::config::{AppConfig, CONFIG_VERSION, CacheConfig, Defaults, RetryConfig};
pub use self::context::{Context, ContextOrigin, Credentials};
pub use self::record::{KindId, Payload, ResourceRecord, ResourceRef};
