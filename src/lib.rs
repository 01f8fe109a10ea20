pub mod engine;
pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_keys;
pub mod validation;

use std::path::Path;
use std::sync::Arc;

pub use engine::serializer::{parse_blocks, serialize, serialize_all};
pub use engine::types::{BlockNode, BlockPath, GeneratedBlock, GenerationContext, GenerationRequest};
pub use engine::BlockGenerator;
pub use error::AppError;
pub use settings::{FileSettings, MemorySettings, SettingsProvider};

use engine::cache::ResponseCache;
use engine::provider::{ReqwestTransport, Transport};
use engine::usage::{TracingUsageTracker, UsageTracker};

/// Everything a host needs to serve generation requests, wired from one
/// settings source.
pub struct Services {
    pub settings: Arc<dyn SettingsProvider>,
    pub cache: Arc<ResponseCache>,
    pub usage: Arc<dyn UsageTracker>,
    pub generator: BlockGenerator,
}

impl Services {
    /// Production wiring: reqwest transport and usage reported through tracing.
    pub fn from_settings(settings: Arc<dyn SettingsProvider>) -> Result<Self, AppError> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_parts(
            settings,
            transport,
            Arc::new(TracingUsageTracker),
        ))
    }

    /// Load `path` (if any) plus `GENBLOCKS_*` overrides and wire production services.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let settings = FileSettings::load(path)?;
        Self::from_settings(Arc::new(settings))
    }

    pub fn with_parts(
        settings: Arc<dyn SettingsProvider>,
        transport: Arc<dyn Transport>,
        usage: Arc<dyn UsageTracker>,
    ) -> Self {
        let cache = Arc::new(ResponseCache::new());
        let generator = BlockGenerator::new(
            Arc::clone(&settings),
            transport,
            Arc::clone(&cache),
            Arc::clone(&usage),
        );
        Self {
            settings,
            cache,
            usage,
            generator,
        }
    }
}
