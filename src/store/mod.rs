pub mod artifacts;
pub mod staging;

use std::sync::Arc;

pub use artifacts::{ArtifactMeta, ArtifactStore, ModulePath, StoreError};
pub use staging::StagedUpload;

use crate::config::Config;
use crate::registry::route::Routes;

#[derive(Clone)]
pub struct AppState {
    pub artifacts: ArtifactStore,
    pub routes: Arc<Routes>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let upload_prefix = config
            .uploads_enabled
            .then_some(config.upload_prefix.as_str());
        let routes = Routes::new(&config.read_prefix, upload_prefix)?;
        Ok(Self {
            artifacts: ArtifactStore::new(&config.root),
            routes: Arc::new(routes),
            config: Arc::new(config),
        })
    }
}
