//! HTTP server command

use std::sync::Arc;

use anyhow::Result;

use crate::backend::{DemoBlender, DemoGenerator};
use crate::chat::ChatService;
use crate::config::BlendrConfig;
use crate::engine::{Dispatcher, ResidencyManager};
use crate::model::{LoadPurpose, ModelConfiguration, ModelStore};
use crate::server::{self, AppState};

/// Command-line overrides for `serve`
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub ranker: Option<String>,
    pub fuser: Option<String>,
    pub load_timeout_secs: Option<u64>,
    pub max_waiting: Option<usize>,
}

impl ServeOptions {
    fn apply(&self, config: &mut BlendrConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(secs) = self.load_timeout_secs {
            config.residency.load_timeout_secs = secs;
        }
        if self.max_waiting.is_some() {
            config.residency.max_waiting = self.max_waiting;
        }
    }

    fn preload(&self) -> Option<ModelConfiguration> {
        match (&self.ranker, &self.fuser) {
            (Some(ranker), Some(fuser)) => Some(ModelConfiguration::new(ranker, fuser)),
            _ => None,
        }
    }
}

/// Start the blend server
pub async fn serve(mut config: BlendrConfig, options: ServeOptions) -> Result<()> {
    options.apply(&mut config);

    let store = ModelStore::new(config.residency.model_dir.clone());
    tracing::info!("Model cache: {}", store.root().display());

    let blender = Arc::new(DemoBlender::new(store));
    let blend_residency = Arc::new(
        ResidencyManager::new(blender)
            .with_load_timeout(config.residency.load_timeout())
            .with_max_waiting(config.residency.max_waiting),
    );

    // Pre-load models if specified
    if let Some(models) = options.preload() {
        tracing::info!("Pre-loading models: {}", models);
        blend_residency
            .ensure_resident(&models, LoadPurpose::FuseCapable)
            .await?;
        tracing::info!("Models loaded successfully");
    }

    let dispatcher = Dispatcher::new(blend_residency)
        .with_top_k(config.blend.top_k)
        .with_default_model(config.blend.default_model.clone());

    let generator = Arc::new(
        DemoGenerator::new(config.generation.max_length).with_pacing(config.generation.pacing()),
    );
    let chat_residency = Arc::new(
        ResidencyManager::new(generator)
            .with_load_timeout(config.residency.load_timeout())
            .with_max_waiting(config.residency.max_waiting),
    );
    let chat = ChatService::new(chat_residency, &config.generation);

    let state = Arc::new(AppState::new(dispatcher, chat));

    tracing::info!("Starting server at http://{}", config.server.addr());
    server::start(state, config.server).await?;

    Ok(())
}
