//! Application state: configuration, the story store and the (optional)
//! generation orchestrator.
//!
//! Without ANTHROPIC_API_KEY the server still serves whatever is cached;
//! only generation is disabled.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use crate::anthropic::AnthropicBatches;
use crate::batch::GenerationClient;
use crate::config::{load_config_from_env, ReaderConfig};
use crate::orchestrator::Orchestrator;
use crate::store::StoryStore;

#[derive(Clone)]
pub struct AppState {
    pub config: ReaderConfig,
    pub store: StoryStore,
    pub orchestrator: Option<Arc<Orchestrator>>,
}

impl AppState {
    /// Build state from env: load config, open the store, init the provider client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_config_from_env();

        let client = AnthropicBatches::from_env(&config.provider);
        if let Some(c) = &client {
            info!(target: "dailyread_backend", base_url = %c.base_url, model = %c.model, structured_output = c.structured_output, "Batch generation enabled.");
        } else {
            warn!(target: "dailyread_backend", "Batch generation disabled (no ANTHROPIC_API_KEY). Serving cached stories only.");
        }

        Self::from_parts(config, client.map(|c| Arc::new(c) as Arc<dyn GenerationClient>))
    }

    pub fn from_parts(config: ReaderConfig, client: Option<Arc<dyn GenerationClient>>) -> Self {
        let store = StoryStore::new(&config.stories_dir, &config.probe_language, config.probe_level);
        if config.find_language(&config.probe_language).is_none() || !config.levels.contains(&config.probe_level) {
            warn!(target: "dailyread_backend", probe_language = %config.probe_language, probe_level = %config.probe_level, "Probe pair is not among the generated pairs; dates will never look complete");
        }
        let orchestrator = client.map(|c| Arc::new(Orchestrator::new(c, store.clone(), config.clone())));
        info!(
            target: "dailyread_backend",
            stories_dir = %store.root().display(),
            languages = config.languages.len(),
            levels = config.levels.len(),
            "Story store ready"
        );
        Self { config, store, orchestrator }
    }

    /// Server-local calendar date used for "today's story".
    pub fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}
