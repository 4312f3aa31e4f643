pub mod client;
pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::{CompletionPolicy, FormationCompletionRule};
use crate::database::ProgressStore;
use crate::services::{
    catalog_service::CatalogService, progress_service::ProgressService,
    quiz_service::QuizService, summary_service::SummaryService,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProgressStore>,
    pub progress_service: ProgressService,
    pub summary_service: SummaryService,
    pub catalog_service: CatalogService,
    pub quiz_service: QuizService,
}

impl AppState {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        let config = crate::config::get_config();
        Self::with_policies(store, config.completion_policy, config.completion_rule)
    }

    pub fn with_policies(
        store: Arc<dyn ProgressStore>,
        policy: CompletionPolicy,
        rule: FormationCompletionRule,
    ) -> Self {
        Self {
            progress_service: ProgressService::new(store.clone(), policy),
            summary_service: SummaryService::new(store.clone(), rule),
            catalog_service: CatalogService::new(store.clone()),
            quiz_service: QuizService::new(store.clone()),
            store,
        }
    }
}
