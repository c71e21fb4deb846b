use crate::attendee_research::{AttendeeResearcher, HttpWebSearchClient, WebSearchClient};
use crate::brief::BriefSynthesizer;
use crate::classifier::EventClassifier;
use crate::config::Config;
use crate::coordinator::PrepCoordinator;
use crate::day_prep::DayPrepAggregator;
use crate::db::{self, SqliteRepository};
use crate::harvester::MultiAccountHarvester;
use crate::llm::LlmClient;
use crate::purpose::PurposeDetector;
use crate::push::{LoggingPushSink, PushSink};
use crate::relevance::documents::DocumentRelevancePipeline;
use crate::relevance::emails::EmailRelevancePipeline;
use crate::scheduler::Scheduler;
use crate::token_guard::TokenGuard;
use std::sync::Arc;

/// Everything an axum handler needs, built once at startup and cloned per
/// request (every field is an `Arc`, so cloning is cheap — the same pattern
/// as the teacher's `ServiceContext`).
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<SqliteRepository>,
    pub token_guard: Arc<TokenGuard>,
    pub coordinator: Arc<PrepCoordinator>,
    pub purpose_detector: Arc<PurposeDetector>,
    pub day_prep: Arc<DayPrepAggregator>,
    pub scheduler: Arc<Scheduler>,
    pub api_key: Option<String>,
}

impl AppState {
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(&config.database.path).await?;
        let repo = Arc::new(SqliteRepository::new(pool));

        let token_guard = Arc::new(TokenGuard::new(config.oauth.clone(), repo.clone()));
        let harvester = Arc::new(MultiAccountHarvester::new(token_guard.clone()));

        let llm = LlmClient::new(&config.llm)?;
        let classifier = Arc::new(EventClassifier::new(llm.clone()));
        let purpose_detector = Arc::new(PurposeDetector::new(llm.clone()));
        let email_pipeline = Arc::new(EmailRelevancePipeline::new(llm.clone()));
        let doc_pipeline = Arc::new(DocumentRelevancePipeline::new(llm.clone()));

        let web_search: Option<Arc<dyn WebSearchClient>> = match (&config.web_search.api_key, &config.web_search.base_url) {
            (Some(key), Some(base)) => Some(Arc::new(HttpWebSearchClient::new(base.clone(), key.expose_secret().to_string()))),
            _ => None,
        };
        let researcher = Arc::new(AttendeeResearcher::new(llm.clone(), web_search));
        let synthesizer = Arc::new(BriefSynthesizer::new(llm.clone()));

        let coordinator = Arc::new(PrepCoordinator::new(
            token_guard.clone(),
            harvester,
            classifier,
            purpose_detector.clone(),
            email_pipeline,
            doc_pipeline,
            researcher,
            synthesizer,
            repo.clone(),
        ));

        let day_prep = Arc::new(DayPrepAggregator::new(llm.clone()));

        // No real push transport ships with this crate (§1); a configured
        // `service_key` has nothing to bind to yet.
        let push: Arc<dyn PushSink> = Arc::new(LoggingPushSink);

        let scheduler = Arc::new(Scheduler::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            token_guard.clone(),
            coordinator.clone(),
            push,
        ));

        Ok(Self {
            repo,
            token_guard,
            coordinator,
            purpose_detector,
            day_prep,
            scheduler,
            api_key: config.server.api_key.as_ref().map(|s| s.expose_secret().to_string()),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;

    pub async fn empty_state(api_key: Option<String>) -> AppState {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.database.path = tmp.path().to_path_buf();
        let mut state = AppState::build(&config).await.unwrap();
        state.api_key = api_key;
        state
    }
}
