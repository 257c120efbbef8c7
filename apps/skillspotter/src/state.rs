use std::sync::Arc;

use tracing::{info, warn};

use crate::admin::AdminService;
use crate::api_client::ApiClient;
use crate::auth::AuthStore;
use crate::cache::{FallbackCache, FileCache, RedisCache};
use crate::config::Config;
use crate::errors::AppError;
use crate::jobs::JobsService;
use crate::matching::ExactMatchScorer;
use crate::processing::PollRegistry;
use crate::resume::ResumeService;
use crate::session::Session;
use crate::skills::SkillsService;
use crate::upload::UploadDispatcher;

/// Every service wired to one session, one cache and one poll registry.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub session: Session,
    pub cache: Arc<dyn FallbackCache>,
    pub api: ApiClient,
    pub auth: AuthStore,
    pub uploads: UploadDispatcher,
    pub resume: ResumeService,
    pub jobs: JobsService,
    pub skills: SkillsService,
    pub admin: AdminService,
}

impl AppState {
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let cache = open_cache(&config).await;
        Self::with_cache(config, cache).await
    }

    pub async fn with_cache(
        config: Config,
        cache: Arc<dyn FallbackCache>,
    ) -> Result<Self, AppError> {
        let session = Session::new();
        let polls = PollRegistry::new();

        let api = ApiClient::new(config.api_url.clone(), session.clone(), cache.clone())?;
        info!("API client initialized ({})", config.api_url);

        let auth = AuthStore::new(
            Arc::new(api.clone()),
            session.clone(),
            cache.clone(),
            polls.clone(),
            config.refresh_delay,
        );

        let uploads = UploadDispatcher::from_config(&config, &api).await;
        info!("Upload strategies: {}", uploads.strategy_names().join(" -> "));

        let resume = ResumeService::new(
            Arc::new(api.clone()),
            uploads.clone(),
            cache.clone(),
            session.clone(),
            polls,
        );
        let jobs = JobsService::new(
            api.clone(),
            cache.clone(),
            uploads.clone(),
            Arc::new(ExactMatchScorer),
        );
        let skills = SkillsService::new(api.clone(), cache.clone());
        let admin = AdminService::new(api.clone(), cache.clone());

        Ok(Self {
            config,
            session,
            cache,
            api,
            auth,
            uploads,
            resume,
            jobs,
            skills,
            admin,
        })
    }
}

/// Redis when configured and reachable, otherwise the local JSON file.
async fn open_cache(config: &Config) -> Arc<dyn FallbackCache> {
    if let Some(url) = &config.redis_url {
        match RedisCache::connect(url).await {
            Ok(cache) => {
                info!("Fallback cache: redis");
                return Arc::new(cache);
            }
            Err(e) => warn!("Redis cache unavailable, using file cache: {e}"),
        }
    }
    info!("Fallback cache: {}", config.cache_path.display());
    Arc::new(FileCache::new(config.cache_path.clone()))
}
