use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, StorePolicy, orm_from_pool},
    routes::params::PageRequest,
    token::TokenMaker,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub tokens: TokenMaker,
}

impl AppState {
    pub fn new(pool: DbPool, config: AppConfig) -> Self {
        let tokens = TokenMaker::new(&config.jwt_secret, config.token_ttl);
        Self {
            orm: orm_from_pool(pool.clone()),
            pool,
            config: Arc::new(config),
            tokens,
        }
    }

    pub fn store(&self) -> StorePolicy {
        StorePolicy::from(self.config.as_ref())
    }

    pub fn page(&self, page: Option<u64>, per_page: Option<u64>) -> PageRequest {
        PageRequest::resolve(
            page,
            per_page,
            self.config.default_page_size,
            self.config.max_page_size,
        )
    }
}
