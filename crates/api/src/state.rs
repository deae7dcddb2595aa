//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::paypal::{PayPalClient, PayPalError};
use crate::services::auth::TokenService;
use crate::services::catalog::CatalogCache;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    tokens: TokenService,
    paypal: Option<PayPalClient>,
    catalog: CatalogCache,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The PayPal client is only built when PayPal credentials are configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the PayPal HTTP client cannot be built.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, PayPalError> {
        let tokens = TokenService::new(&config.jwt);
        let paypal = config.paypal.as_ref().map(PayPalClient::new).transpose()?;
        if paypal.is_none() {
            tracing::warn!("PayPal is not configured; PayPal checkout will be unavailable");
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                tokens,
                paypal,
                catalog: CatalogCache::default(),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    /// The PayPal client, when configured.
    #[must_use]
    pub fn paypal(&self) -> Option<&PayPalClient> {
        self.inner.paypal.as_ref()
    }

    #[must_use]
    pub fn catalog_cache(&self) -> &CatalogCache {
        &self.inner.catalog
    }
}
