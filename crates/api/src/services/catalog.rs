//! Product catalog reads with an in-process cache.
//!
//! Taxonomy lists and product detail pages are cached with `moka`
//! (5-minute TTL). Filtered listings always hit the database.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use tracing::debug;

use crate::db::{CatalogRepository, RepositoryError};
use crate::models::{
    Category, Color, Page, ProductDetail, ProductFilter, ProductSummary, Size, Tag,
};

const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_CAPACITY: u64 = 1000;

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Categories,
    Colors,
    Sizes,
    Tags,
    Product(String),
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Categories(Arc<Vec<Category>>),
    Colors(Arc<Vec<Color>>),
    Sizes(Arc<Vec<Size>>),
    Tags(Arc<Vec<Tag>>),
    Product(Arc<ProductDetail>),
}

/// Shared catalog cache. Cheap to clone.
#[derive(Clone)]
pub struct CatalogCache {
    cache: Cache<CacheKey, CacheValue>,
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new(CACHE_TTL)
    }
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl CatalogCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Drop every cached entry.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

/// Catalog queries for one request.
pub struct CatalogService<'a> {
    repo: CatalogRepository<'a>,
    cache: &'a CatalogCache,
}

macro_rules! cached_list {
    ($name:ident, $key:ident, $ty:ty) => {
        /// Active entries, cached.
        ///
        /// # Errors
        ///
        /// Returns `RepositoryError::Database` on a cache miss that fails to load.
        pub async fn $name(&self) -> Result<Arc<Vec<$ty>>, RepositoryError> {
            if let Some(CacheValue::$key(rows)) = self.cache.cache.get(&CacheKey::$key).await {
                debug!(key = stringify!($key), "Catalog cache hit");
                return Ok(rows);
            }
            let rows = Arc::new(self.repo.$name().await?);
            self.cache
                .cache
                .insert(CacheKey::$key, CacheValue::$key(Arc::clone(&rows)))
                .await;
            Ok(rows)
        }
    };
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, cache: &'a CatalogCache) -> Self {
        Self {
            repo: CatalogRepository::new(pool),
            cache,
        }
    }

    cached_list!(categories, Categories, Category);
    cached_list!(colors, Colors, Color);
    cached_list!(sizes, Sizes, Size);
    cached_list!(tags, Tags, Tag);

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Page<ProductSummary>, RepositoryError> {
        let (products, count) = self.repo.list_products(filter).await?;
        let results = products.iter().map(ProductSummary::from).collect();
        Ok(Page::new(results, count, filter.page(), filter.page_size()))
    }

    /// Active product by slug with images and taxonomy.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for unknown or inactive products.
    pub async fn product(&self, slug: &str) -> Result<Arc<ProductDetail>, RepositoryError> {
        let key = CacheKey::Product(slug.to_owned());
        if let Some(CacheValue::Product(detail)) = self.cache.cache.get(&key).await {
            debug!(slug, "Catalog cache hit");
            return Ok(detail);
        }

        let product = self
            .repo
            .get_by_slug(slug)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let detail = Arc::new(ProductDetail {
            summary: ProductSummary::from(&product),
            large_description: product.large_description.clone(),
            meta_title: product.meta_title.clone(),
            meta_description: product.meta_description.clone(),
            updated_at: product.updated_at,
            images: self.repo.images(product.id).await?,
            categories: self.repo.product_categories(product.id).await?,
            colors: self.repo.product_colors(product.id).await?,
            sizes: self.repo.product_sizes(product.id).await?,
            tags: self.repo.product_tags(product.id).await?,
        });

        self.cache
            .cache
            .insert(key, CacheValue::Product(Arc::clone(&detail)))
            .await;
        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_roundtrip_and_invalidate() {
        let cache = CatalogCache::default();
        let tags = Arc::new(Vec::<Tag>::new());
        cache
            .cache
            .insert(CacheKey::Tags, CacheValue::Tags(Arc::clone(&tags)))
            .await;

        assert!(matches!(
            cache.cache.get(&CacheKey::Tags).await,
            Some(CacheValue::Tags(_))
        ));
        assert!(cache.cache.get(&CacheKey::Colors).await.is_none());

        cache.invalidate_all();
        cache.cache.run_pending_tasks().await;
        assert!(cache.cache.get(&CacheKey::Tags).await.is_none());
    }
}
