//! Product catalog route handlers.
//!
//! All catalog reads are public. Taxonomy lists and product pages are served
//! from the in-process catalog cache.

use std::sync::Arc;

use axum::{Json, extract::State};
use tracing::instrument;

use crate::db::RepositoryError;
use crate::error::{AppError, Result};
use crate::extract::{ApiPath, ApiQuery};
use crate::models::{
    Category, Color, Page, ProductDetail, ProductFilter, ProductSummary, Size, Tag,
};
use crate::services::catalog::CatalogService;
use crate::state::AppState;

fn service(state: &AppState) -> CatalogService<'_> {
    CatalogService::new(state.pool(), state.catalog_cache())
}

/// Filtered, paginated product listing.
#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ProductFilter>,
) -> Result<Json<Page<ProductSummary>>> {
    Ok(Json(service(&state).list_products(&filter).await?))
}

#[instrument(skip(state))]
pub async fn detail(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<Arc<ProductDetail>>> {
    let product = service(&state).product(&slug).await.map_err(|e| match e {
        RepositoryError::NotFound => AppError::NotFound("Product not found".into()),
        other => other.into(),
    })?;
    Ok(Json(product))
}

pub async fn categories(State(state): State<AppState>) -> Result<Json<Arc<Vec<Category>>>> {
    Ok(Json(service(&state).categories().await?))
}

pub async fn colors(State(state): State<AppState>) -> Result<Json<Arc<Vec<Color>>>> {
    Ok(Json(service(&state).colors().await?))
}

/// Sizes in display order (`sort_order`, then name).
pub async fn sizes(State(state): State<AppState>) -> Result<Json<Arc<Vec<Size>>>> {
    Ok(Json(service(&state).sizes().await?))
}

pub async fn tags(State(state): State<AppState>) -> Result<Json<Arc<Vec<Tag>>>> {
    Ok(Json(service(&state).tags().await?))
}
