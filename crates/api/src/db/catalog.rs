//! Read-only catalog queries.
//!
//! Product listings are assembled with `sqlx::QueryBuilder` so every filter
//! is a bound parameter.

use sqlx::{PgPool, Postgres, QueryBuilder};

use souk_core::{ColorId, ProductId, SizeId};

use super::RepositoryError;
use crate::models::{Category, Color, Product, ProductFilter, ProductImage, Size, Tag};

const PRODUCT_SELECT: &str = r"
    SELECT p.id, p.name, p.slug, p.sku, p.small_description, p.large_description,
           p.price, p.compare_price, p.stock_quantity, p.is_featured, p.is_active,
           p.meta_title, p.meta_description, p.created_at, p.updated_at,
           (SELECT pi.image_url FROM product_images pi
            WHERE pi.product_id = p.id
            ORDER BY pi.is_primary DESC, pi.sort_order, pi.id
            LIMIT 1) AS primary_image
    FROM products p
";

/// Escape `%`, `_` and `\` so user input matches literally inside `ILIKE`.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE p.is_active");

    if let Some(slug) = filter.category.as_deref() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM product_categories pc \
             JOIN categories c ON c.id = pc.category_id \
             WHERE pc.product_id = p.id AND c.is_active AND c.slug = ",
        )
        .push_bind(slug.to_owned())
        .push(")");
    }
    if let Some(color) = filter.color.as_deref() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM product_colors pco \
             JOIN colors co ON co.id = pco.color_id \
             WHERE pco.product_id = p.id AND co.is_active AND lower(co.name) = lower(",
        )
        .push_bind(color.to_owned())
        .push("))");
    }
    if let Some(size) = filter.size.as_deref() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM product_sizes ps \
             JOIN sizes s ON s.id = ps.size_id \
             WHERE ps.product_id = p.id AND s.is_active AND lower(s.name) = lower(",
        )
        .push_bind(size.to_owned())
        .push("))");
    }
    if let Some(tag) = filter.tag.as_deref() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM product_tags pt \
             JOIN tags t ON t.id = pt.tag_id \
             WHERE pt.product_id = p.id AND t.is_active AND t.slug = ",
        )
        .push_bind(tag.to_owned())
        .push(")");
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND p.is_featured = ").push_bind(featured);
    }
    match filter.in_stock {
        Some(true) => {
            qb.push(" AND p.stock_quantity > 0");
        }
        Some(false) => {
            qb.push(" AND p.stock_quantity = 0");
        }
        None => {}
    }
    match filter.on_sale {
        Some(true) => {
            qb.push(" AND p.compare_price IS NOT NULL AND p.compare_price > p.price");
        }
        Some(false) => {
            qb.push(" AND (p.compare_price IS NULL OR p.compare_price <= p.price)");
        }
        None => {}
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND p.price <= ").push_bind(max);
    }
    if let Some(term) = filter.search_term() {
        let pattern = like_pattern(term);
        qb.push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.small_description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.large_description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.sku ILIKE ")
            .push_bind(pattern.clone())
            .push(
                " OR EXISTS (SELECT 1 FROM product_tags pt2 \
                 JOIN tags t2 ON t2.id = pt2.tag_id \
                 WHERE pt2.product_id = p.id AND t2.name ILIKE ",
            )
            .push_bind(pattern)
            .push("))");
    }
}

/// Repository for products and their taxonomy.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// One page of active products plus the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either query fails.
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<(Vec<Product>, i64), RepositoryError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
        push_filters(&mut count_qb, filter);
        let count: i64 = count_qb.build_query_scalar().fetch_one(self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(PRODUCT_SELECT);
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY ")
            .push(filter.ordering.unwrap_or_default().order_by())
            .push(" LIMIT ")
            .push_bind(i64::from(filter.page_size()))
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let products = qb.build_query_as::<Product>().fetch_all(self.pool).await?;
        Ok((products, count))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "{PRODUCT_SELECT} WHERE p.slug = $1 AND p.is_active"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;
        Ok(product)
    }

    /// Active product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "{PRODUCT_SELECT} WHERE p.id = $1 AND p.is_active"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(product)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn images(&self, product_id: ProductId) -> Result<Vec<ProductImage>, RepositoryError> {
        let images = sqlx::query_as::<_, ProductImage>(
            r"
            SELECT id, product_id, image_url, alt_text, is_primary, sort_order
            FROM product_images WHERE product_id = $1
            ORDER BY is_primary DESC, sort_order, id
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;
        Ok(images)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn product_categories(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, Category>(
            r"
            SELECT c.id, c.name, c.slug, c.description
            FROM categories c JOIN product_categories pc ON pc.category_id = c.id
            WHERE pc.product_id = $1 AND c.is_active
            ORDER BY c.name
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn product_colors(&self, product_id: ProductId) -> Result<Vec<Color>, RepositoryError> {
        let rows = sqlx::query_as::<_, Color>(
            r"
            SELECT co.id, co.name, co.hex_code
            FROM colors co JOIN product_colors pc ON pc.color_id = co.id
            WHERE pc.product_id = $1 AND co.is_active
            ORDER BY co.name
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn product_sizes(&self, product_id: ProductId) -> Result<Vec<Size>, RepositoryError> {
        let rows = sqlx::query_as::<_, Size>(
            r"
            SELECT s.id, s.name, s.abbreviation, s.sort_order
            FROM sizes s JOIN product_sizes ps ON ps.size_id = s.id
            WHERE ps.product_id = $1 AND s.is_active
            ORDER BY s.sort_order, s.name
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn product_tags(&self, product_id: ProductId) -> Result<Vec<Tag>, RepositoryError> {
        let rows = sqlx::query_as::<_, Tag>(
            r"
            SELECT t.id, t.name, t.slug
            FROM tags t JOIN product_tags pt ON pt.tag_id = t.id
            WHERE pt.product_id = $1 AND t.is_active
            ORDER BY t.name
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT id, name, slug, description FROM categories WHERE is_active ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn colors(&self) -> Result<Vec<Color>, RepositoryError> {
        let rows = sqlx::query_as::<_, Color>(
            "SELECT id, name, hex_code FROM colors WHERE is_active ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sizes(&self) -> Result<Vec<Size>, RepositoryError> {
        let rows = sqlx::query_as::<_, Size>(
            "SELECT id, name, abbreviation, sort_order FROM sizes WHERE is_active ORDER BY sort_order, name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn tags(&self) -> Result<Vec<Tag>, RepositoryError> {
        let rows = sqlx::query_as::<_, Tag>(
            "SELECT id, name, slug FROM tags WHERE is_active ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_color(&self, id: ColorId) -> Result<Option<Color>, RepositoryError> {
        let row = sqlx::query_as::<_, Color>(
            "SELECT id, name, hex_code FROM colors WHERE id = $1 AND is_active",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_size(&self, id: SizeId) -> Result<Option<Size>, RepositoryError> {
        let row = sqlx::query_as::<_, Size>(
            "SELECT id, name, abbreviation, sort_order FROM sizes WHERE id = $1 AND is_active",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductOrdering;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("shirt"), "%shirt%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_filters_render_bound_parameters() {
        let filter = ProductFilter {
            category: Some("shirts".into()),
            color: Some("Navy".into()),
            on_sale: Some(true),
            search: Some("linen".into()),
            ..ProductFilter::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
        push_filters(&mut qb, &filter);
        let sql = qb.sql();

        assert!(sql.contains("c.slug = $1"));
        assert!(sql.contains("lower(co.name) = lower($2)"));
        assert!(sql.contains("p.compare_price > p.price"));
        assert!(sql.contains("t2.name ILIKE $7"));
        assert!(!sql.contains("linen"));
    }

    #[test]
    fn test_no_filters_only_restricts_active() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
        push_filters(&mut qb, &ProductFilter::default());
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM products p WHERE p.is_active");
        assert_eq!(
            ProductOrdering::default().order_by(),
            "p.created_at DESC, p.id DESC"
        );
    }
}
