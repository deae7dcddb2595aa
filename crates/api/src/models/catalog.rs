//! Product catalog models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use souk_core::{
    CategoryId, ColorId, ProductId, ProductImageId, SizeId, TagId, markdown_percentage,
};

/// Default number of products per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Upper bound on `page_size`.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Color {
    pub id: ColorId,
    pub name: String,
    pub hex_code: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Size {
    pub id: SizeId,
    pub name: String,
    pub abbreviation: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductImage {
    pub id: ProductImageId,
    #[serde(skip)]
    pub product_id: ProductId,
    pub image_url: String,
    pub alt_text: String,
    pub is_primary: bool,
    pub sort_order: i32,
}

/// A `products` row plus its primary image URL.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub small_description: String,
    pub large_description: String,
    pub price: Decimal,
    pub compare_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub is_featured: bool,
    pub is_active: bool,
    pub meta_title: String,
    pub meta_description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Primary image, falling back to the first image by sort order.
    pub primary_image: Option<String>,
}

impl Product {
    #[must_use]
    pub const fn is_in_stock(&self) -> bool {
        self.stock_quantity > 0
    }

    #[must_use]
    pub fn is_on_sale(&self) -> bool {
        self.compare_price.is_some_and(|compare| compare > self.price)
    }

    #[must_use]
    pub fn discount_percentage(&self) -> u32 {
        markdown_percentage(self.price, self.compare_price)
    }
}

/// Product as shown in listings.
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub small_description: String,
    pub price: Decimal,
    pub compare_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub is_featured: bool,
    pub is_in_stock: bool,
    pub is_on_sale: bool,
    pub discount_percentage: u32,
    pub primary_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            slug: p.slug.clone(),
            sku: p.sku.clone(),
            small_description: p.small_description.clone(),
            price: p.price,
            compare_price: p.compare_price,
            stock_quantity: p.stock_quantity,
            is_featured: p.is_featured,
            is_in_stock: p.is_in_stock(),
            is_on_sale: p.is_on_sale(),
            discount_percentage: p.discount_percentage(),
            primary_image: p.primary_image.clone(),
            created_at: p.created_at,
        }
    }
}

/// Product detail page payload.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub summary: ProductSummary,
    pub large_description: String,
    pub meta_title: String,
    pub meta_description: String,
    pub updated_at: DateTime<Utc>,
    pub images: Vec<ProductImage>,
    pub categories: Vec<Category>,
    pub colors: Vec<Color>,
    pub sizes: Vec<Size>,
    pub tags: Vec<Tag>,
}

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductOrdering {
    PriceAsc,
    PriceDesc,
    NameAsc,
    NameDesc,
    #[default]
    Newest,
    Oldest,
}

impl ProductOrdering {
    /// SQL `ORDER BY` clause. Ties break on id so pages are stable.
    #[must_use]
    pub const fn order_by(self) -> &'static str {
        match self {
            Self::PriceAsc => "p.price ASC, p.id ASC",
            Self::PriceDesc => "p.price DESC, p.id DESC",
            Self::NameAsc => "p.name ASC, p.id ASC",
            Self::NameDesc => "p.name DESC, p.id DESC",
            Self::Newest => "p.created_at DESC, p.id DESC",
            Self::Oldest => "p.created_at ASC, p.id ASC",
        }
    }
}

/// Query string of `GET /api/v1/products/`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductFilter {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Category slug.
    pub category: Option<String>,
    /// Color name, case-insensitive.
    pub color: Option<String>,
    /// Size name, case-insensitive.
    pub size: Option<String>,
    /// Tag slug.
    pub tag: Option<String>,
    pub featured: Option<bool>,
    pub in_stock: Option<bool>,
    pub on_sale: Option<bool>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub search: Option<String>,
    pub ordering: Option<ProductOrdering>,
}

impl ProductFilter {
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(self.page_size())
    }

    /// Trimmed search term, `None` when blank.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(results: Vec<T>, count: i64, page: u32, page_size: u32) -> Self {
        let count = count.max(0);
        let size = i64::from(page_size.max(1));
        let total_pages = u32::try_from((count + size - 1) / size).unwrap_or(u32::MAX);
        Self {
            count,
            page,
            page_size,
            total_pages,
            next: page.checked_add(1).filter(|next| *next <= total_pages),
            previous: (page > 1).then(|| page - 1),
            results,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn product(price: &str, compare: Option<&str>, stock: i32) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(1),
            name: "Linen shirt".into(),
            slug: "linen-shirt".into(),
            sku: "LS-001".into(),
            small_description: String::new(),
            large_description: String::new(),
            price: Decimal::from_str(price).unwrap(),
            compare_price: compare.map(|c| Decimal::from_str(c).unwrap()),
            stock_quantity: stock,
            is_featured: false,
            is_active: true,
            meta_title: String::new(),
            meta_description: String::new(),
            created_at: now,
            updated_at: now,
            primary_image: None,
        }
    }

    #[test]
    fn test_derived_sale_fields() {
        let p = product("59.99", Some("89.99"), 3);
        assert!(p.is_on_sale());
        assert!(p.is_in_stock());
        assert_eq!(p.discount_percentage(), 33);

        let summary = ProductSummary::from(&p);
        assert!(summary.is_on_sale);
        assert_eq!(summary.discount_percentage, 33);
    }

    #[test]
    fn test_compare_price_below_price_is_not_a_sale() {
        let p = product("50.00", Some("40.00"), 0);
        assert!(!p.is_on_sale());
        assert!(!p.is_in_stock());
        assert_eq!(p.discount_percentage(), 0);
    }

    #[test]
    fn test_filter_clamps_paging() {
        let filter = ProductFilter {
            page: Some(0),
            page_size: Some(500),
            ..ProductFilter::default()
        };
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.page_size(), MAX_PAGE_SIZE);
        assert_eq!(filter.offset(), 0);

        let filter = ProductFilter {
            page: Some(3),
            ..ProductFilter::default()
        };
        assert_eq!(filter.offset(), 40);
    }

    #[test]
    fn test_ordering_parses_snake_case() {
        let ordering: ProductOrdering = serde_json::from_str(r#""price_desc""#).unwrap();
        assert_eq!(ordering, ProductOrdering::PriceDesc);
        assert!(serde_json::from_str::<ProductOrdering>(r#""popular""#).is_err());
    }

    #[test]
    fn test_page_links() {
        let page = Page::new(vec![1, 2], 45, 2, 20);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));

        let empty: Page<u8> = Page::new(vec![], 0, 1, 20);
        assert_eq!(empty.total_pages, 0);
        assert!(empty.next.is_none());
        assert!(empty.previous.is_none());
    }

    #[test]
    fn test_page_far_past_the_end() {
        let page: Page<u8> = Page::new(vec![], 3, u32::MAX, 20);
        assert_eq!(page.total_pages, 1);
        assert!(page.next.is_none());
        assert_eq!(page.previous, Some(u32::MAX - 1));

        let filter = ProductFilter {
            page: Some(u32::MAX),
            page_size: Some(MAX_PAGE_SIZE),
            ..ProductFilter::default()
        };
        assert_eq!(
            filter.offset(),
            i64::from(u32::MAX - 1) * i64::from(MAX_PAGE_SIZE)
        );
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let filter = ProductFilter {
            search: Some("   ".into()),
            ..ProductFilter::default()
        };
        assert!(filter.search_term().is_none());
    }
}
