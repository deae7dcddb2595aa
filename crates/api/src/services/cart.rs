//! Cart operations on top of [`CartRepository`].
//!
//! Validates requests against the catalog and coupon rules; the repository
//! keeps the totals consistent.

use chrono::Utc;
use sqlx::PgPool;

use souk_core::UserId;

use crate::db::{CartOwner, CartRepository, CatalogRepository, RepositoryError};
use crate::error::{AppError, FieldErrors, Result};
use crate::models::{
    AddItemRequest, ApplyCouponRequest, Cart, CartView, RemoveItemRequest, UpdateItemRequest,
};

pub struct CartService<'a> {
    carts: CartRepository<'a>,
    catalog: CatalogRepository<'a>,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            carts: CartRepository::new(pool),
            catalog: CatalogRepository::new(pool),
        }
    }

    /// The owner's active cart, created on first use.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the lookup or insert fails.
    pub async fn current(&self, owner: CartOwner<'_>) -> Result<Cart> {
        Ok(self.carts.get_or_create_active(owner).await?)
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if a query fails.
    pub async fn view(&self, owner: CartOwner<'_>) -> Result<CartView> {
        let cart = self.current(owner).await?;
        Ok(self.carts.view(cart.id).await?)
    }

    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for an unknown or inactive product,
    /// color or size, and `AppError::Validation` for a quantity below one.
    pub async fn add_item(&self, owner: CartOwner<'_>, req: &AddItemRequest) -> Result<CartView> {
        if req.quantity < 1 {
            return Err(FieldErrors::single(
                "quantity",
                "Ensure this value is greater than or equal to 1.",
            ));
        }

        let product = self
            .catalog
            .get_active(req.product)
            .await?
            .ok_or_else(|| AppError::BadRequest("Product not found or not available".into()))?;
        if let Some(color) = req.color
            && self.catalog.get_color(color).await?.is_none()
        {
            return Err(AppError::BadRequest("Color not found".into()));
        }
        if let Some(size) = req.size
            && self.catalog.get_size(size).await?.is_none()
        {
            return Err(AppError::BadRequest("Size not found".into()));
        }

        let cart = self.current(owner).await?;
        self.carts
            .add_item(cart.id, &product, req.color, req.size, req.quantity)
            .await?;
        tracing::debug!(cart_id = %cart.id, product_id = %product.id, quantity = req.quantity, "Item added to cart");

        Ok(self.carts.view(cart.id).await?)
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the line is not in the owner's cart.
    pub async fn update_item(
        &self,
        owner: CartOwner<'_>,
        req: &UpdateItemRequest,
    ) -> Result<CartView> {
        if req.quantity < 0 {
            return Err(FieldErrors::single(
                "quantity",
                "Ensure this value is greater than or equal to 0.",
            ));
        }
        let cart = self.current(owner).await?;
        self.carts
            .set_quantity(cart.id, req.item_id, req.quantity)
            .await
            .map_err(item_not_found)?;
        Ok(self.carts.view(cart.id).await?)
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the line is not in the owner's cart.
    pub async fn remove_item(
        &self,
        owner: CartOwner<'_>,
        req: &RemoveItemRequest,
    ) -> Result<CartView> {
        let cart = self.current(owner).await?;
        self.carts
            .remove_item(cart.id, req.item_id)
            .await
            .map_err(item_not_found)?;
        Ok(self.carts.view(cart.id).await?)
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` if the transaction fails.
    pub async fn clear(&self, owner: CartOwner<'_>) -> Result<CartView> {
        let cart = self.current(owner).await?;
        self.carts.clear(cart.id).await?;
        Ok(self.carts.view(cart.id).await?)
    }

    /// Apply a coupon, replacing any coupon already on the cart.
    ///
    /// Usage limits count carts that were checked out with the coupon.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` when the code is unknown, outside its
    /// window, used up, or the cart is empty.
    pub async fn apply_coupon(
        &self,
        owner: CartOwner<'_>,
        req: &ApplyCouponRequest,
    ) -> Result<CartView> {
        if req.code.trim().is_empty() {
            return Err(FieldErrors::single("code", "This field is required."));
        }

        let coupon = self
            .carts
            .find_coupon(&req.code)
            .await?
            .filter(|c| c.is_live(Utc::now()))
            .ok_or_else(|| AppError::BadRequest("Invalid or expired coupon code".into()))?;

        let user_id = match owner {
            CartOwner::User(id) => Some(id),
            CartOwner::Guest(_) => None,
        };
        let (total, by_user) = self.carts.coupon_redemptions(coupon.id, user_id).await?;
        if coupon.max_uses.is_some_and(|max| total >= i64::from(max)) {
            return Err(AppError::BadRequest("Coupon usage limit reached".into()));
        }
        if user_id.is_some()
            && coupon
                .max_uses_per_user
                .is_some_and(|max| by_user >= i64::from(max))
        {
            return Err(AppError::BadRequest(
                "You have already used this coupon".into(),
            ));
        }

        let cart = self.current(owner).await?;
        if self.carts.items(cart.id).await?.is_empty() {
            return Err(AppError::BadRequest("Cart is empty".into()));
        }
        self.carts.apply_coupon(cart.id, &coupon).await?;
        tracing::info!(cart_id = %cart.id, code = %coupon.code, "Coupon applied");

        Ok(self.carts.view(cart.id).await?)
    }

    /// # Errors
    ///
    /// Returns `AppError::BadRequest` when no coupon is applied.
    pub async fn remove_coupon(&self, owner: CartOwner<'_>) -> Result<CartView> {
        let cart = self.current(owner).await?;
        if !self.carts.remove_coupon(cart.id).await? {
            return Err(AppError::BadRequest("No coupon applied".into()));
        }
        Ok(self.carts.view(cart.id).await?)
    }

    /// Fold the guest cart identified by `session_key` into the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the merge fails.
    pub async fn merge(&self, user_id: UserId, session_key: &str) -> Result<CartView> {
        let guest = self.carts.find_active(CartOwner::Guest(session_key)).await?;
        let cart_id = match guest {
            Some(guest) => {
                let merged = self.carts.merge_guest_cart(guest.id, user_id).await?;
                tracing::info!(user_id = %user_id, guest_cart = %guest.id, cart_id = %merged, "Guest cart merged");
                merged
            }
            None => self.current(CartOwner::User(user_id)).await?.id,
        };
        Ok(self.carts.view(cart_id).await?)
    }
}

fn item_not_found(e: RepositoryError) -> AppError {
    match e {
        RepositoryError::NotFound => AppError::NotFound("Cart item not found".into()),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_line_maps_to_not_found() {
        let err = item_not_found(RepositoryError::NotFound);
        assert!(matches!(err, AppError::NotFound(ref m) if m == "Cart item not found"));
        assert!(matches!(
            item_not_found(RepositoryError::Conflict("x".into())),
            AppError::Database(RepositoryError::Conflict(_))
        ));
    }
}
