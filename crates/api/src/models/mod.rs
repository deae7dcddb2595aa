//! Domain models for the Souk API.
//!
//! Row types derive `sqlx::FromRow` and map one-to-one onto the tables in
//! `crates/api/migrations`. Response types are the JSON shapes returned by
//! the routes.

pub mod address;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod order;
pub mod payment;
pub mod security;
pub mod session;
pub mod user;

pub use address::{Address, AddressInput, AddressPatch};
pub use auth::{
    ChangePasswordRequest, EmailRequest, LoginRequest, LoginResponse, LogoutRequest,
    MessageResponse, PasswordResetConfirmRequest, RefreshRequest, RegisterRequest, TokenResponse,
};
pub use cart::{
    AddItemRequest, AppliedCoupon, ApplyCouponRequest, Cart, CartAdjustment, CartItem,
    CartTotals, CartView, Coupon, RemoveItemRequest, UpdateItemRequest,
};
pub use catalog::{
    Category, Color, Page, Product, ProductDetail, ProductFilter, ProductImage, ProductOrdering,
    ProductSummary, Size, Tag,
};
pub use order::{AddressSnapshot, Order, OrderAddress, OrderDetail, OrderItem, OrderSummary};
pub use payment::{
    CreatePaymentRequest, NewPaymentTransaction, PayPalReturnQuery, Payment, PaymentMethod,
    PaymentTransaction, PaymentView,
};
pub use security::NewSecurityAttempt;
pub use session::{ClientInfo, CurrentUser, SessionView, UserSession};
pub use user::{
    MeResponse, NewUser, ProfilePatch, ProfileResponse, User, UserPatch, UserProfile,
    UserResponse,
};
