//! Aggregates module
pub mod product;
pub mod category;
pub mod order;
pub mod cart;
pub mod wishlist;
pub mod user;
pub mod review;
pub mod payment;

pub use product::{Dimensions, ImageRef, Product, ProductError, ProductStatus, ProductView, RatingSummary, ShippingInfo, Specification};
pub use category::Category;
pub use order::{Address, LineItem, Order, OrderError, OrderStatus, PaymentStatus, TrackingEvent};
pub use cart::{Cart, CartError, CartItem};
pub use wishlist::{Wishlist, WishlistItem};
pub use user::{NotificationPreferences, Role, User, UserProfile};
pub use review::Review;
pub use payment::{Payment, PaymentIntentStatus};
