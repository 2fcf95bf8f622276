//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod message;

pub use product::{Product, ProductError};
pub use order::{CancelPolicy, CheckoutDetails, DeliveryMethod, LifecyclePolicy, MissingDeliveryDate, Order, OrderError, OrderLine, OrderParts, OrderStatus, PaymentMethod, ReturnWindow};
pub use cart::{Cart, CartLine, CartTotals};
pub use message::{AdminMessage, MessageKind, MessageStatus, SupportThread};
