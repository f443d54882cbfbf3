pub mod order;

pub use order::{Delivery, Item, Order, Payment, ValidationError};
