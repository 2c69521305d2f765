pub mod aggregate;
pub mod offers;

pub use aggregate::{PriceBook, build_rows, sku_discount};
pub use offers::{DuplicatePolicy, OfferProcessor};
