pub mod client;
pub mod offers;
pub mod pricing;

pub use client::{Environment, HttpPriceEngine, PriceEngine, PriceEngineError};
