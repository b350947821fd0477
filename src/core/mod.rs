//! Core business logic abstractions

pub mod context;
pub mod currency;
pub mod document;
pub mod error;
pub mod log;
pub mod normalize;
pub mod rate;

// Re-export main types for cleaner imports
pub use context::{Cancellation, FetchContext};
pub use currency::DayRateProvider;
pub use document::{Document, DocumentFetcher, FetchRequest};
pub use error::RateError;
pub use normalize::normalize;
pub use rate::{CurrencyPair, DailyRate, DateRange, RangeResult};
