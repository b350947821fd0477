pub mod http;
pub mod xrates;

pub use http::HttpDocumentFetcher;
pub use xrates::{XRatesProvider, extract_rate};
