pub mod error;
pub mod market_data;
pub mod quote;
pub mod schema;

pub mod test_support;

pub use error::DataError;
pub use market_data::{MarketData, SqliteMarketData};
pub use quote::{parse_quote_response, HttpQuoteSource, QuoteSource};
