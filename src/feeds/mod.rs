pub mod cache;
pub mod news;
pub mod price;

pub use cache::TtlCache;
pub use news::NewsFetcher;
pub use price::{map_ticker_to_pair, PriceFetcher};
