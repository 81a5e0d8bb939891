pub mod binance;
pub mod coingecko;
pub mod cryptonews;
pub mod openai;
pub mod types;

pub use binance::BinanceClient;
pub use coingecko::CoinGeckoClient;
pub use cryptonews::{CryptoNewsClient, NewsQuery};
pub use openai::{ChatMessage, ChatModel, OpenAiClient};
pub use types::*;
