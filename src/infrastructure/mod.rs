pub mod fetch_client;
pub mod subprocess_predictor;
pub mod yahoo_client;

pub use fetch_client::{FetchClient, FetchClientConfig};
pub use subprocess_predictor::{SubprocessPredictor, SubprocessPredictorConfig};
pub use yahoo_client::{YahooClient, YahooConfig};
