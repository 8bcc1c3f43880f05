//! Client for Tushare-style JSON RPC endpoints.
//!
//! Every call is a `POST` of `{ api_name, token, params, fields }` to a single
//! URL; the answer is `{ code, msg, data: { fields, items } }`, a column list
//! plus row arrays. `trade_cal` backs [`CalendarProvider`](super::CalendarProvider)
//! and `daily` backs [`MarketDataProvider`](super::MarketDataProvider).

pub mod params;
pub mod provider;
pub mod response;

pub use provider::TushareProvider;
