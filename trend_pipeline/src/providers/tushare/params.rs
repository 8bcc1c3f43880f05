use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    dates::to_compact,
    models::{BatchRequest, CalendarRequest, SingleRequest},
};

/// Calendar endpoint name.
pub const TRADE_CAL: &str = "trade_cal";
/// Daily quotes endpoint name.
pub const DAILY: &str = "daily";

/// Columns requested from `trade_cal`.
pub const TRADE_CAL_FIELDS: &str = "exchange,cal_date,is_open";
/// Columns requested from `daily`.
pub const DAILY_FIELDS: &str = "ts_code,trade_date,pct_chg";

/// Request envelope posted to the RPC endpoint.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub api_name: &'a str,
    pub token: &'a str,
    pub params: Value,
    pub fields: &'a str,
}

/// `trade_cal` parameters; only open days are requested.
pub fn trade_cal_params(request: &CalendarRequest) -> Value {
    json!({
        "exchange": request.exchange,
        "start_date": to_compact(request.start),
        "end_date": to_compact(request.end),
        "is_open": "1",
    })
}

/// `daily` parameters for several codes over a range.
pub fn daily_batch_params(request: &BatchRequest) -> Value {
    json!({
        "ts_code": request.ts_codes.join(","),
        "start_date": to_compact(request.start),
        "end_date": to_compact(request.end),
    })
}

/// `daily` parameters for one code on one day.
pub fn daily_single_params(request: &SingleRequest) -> Value {
    json!({
        "ts_code": request.ts_code,
        "trade_date": to_compact(request.date),
    })
}
