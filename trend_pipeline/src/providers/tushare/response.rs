use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::models::ChangeRow;

/// Top-level RPC answer.
#[derive(Deserialize, Debug)]
pub struct RpcResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<RpcTable>,
}

/// Column names plus row arrays.
#[derive(Deserialize, Debug, Default)]
pub struct RpcTable {
    pub fields: Vec<String>,
    #[serde(default)]
    pub items: Vec<Vec<Value>>,
}

impl RpcTable {
    /// Rows keyed by column name, in column order.
    pub fn records(&self) -> impl Iterator<Item = IndexMap<&str, &Value>> + '_ {
        self.items.iter().map(|row| {
            self.fields
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
    }

    fn require(&self, column: &str) -> Result<(), String> {
        if self.fields.iter().any(|f| f == column) {
            Ok(())
        } else {
            Err(format!("missing column '{column}'"))
        }
    }

    /// Open days from a `trade_cal` table.
    ///
    /// Rows with `is_open` other than 1 are skipped in case the endpoint
    /// ignores the filter; rows with unparsable dates are dropped.
    pub fn into_open_days(self) -> Result<Vec<NaiveDate>, String> {
        self.require("cal_date")?;
        let mut days: Vec<NaiveDate> = self
            .records()
            .filter(|r| r.get("is_open").is_none_or(|v| as_i64(v) == Some(1)))
            .filter_map(|r| r.get("cal_date").and_then(|v| as_date(v)))
            .collect();
        days.sort_unstable();
        days.dedup();
        Ok(days)
    }

    /// Percentage-change rows from a `daily` table. Rows with a null change are skipped.
    pub fn into_change_rows(self) -> Result<Vec<ChangeRow>, String> {
        for column in ["ts_code", "trade_date", "pct_chg"] {
            self.require(column)?;
        }
        Ok(self
            .records()
            .filter_map(|r| {
                Some(ChangeRow {
                    ts_code: r.get("ts_code")?.as_str()?.to_string(),
                    trade_date: as_date(r.get("trade_date")?)?,
                    pct_chg: r.get("pct_chg")?.as_f64()?,
                })
            })
            .collect())
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_date(v: &Value) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(v.as_str()?, "%Y%m%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_trade_calendar() {
        let raw = r#"{
            "code": 0, "msg": "",
            "data": {
                "fields": ["exchange", "cal_date", "is_open"],
                "items": [
                    ["SSE", "20251010", 1],
                    ["SSE", "20251009", "1"],
                    ["SSE", "20251008", 0],
                    ["SSE", "garbage", 1]
                ]
            }
        }"#;
        let resp: RpcResponse = serde_json::from_str(raw).unwrap();
        let days = resp.data.unwrap().into_open_days().unwrap();
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2025, 10, 9).unwrap(),
                NaiveDate::from_ymd_opt(2025, 10, 10).unwrap(),
            ]
        );
    }

    #[test]
    fn decodes_daily_rows_and_skips_nulls() {
        let raw = r#"{
            "code": 0,
            "data": {
                "fields": ["ts_code", "trade_date", "pct_chg"],
                "items": [
                    ["600519.SH", "20251009", -1.23],
                    ["000001.SZ", "20251009", 0.5],
                    ["000001.SZ", "20251010", null]
                ]
            }
        }"#;
        let resp: RpcResponse = serde_json::from_str(raw).unwrap();
        let rows = resp.data.unwrap().into_change_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ts_code, "600519.SH");
        assert_eq!(rows[0].pct_chg, -1.23);
    }

    #[test]
    fn missing_column_is_reported() {
        let table = RpcTable {
            fields: vec!["ts_code".into(), "trade_date".into()],
            items: vec![],
        };
        let err = table.into_change_rows().unwrap_err();
        assert!(err.contains("pct_chg"));
    }

    #[test]
    fn error_envelope_without_data() {
        let raw = r#"{"code": 40203, "msg": "抱歉，您每分钟最多访问该接口500次", "data": null}"#;
        let resp: RpcResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.code, 40203);
        assert!(resp.data.is_none());
    }
}
