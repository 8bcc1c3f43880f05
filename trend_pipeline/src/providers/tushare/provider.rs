use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use shared_utils::env::get_env_var;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    config::ProviderConfig,
    models::{BatchRequest, CalendarRequest, ChangeRow, SingleRequest},
    providers::{
        ApiSnafu, CalendarProvider, ClientBuildSnafu, MalformedSnafu, MarketDataProvider,
        MissingEnvVarSnafu, ProviderError, ProviderInitError, RateLimitedSnafu, ReqwestSnafu,
        is_rate_limit_message,
        tushare::{
            params::{
                DAILY, DAILY_FIELDS, RpcRequest, TRADE_CAL, TRADE_CAL_FIELDS, daily_batch_params,
                daily_single_params, trade_cal_params,
            },
            response::{RpcResponse, RpcTable},
        },
    },
};

pub struct TushareProvider {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl TushareProvider {
    /// Creates a new provider.
    ///
    /// Reads the API token from the environment variable named by
    /// `config.token_env` (`TUSHARE_TOKEN` by default).
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderInitError> {
        let token = get_env_var(&config.token_env).context(MissingEnvVarSnafu)?;
        Self::with_token(&config.base_url, SecretString::new(token.into()))
    }

    /// Creates a provider with an explicit token.
    pub fn with_token(base_url: &str, token: SecretString) -> Result<Self, ProviderInitError> {
        // Per-call deadlines are enforced by the pipeline, not the client.
        let client = Client::builder().build().context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            token,
        })
    }

    async fn call(
        &self,
        api_name: &str,
        params: Value,
        fields: &str,
    ) -> Result<RpcTable, ProviderError> {
        let body = RpcRequest {
            api_name,
            token: self.token.expose_secret(),
            params,
            fields,
        };

        debug!(api_name, "provider call");
        let response = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .context(ReqwestSnafu)?;

        let status = response.status();
        let text = response.text().await.context(ReqwestSnafu)?;
        check_status(status, text.as_str())?;

        let rpc: RpcResponse = serde_json::from_str(&text).map_err(|e| {
            MalformedSnafu {
                message: format!("{api_name}: {e}"),
            }
            .build()
        })?;

        if rpc.code != 0 {
            let message = rpc.msg.unwrap_or_default();
            if is_rate_limit_message(&message) {
                return RateLimitedSnafu { message }.fail();
            }
            return ApiSnafu {
                code: rpc.code,
                message,
            }
            .fail();
        }

        rpc.data.ok_or_else(|| {
            MalformedSnafu {
                message: format!("{api_name}: response has no data"),
            }
            .build()
        })
    }
}

/// Maps a non-2xx reply onto [`ProviderError`]. Quota messages count as rate
/// limiting whatever the status code.
fn check_status(status: StatusCode, body: &str) -> Result<(), ProviderError> {
    let quota = !status.is_success() && is_rate_limit_message(body);
    if status == StatusCode::TOO_MANY_REQUESTS || quota {
        return RateLimitedSnafu { message: body }.fail();
    }
    if !status.is_success() {
        return ApiSnafu {
            code: i64::from(status.as_u16()),
            message: body,
        }
        .fail();
    }
    Ok(())
}

fn malformed(api_name: &str, message: String) -> ProviderError {
    MalformedSnafu {
        message: format!("{api_name}: {message}"),
    }
    .build()
}

#[async_trait]
impl CalendarProvider for TushareProvider {
    async fn open_days(
        &self,
        request: &CalendarRequest,
    ) -> Result<Vec<chrono::NaiveDate>, ProviderError> {
        let table = self
            .call(TRADE_CAL, trade_cal_params(request), TRADE_CAL_FIELDS)
            .await?;
        table
            .into_open_days()
            .map_err(|m| malformed(TRADE_CAL, m))
    }
}

#[async_trait]
impl MarketDataProvider for TushareProvider {
    async fn daily_changes(&self, request: &BatchRequest) -> Result<Vec<ChangeRow>, ProviderError> {
        let table = self
            .call(DAILY, daily_batch_params(request), DAILY_FIELDS)
            .await?;
        table.into_change_rows().map_err(|m| malformed(DAILY, m))
    }

    async fn daily_change(
        &self,
        request: &SingleRequest,
    ) -> Result<Option<ChangeRow>, ProviderError> {
        let table = self
            .call(DAILY, daily_single_params(request), DAILY_FIELDS)
            .await?;
        let rows = table.into_change_rows().map_err(|m| malformed(DAILY, m))?;
        Ok(rows
            .into_iter()
            .find(|r| r.ts_code == request.ts_code && r.trade_date == request.date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_body_on_error_status_is_rate_limited() {
        let body = "抱歉，您每分钟最多访问该接口500次";
        for status in [StatusCode::FORBIDDEN, StatusCode::INTERNAL_SERVER_ERROR] {
            let err = check_status(status, body).unwrap_err();
            assert!(err.is_rate_limited(), "{status}: {err}");
        }
        assert!(check_status(StatusCode::TOO_MANY_REQUESTS, "").unwrap_err().is_rate_limited());
    }

    #[test]
    fn other_error_statuses_are_api_errors() {
        let err = check_status(StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        assert!(matches!(err, ProviderError::Api { code: 502, .. }), "{err}");
        assert!(check_status(StatusCode::OK, "{}").is_ok());
    }
}
