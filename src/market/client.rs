//! HTTP client for the rebalance-input and pool-info APIs.

use crate::config::{Config, ProjectConfig};
use crate::market::types::{ApiResponse, PoolInfo, RebalanceInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

/// Source of the external inputs of a rebalance run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Fetch thresholds and vault balances.
    async fn fetch_rebalance_input(&self) -> Result<RebalanceInput>;

    /// Fetch the pools a project currently reports.
    async fn fetch_project_pools(&self, project: &ProjectConfig) -> Result<Vec<PoolInfo>>;
}

/// Rebalance input client.
pub struct InputClient {
    http: Client,
    pool_url: String,
}

impl InputClient {
    /// Create a new client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.schedule.http_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            pool_url: config.pool.url.clone(),
        })
    }

    /// GET `url` and unwrap the `data` field of the response envelope.
    ///
    /// A non-success status or an absent `data` field is an error: the run
    /// must not proceed on fabricated inputs.
    async fn get_data<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let status = response.status();
        anyhow::ensure!(status.is_success(), "{} returned HTTP {}", url, status);

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;

        debug!(url, code = envelope.code, msg = %envelope.msg, "Response received");

        envelope
            .data
            .with_context(|| format!("Response from {} has no data: {}", url, envelope.msg))
    }
}

#[async_trait]
impl InputSource for InputClient {
    #[instrument(skip(self))]
    async fn fetch_rebalance_input(&self) -> Result<RebalanceInput> {
        self.get_data(&self.pool_url)
            .await
            .context("Failed to fetch rebalance input")
    }

    #[instrument(skip(self), fields(chain = %project.chain, project = %project.name))]
    async fn fetch_project_pools(&self, project: &ProjectConfig) -> Result<Vec<PoolInfo>> {
        self.get_data(&project.url)
            .await
            .with_context(|| format!("Failed to fetch pools of {}", project.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> InputClient {
        let mut config = Config::default();
        config.pool.url = format!("{}/rebalance/input", server.uri());
        InputClient::new(&config).unwrap()
    }

    fn project(server: &MockServer) -> ProjectConfig {
        ProjectConfig {
            chain: "bsc".to_string(),
            name: "pancake".to_string(),
            url: format!("{}/pools/pancake", server.uri()),
        }
    }

    #[tokio::test]
    async fn test_fetch_rebalance_input() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rebalance/input"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"code":200,"msg":"ok","data":{
                    "threshold":[{"tokenSymbol":"USDT","thresholdAmount":"100"}],
                    "vaultInfoList":[]}}"#,
            ))
            .mount(&server)
            .await;

        let input = client_for(&server).fetch_rebalance_input().await.unwrap();
        assert_eq!(input.thresholds.len(), 1);
        assert_eq!(input.thresholds[0].threshold_amount, dec!(100));
    }

    #[tokio::test]
    async fn test_missing_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rebalance/input"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"code":500,"msg":"db down"}"#),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_rebalance_input().await.unwrap_err();
        assert!(format!("{:#}", err).contains("db down"));
    }

    #[tokio::test]
    async fn test_fetch_project_pools() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pools/pancake"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"code":200,"data":[{"poolName":"USDT/ETH","apr":"0.3","tvl":"1000",
                    "rewardTokenList":[],"depositTokenList":[]}]}"#,
            ))
            .mount(&server)
            .await;

        let pools = client_for(&server)
            .fetch_project_pools(&project(&server))
            .await
            .unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].apr, dec!(0.3));
    }

    #[tokio::test]
    async fn test_http_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pools/pancake"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .fetch_project_pools(&project(&server))
            .await;
        assert!(result.is_err());
    }
}
