//! HTTP 铸造中继客户端
//!
//! 把铸造调用以 JSON POST 到 `{endpoint}/mint`，中继负责签名、广播与等待确认。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reward_shared::config::MintConfig;
use tracing::{debug, instrument};

use super::gateway::{BadgeMinter, MintCall, MintError, MintReceipt};

/// HTTP 铸造网关
pub struct HttpMintGateway {
    client: reqwest::Client,
    endpoint: String,
    request_timeout: Duration,
}

impl HttpMintGateway {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, MintError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MintError::Unavailable(format!("HTTP 客户端创建失败: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    /// 按配置创建网关，未配置中继地址时返回 None
    pub fn from_config(config: &MintConfig) -> Result<Option<Self>, MintError> {
        match config.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => {
                Self::new(endpoint, config.request_timeout()).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn mint_url(&self) -> String {
        format!("{}/mint", self.endpoint)
    }
}

#[async_trait]
impl BadgeMinter for HttpMintGateway {
    #[instrument(skip(self, call), fields(to = %call.to_address, tier_index = call.tier_index))]
    async fn mint(&self, call: &MintCall) -> Result<MintReceipt, MintError> {
        let resp = self
            .client
            .post(self.mint_url())
            .json(call)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MintError::Timeout {
                        seconds: self.request_timeout.as_secs(),
                    }
                } else if e.is_connect() {
                    MintError::Unavailable(e.to_string())
                } else {
                    MintError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let receipt = resp
            .json::<MintReceipt>()
            .await
            .map_err(|e| MintError::Transport(format!("回执解析失败: {}", e)))?;

        debug!(
            token_id = receipt.token_id,
            tx = %receipt.transaction_reference,
            confirmed = receipt.confirmed,
            "Mint relay responded"
        );
        Ok(receipt)
    }
}

/// 非 2xx 响应分类：4xx 视为拒绝，其余视为中继不可用
fn classify_status(status: StatusCode, body: String) -> MintError {
    let detail = format!("HTTP {}: {}", status.as_u16(), body);
    if status.is_client_error() {
        MintError::Rejected(detail)
    } else {
        MintError::Unavailable(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_without_endpoint() {
        let config = MintConfig::default();
        assert!(HttpMintGateway::from_config(&config).unwrap().is_none());

        let blank = MintConfig {
            endpoint: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(HttpMintGateway::from_config(&blank).unwrap().is_none());
    }

    #[test]
    fn test_mint_url_trims_trailing_slash() {
        let gateway =
            HttpMintGateway::new("http://relay.local:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(gateway.mint_url(), "http://relay.local:8080/mint");
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad tier".to_string()),
            MintError::Rejected(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            MintError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_an_error() {
        // 保留端口，连接会立即被拒绝
        let gateway = HttpMintGateway::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let call = MintCall {
            to_address: "0xabc".to_string(),
            institution_name: "Test University".to_string(),
            tier_index: 0,
            certificate_count: 10,
            metadata_uri: "https://meta/0xabc/bronze.json".to_string(),
        };
        assert!(gateway.mint(&call).await.is_err());
    }
}
