//! Elasticsearch 결과 저장소 싱크
//!
//! 결과 하나당 문서 하나를 `POST /{index}/_doc`로 색인합니다.
//! [`ElasticsearchSink::ensure_index`]는 파이프라인 시작 전에 인덱스가 없으면 생성합니다.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{debug, info};

use icsguard_core::config::ResultStoreConfig;
use icsguard_core::error::DispatchError;
use icsguard_core::pipeline::BoxFuture;
use icsguard_core::types::ScoreResult;

use super::{ResultDocument, ResultSink};

const SINK_NAME: &str = "elasticsearch";
/// 에러 메시지에 포함할 응답 본문 최대 길이
const MAX_ERROR_BODY: usize = 256;

fn sink_error(reason: impl Into<String>) -> DispatchError {
    DispatchError::Sink {
        sink: SINK_NAME.to_owned(),
        reason: reason.into(),
    }
}

/// Elasticsearch 싱크
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    client: Client,
    base_url: String,
    index: String,
}

impl ElasticsearchSink {
    pub fn new(config: &ResultStoreConfig) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| sink_error(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
            index: config.index.clone(),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.base_url, self.index)
    }

    fn document_url(&self) -> String {
        format!("{}/{}/_doc", self.base_url, self.index)
    }

    /// 인덱스가 없으면 생성합니다. 새로 만들었으면 `true`입니다.
    pub async fn ensure_index(&self) -> Result<bool, DispatchError> {
        let url = self.index_url();
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| sink_error(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                debug!(index = %self.index, "result index exists");
                Ok(false)
            }
            StatusCode::NOT_FOUND => {
                let mapping = json!({
                    "mappings": {
                        "properties": {
                            "timestamp": { "type": "date" },
                            "is_anomaly": { "type": "boolean" },
                            "features": { "type": "object" }
                        }
                    }
                });
                let response = self
                    .client
                    .put(&url)
                    .json(&mapping)
                    .send()
                    .await
                    .map_err(|e| sink_error(e.to_string()))?;
                check_status(response).await?;
                info!(index = %self.index, "result index created");
                Ok(true)
            }
            status => Err(sink_error(format!("index check returned HTTP {status}"))),
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), DispatchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(sink_error(format!("HTTP {status}: {body}")))
}

impl ResultSink for ElasticsearchSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    fn publish<'a>(&'a self, result: &'a ScoreResult) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.document_url())
                .json(&ResultDocument::new(result))
                .send()
                .await
                .map_err(|e| sink_error(e.to_string()))?;
            check_status(response).await
        })
    }
}
