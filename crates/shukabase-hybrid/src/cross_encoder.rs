//! HTTP client for an external `/v1/rerank` cross-encoder service.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use shukabase_core::config::RerankerSettings;
use shukabase_core::traits::CrossEncoder;
use shukabase_core::Error;

const DEFAULT_MODEL: &str = "jinaai/jina-reranker-v2-base-multilingual";

pub struct HttpCrossEncoder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

/// Normalised services report `relevance_score`; raw ones report a logit `score`.
#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    #[serde(default)]
    relevance_score: Option<f32>,
    #[serde(default)]
    score: Option<f32>,
}

impl HttpCrossEncoder {
    /// `Ok(None)` when no service is configured. A configured key variable
    /// that is unset is a configuration error.
    pub fn from_settings(settings: &RerankerSettings) -> shukabase_core::Result<Option<Self>> {
        let Some(base_url) = settings.base_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        let api_key = match &settings.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| Error::InvalidConfig(format!("reranker key variable {var} is not set")))?),
            None => None,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("reranker client: {e}")))?;
        Ok(Some(Self {
            client,
            endpoint: format!("{}/v1/rerank", base_url.trim_end_matches('/')),
            model: settings.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
        }))
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score(&self, query: &str, documents: &[String]) -> anyhow::Result<Vec<f32>> {
        if documents.is_empty() { return Ok(vec![]); }
        let body = RerankRequest { model: &self.model, query, documents, top_n: documents.len() };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key { request = request.bearer_auth(key); }

        let response = request.send().await.context("reranker request failed")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("reranker returned HTTP {status}");
        }
        let parsed: RerankResponse = response.json().await.context("reranker response is not valid JSON")?;
        scores_by_index(parsed.results, documents.len())
    }
}

/// Place each returned score back at its document's position.
fn scores_by_index(items: Vec<RerankItem>, n: usize) -> anyhow::Result<Vec<f32>> {
    let mut scores: Vec<Option<f32>> = vec![None; n];
    for item in items {
        let value = match (item.relevance_score, item.score) {
            (Some(s), _) => s,
            (None, Some(logit)) => sigmoid(logit),
            (None, None) => anyhow::bail!("reranker result {} has no score", item.index),
        };
        let slot = scores.get_mut(item.index).with_context(|| format!("reranker index {} out of range", item.index))?;
        *slot = Some(value);
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.with_context(|| format!("reranker skipped document {i}")))
        .collect()
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
