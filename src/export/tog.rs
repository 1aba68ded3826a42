// src/export/tog.rs
//! Tog sink: flagged rows become annotation tasks on a Tog job.

use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info};

use super::{output_columns, row_object, ExportContext, Exporter};
use crate::category::CategoryResult;
use crate::config::TogSinkConfig;
use crate::error::ExportError;

pub const ENV_TOG_URL: &str = "SENTINEL_TOG_URL";
pub const ENV_TOG_TOKEN: &str = "SENTINEL_TOG_TOKEN";

pub struct TogExporter {
    base_url: Option<String>,
    token: Option<String>,
    job_id: String,
    client: Client,
}

impl TogExporter {
    pub fn from_config(cfg: &TogSinkConfig) -> Self {
        Self {
            base_url: cfg
                .base_url
                .clone()
                .or_else(|| std::env::var(ENV_TOG_URL).ok()),
            token: std::env::var(ENV_TOG_TOKEN).ok(),
            job_id: cfg.job_id.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn new(base_url: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            token: None,
            job_id: job_id.into(),
            client: Client::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn tasks_url(&self, base: &str) -> String {
        format!("{}/jobs/{}/tasks", base.trim_end_matches('/'), self.job_id)
    }

    /// Request body for one category: the first `limit` rows as task payloads.
    pub fn task_payload(category: &CategoryResult, limit: usize) -> Result<Value, ExportError> {
        let columns = output_columns(&category.rows);
        let tasks = category
            .rows
            .rows()
            .iter()
            .take(limit)
            .map(|t| row_object(t, &columns).map(|data| json!({ "data": data })))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!({ "category": category.name, "tasks": tasks }))
    }

    async fn push(&self, url: &str, body: &Value) -> Result<(), ExportError> {
        let mut req = self.client.post(url).json(body);
        if let Some(t) = &self.token {
            req = req.bearer_auth(t);
        }
        req.send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Exporter for TogExporter {
    fn name(&self) -> &'static str {
        "tog"
    }

    async fn export(&self, ctx: &ExportContext<'_>) -> Result<(), ExportError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(ExportError::MissingSetting(ENV_TOG_URL))?;
        let url = self.tasks_url(base);

        let mut failed = Vec::new();
        for category in ctx.triggered() {
            let limit = ctx.limit(&category.name);
            let res = match Self::task_payload(category, limit) {
                Ok(body) => self.push(&url, &body).await,
                Err(e) => Err(e),
            };
            match res {
                Ok(()) => {
                    info!(job = %self.job_id, category = %category.name, rows = category.len().min(limit), "tog tasks pushed")
                }
                Err(e) => {
                    error!(job = %self.job_id, category = %category.name, error = %e, "tog push failed");
                    counter!("sentinel_sink_errors_total", "sink" => "tog").increment(1);
                    failed.push(category.name.clone());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ExportError::Rejected {
                service: "tog",
                reason: format!("push failed for {}", failed.join(", ")),
            })
        }
    }
}
