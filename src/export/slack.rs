// src/export/slack.rs
//! Slack sink: a dated parent message, then Block Kit replies in its thread listing
//! each triggered category with links to the affected calls and the uploaded CSVs.

use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use super::csv::encode_table;
use super::store::{FsObjectStore, HttpObjectStore, ObjectStore};
use super::{ExportContext, Exporter};
use crate::category::CategoryResult;
use crate::config::SlackSinkConfig;
use crate::error::ExportError;

pub const ENV_BOT_TOKEN: &str = "SENTINEL_BOT_USER_TOKEN";
pub const ENV_CONSOLE_HOST: &str = "SENTINEL_CONSOLE_HOST";
pub const ENV_SLACK_API: &str = "SENTINEL_SLACK_API";
const DEFAULT_SLACK_API: &str = "https://slack.com/api";

/// Slack rejects messages with more blocks than this.
pub const MAX_BLOCKS_PER_MESSAGE: usize = 50;
/// Call links per section block, keeping block text under Slack's 3000 char cap.
pub const CALLS_PER_BLOCK: usize = 10;

pub struct SlackExporter {
    token: Option<String>,
    api_base: String,
    channel: String,
    console_host: String,
    bucket: String,
    store: Option<Box<dyn ObjectStore>>,
    client: Client,
}

impl SlackExporter {
    /// Secrets and hosts come from the environment; the rest from the sink config.
    pub fn from_config(cfg: &SlackSinkConfig) -> Self {
        let store: Option<Box<dyn ObjectStore>> = match HttpObjectStore::from_env() {
            Some(s) => Some(Box::new(s)),
            None => cfg
                .store_dir
                .as_ref()
                .map(|d| Box::new(FsObjectStore::new(d)) as Box<dyn ObjectStore>),
        };
        Self {
            token: std::env::var(ENV_BOT_TOKEN).ok(),
            api_base: std::env::var(ENV_SLACK_API).unwrap_or_else(|_| DEFAULT_SLACK_API.into()),
            channel: cfg.channel_name.clone(),
            console_host: std::env::var(ENV_CONSOLE_HOST).unwrap_or_default(),
            bucket: cfg.bucket.clone(),
            store,
            client: Client::new(),
        }
    }

    /// Optional builder for tests/tools
    pub fn new(channel: impl Into<String>, console_host: impl Into<String>) -> Self {
        Self {
            token: None,
            api_base: DEFAULT_SLACK_API.to_string(),
            channel: channel.into(),
            console_host: console_host.into(),
            bucket: "sentinel".to_string(),
            store: None,
            client: Client::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_store(mut self, store: Box<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn call_reference(&self, call_uuid: &str, turn_uuid: &str) -> String {
        format!(
            "{}/call-report/#/call?uuid={}&turnuuid={}",
            self.console_host, call_uuid, turn_uuid
        )
    }

    /// Description block followed by chunked call-link blocks for one category.
    pub fn category_blocks(&self, ctx: &ExportContext<'_>, category: &CategoryResult) -> Vec<Value> {
        let mut blocks = vec![section(&format!(
            ":pencil: *{}. Kwargs: {}*",
            ctx.description(&category.name),
            ctx.kwargs_display(&category.name)
        ))];

        let links: Vec<String> = category
            .display_rows(ctx.limit(&category.name))
            .into_iter()
            .map(|t| {
                format!(
                    "• <{}|{}>",
                    self.call_reference(&t.call_uuid, &t.conversation_uuid),
                    t.call_uuid
                )
            })
            .collect();
        for chunk in links.chunks(CALLS_PER_BLOCK) {
            blocks.push(section(&chunk.join("\n")));
        }
        blocks
    }

    /// Full block list for the thread: header, categories, then CSV links.
    pub fn build_blocks(&self, ctx: &ExportContext<'_>, uploaded: &[(String, String)]) -> Vec<Value> {
        let names: Vec<&str> = ctx.triggered().map(|c| c.name.as_str()).collect();
        let mut blocks = vec![section(&format!(
            "*We have found anomalous calls under following categories: {}*",
            names.join(", ")
        ))];
        for category in ctx.triggered() {
            blocks.extend(self.category_blocks(ctx, category));
        }
        let files: String = uploaded
            .iter()
            .map(|(name, link)| format!("\n<{link}|{name}.csv>"))
            .collect();
        blocks.push(section(&format!("* :file_cabinet: Exported dataframes at:* {files}")));
        blocks
    }

    /// Upload each triggered category's CSV; failures are logged and skipped.
    async fn upload_all(&self, ctx: &ExportContext<'_>) -> Vec<(String, String)> {
        let Some(store) = &self.store else {
            debug!("no object store configured, skipping uploads");
            return Vec::new();
        };
        let mut uploaded = Vec::new();
        for category in ctx.triggered() {
            let key = format!("sentinel/{}/{}.csv", ctx.run_id, category.name);
            let res = match encode_table(&category.rows) {
                Ok(body) => store.put(&self.bucket, &key, body).await,
                Err(e) => Err(e),
            };
            match res {
                Ok(link) => uploaded.push((category.name.clone(), link)),
                Err(e) => {
                    error!(category = %category.name, error = %e, "upload failed");
                    counter!("sentinel_sink_errors_total", "sink" => "object_store").increment(1);
                }
            }
        }
        uploaded
    }

    async fn post_message(&self, token: &str, body: &Value) -> Result<Value, ExportError> {
        let url = format!("{}/chat.postMessage", self.api_base.trim_end_matches('/'));
        let rsp: Value = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if rsp.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = rsp
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(ExportError::Rejected {
                service: "slack",
                reason,
            });
        }
        Ok(rsp)
    }
}

/// Block Kit mrkdwn section. Slack rejects empty text, so it becomes "None".
pub fn section(text: &str) -> Value {
    let text = if text.is_empty() { "None" } else { text };
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": text }
    })
}

pub fn thread_title(language_code: Option<&str>, date: chrono::NaiveDate) -> String {
    format!(
        "Sentinel thread: {} ({})",
        date,
        language_code.unwrap_or("unknown_language")
    )
}

#[async_trait]
impl Exporter for SlackExporter {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn export(&self, ctx: &ExportContext<'_>) -> Result<(), ExportError> {
        let token = self
            .token
            .as_deref()
            .ok_or(ExportError::MissingSetting(ENV_BOT_TOKEN))?;
        if ctx.triggered().next().is_none() {
            info!(channel = %self.channel, "nothing flagged, skipping slack report");
            return Ok(());
        }

        let uploaded = self.upload_all(ctx).await;
        let blocks = self.build_blocks(ctx, &uploaded);

        let title = thread_title(
            ctx.config.language_code.as_deref(),
            chrono::Local::now().date_naive(),
        );
        let parent = self
            .post_message(
                token,
                &json!({
                    "channel": self.channel,
                    "text": title,
                    "blocks": [section(&title)],
                }),
            )
            .await?;
        let thread_ts = parent.get("ts").cloned().unwrap_or(Value::Null);

        for chunk in blocks.chunks(MAX_BLOCKS_PER_MESSAGE) {
            self.post_message(
                token,
                &json!({
                    "channel": self.channel,
                    "text": "Sentinel",
                    "thread_ts": thread_ts,
                    "blocks": chunk,
                }),
            )
            .await?;
        }
        info!(channel = %self.channel, blocks = blocks.len(), "slack report posted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterEntry, RunConfig};
    use crate::table::{RecordTable, Turn};
    use serde_json::json;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn category(name: &str, calls: usize) -> CategoryResult {
        let mut t = RecordTable::from_rows(
            (0..calls)
                .map(|i| Turn::new(format!("call-{i}")).with_conversation(format!("conv-{i}")))
                .collect(),
        );
        t.annotate(name, |_| Some(json!({"x": true})));
        CategoryResult::from_table(&t, name)
    }

    fn text(block: &Value) -> &str {
        block["text"]["text"].as_str().unwrap()
    }

    #[test]
    fn empty_section_text_becomes_none() {
        assert_eq!(text(&section("")), "None");
    }

    #[test]
    fn call_links_are_chunked_and_limited() {
        let mut cfg = RunConfig::default();
        let mut entry = FilterEntry::new("no_alternatives");
        entry.limit = 25;
        cfg.filters.push(entry);
        let cats = vec![category("no_alternatives", 40), category("state_loop", 0)];
        let mut desc = BTreeMap::new();
        desc.insert("no_alternatives".to_string(), "Turns with no alternatives".to_string());
        let ctx = ExportContext::new(Uuid::nil(), &cfg, &cats, desc);

        let slack = SlackExporter::new("#alerts", "https://console.test");
        let blocks = slack.build_blocks(&ctx, &[("no_alternatives".into(), "mem://x".into())]);

        // header + description + 3 link blocks (10, 10, 5) + files
        assert_eq!(blocks.len(), 6);
        assert!(text(&blocks[0]).ends_with("categories: no_alternatives*"));
        assert!(text(&blocks[1]).starts_with(":pencil: *Turns with no alternatives. Kwargs: {}"));
        assert_eq!(text(&blocks[2]).lines().count(), 10);
        assert_eq!(text(&blocks[4]).lines().count(), 5);
        assert!(text(&blocks[2]).starts_with(
            "• <https://console.test/call-report/#/call?uuid=call-0&turnuuid=conv-0|call-0>"
        ));
        assert!(text(&blocks[5]).contains("<mem://x|no_alternatives.csv>"));
    }

    #[test]
    fn thread_title_defaults_language() {
        let d = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(thread_title(None, d), "Sentinel thread: 2024-03-01 (unknown_language)");
        assert_eq!(thread_title(Some("hi"), d), "Sentinel thread: 2024-03-01 (hi)");
    }

    #[tokio::test]
    async fn uploads_only_triggered_categories() {
        let cfg = RunConfig::default();
        let cats = vec![category("no_alternatives", 2), category("state_loop", 0)];
        let ctx = ExportContext::new(Uuid::nil(), &cfg, &cats, BTreeMap::new());
        let slack = SlackExporter::new("#c", "")
            .with_store(Box::new(crate::export::MemoryObjectStore::new()));

        let uploaded = slack.upload_all(&ctx).await;
        assert_eq!(
            uploaded,
            vec![(
                "no_alternatives".to_string(),
                format!("mem://sentinel/sentinel/{}/no_alternatives.csv", Uuid::nil())
            )]
        );
    }

    #[tokio::test]
    async fn unreachable_api_is_a_sink_error() {
        let cfg = RunConfig::default();
        let cats = vec![category("no_alternatives", 1)];
        let ctx = ExportContext::new(Uuid::nil(), &cfg, &cats, BTreeMap::new());
        // nothing listens on the discard port
        let slack = SlackExporter::new("#c", "")
            .with_token("xoxb-test")
            .with_api_base("http://127.0.0.1:9/api/");
        let err = slack.export(&ctx).await.unwrap_err();
        assert!(matches!(err, ExportError::Http(_)));
    }

    #[tokio::test]
    async fn missing_token_is_an_error() {
        let cfg = RunConfig::default();
        let cats = vec![category("no_alternatives", 1)];
        let ctx = ExportContext::new(Uuid::nil(), &cfg, &cats, BTreeMap::new());
        let err = SlackExporter::new("#c", "").export(&ctx).await.unwrap_err();
        assert!(matches!(err, ExportError::MissingSetting(ENV_BOT_TOKEN)));
    }
}
