//! Analysis-cycle orchestration.
//!
//! One cycle: ensure the page context is alive, extract, pick the
//! form-fill or summary branch, call the completion API, dispatch the
//! populate when suggestions parsed, persist the versioned record, queue a
//! UI notification. A tab runs at most one cycle at a time; a second
//! trigger is rejected while the first is outstanding. Step failures
//! persist an error record; there is no automatic re-resolution beyond
//! the single injection retry in the handshake.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::channel::{spawn_page_context, ChannelError, ContextHandle, PageSource};
use crate::config::Config;
use crate::llm::{
    parse_suggestions, CompletionClient, CompletionTransport, ParsedSuggestions, RetryPolicy,
};
use crate::llm::prompts;
use crate::router::{Notification, Request, Response};
use crate::snapshot::{AnalysisRecord, PageSnapshot, SuggestionSet};
use crate::store::Store;

const PING_TIMEOUT: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after injecting a fresh context before the retry ping.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

pub type TabId = u32;

struct Tab {
    source: PageSource,
    handle: Option<ContextHandle>,
    in_flight: bool,
}

/// Outcome of one analysis cycle.
#[derive(Debug)]
pub struct CycleOutcome {
    pub record: AnalysisRecord,
    /// The populate ack, when the form-fill branch dispatched one.
    pub populate: Option<Response>,
}

pub struct Orchestrator<T> {
    store: Store,
    client: CompletionClient<T>,
    tabs: Mutex<HashMap<TabId, Tab>>,
    notifications: Mutex<Vec<Notification>>,
}

impl<T: CompletionTransport> Orchestrator<T> {
    pub fn new(store: Store, client: CompletionClient<T>) -> Self {
        Self {
            store,
            client,
            tabs: Mutex::new(HashMap::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn with_config(store: Store, transport: T, config: &Config) -> Self {
        Self::new(
            store,
            CompletionClient::new(transport, RetryPolicy::from_config(config)),
        )
    }

    /// Register (or replace) a tab's page source. Any existing context for
    /// the tab is dropped.
    pub fn register_tab(&self, id: TabId, source: PageSource) {
        let mut tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
        tabs.insert(
            id,
            Tab {
                source,
                handle: None,
                in_flight: false,
            },
        );
    }

    /// Queued UI notifications, oldest first.
    pub fn take_notifications(&self) -> Vec<Notification> {
        let mut queue = self.notifications.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *queue)
    }

    fn notify(&self, notification: Notification) {
        tracing::info!(?notification, "notifying UI");
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }

    /// Extraction plus a best-effort page summary; no record is written.
    pub async fn scan(&self, tab: TabId) -> anyhow::Result<Response> {
        let handle = self.ensure_context(tab).await?;
        let response = handle.request(Request::Scan, REQUEST_TIMEOUT).await?;
        let Response::ScanResult { snapshot, .. } = response else {
            anyhow::bail!("page context answered scan with the wrong response");
        };
        let ai_summary = match self.client.complete(&prompts::scan_summary_prompt(&snapshot)).await
        {
            Ok(completion) => Some(completion.text),
            Err(err) => {
                tracing::warn!(%err, "page summary unavailable");
                None
            }
        };
        Ok(Response::ScanResult {
            snapshot,
            ai_summary,
        })
    }

    /// Run one full analysis cycle for a tab.
    pub async fn analyze(&self, tab: TabId) -> anyhow::Result<CycleOutcome> {
        self.begin_cycle(tab)?;
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%cycle_id, tab, "analysis cycle started");

        if let Err(err) = self
            .store
            .save_record(&AnalysisRecord::processing(cycle_id, started_at))
        {
            tracing::warn!(%err, "could not persist processing record");
        }

        let result = self.run_cycle(tab).await;
        self.finish_cycle(tab);

        match result {
            Ok((payload, populate)) => {
                let record = AnalysisRecord::complete(cycle_id, started_at, payload);
                match self.store.save_record(&record) {
                    Ok(true) => {}
                    Ok(false) => tracing::info!(%cycle_id, "record superseded by a newer cycle"),
                    Err(err) => tracing::warn!(%err, "could not persist analysis record"),
                }
                self.notify(Notification::AnalysisComplete);
                Ok(CycleOutcome { record, populate })
            }
            Err(err) => {
                let message = format!("{:#}", err);
                tracing::error!(%cycle_id, error = %message, "analysis cycle failed");
                let record = AnalysisRecord::error(cycle_id, started_at, message.clone());
                if let Err(save_err) = self.store.save_record(&record) {
                    tracing::warn!(%save_err, "could not persist error record");
                }
                self.notify(Notification::AnalysisError { error: message });
                Ok(CycleOutcome {
                    record,
                    populate: None,
                })
            }
        }
    }

    /// The fallible middle of a cycle; the caller owns record-keeping.
    async fn run_cycle(&self, tab: TabId) -> anyhow::Result<(String, Option<Response>)> {
        let handle = self.ensure_context(tab).await?;

        let response = handle.request(Request::Scan, REQUEST_TIMEOUT).await?;
        let Response::ScanResult { snapshot, .. } = response else {
            anyhow::bail!("page context answered scan with the wrong response");
        };

        let profile = self.store.profile().unwrap_or_else(|| "{}".to_string());

        if snapshot.form_fields.is_empty() {
            let completion = self
                .client
                .complete(&prompts::analysis_prompt(&profile, &snapshot))
                .await?;
            tracing::debug!(retries = completion.retries, model = %completion.model, "summary complete");
            return Ok((completion.text, None));
        }

        let completion = self
            .client
            .complete(&prompts::form_fill_prompt(&profile, &snapshot))
            .await?;
        tracing::debug!(retries = completion.retries, model = %completion.model, "form fill complete");

        match parse_suggestions(&completion.text) {
            ParsedSuggestions::Parsed(suggestions) => {
                let ack = self
                    .dispatch_populate(&handle, &snapshot, suggestions.clone())
                    .await?;
                let payload = serde_json::to_string(&suggestions)?;
                Ok((payload, Some(ack)))
            }
            // The model refused to produce JSON; surface its text as the
            // result rather than failing the cycle.
            ParsedSuggestions::Raw(text) => Ok((text, None)),
        }
    }

    async fn dispatch_populate(
        &self,
        handle: &ContextHandle,
        snapshot: &PageSnapshot,
        suggestions: SuggestionSet,
    ) -> anyhow::Result<Response> {
        tracing::debug!(
            suggestions = suggestions.len(),
            fields = snapshot.form_fields.len(),
            "dispatching populate"
        );
        let response = handle
            .request(Request::PopulateForm { suggestions }, REQUEST_TIMEOUT)
            .await?;
        match response {
            ack @ Response::PopulateAck { .. } => Ok(ack),
            _ => anyhow::bail!("page context answered populate with the wrong response"),
        }
    }

    /// Ping the tab's context; on silence, inject a fresh one and retry
    /// once after a settle delay.
    async fn ensure_context(&self, tab: TabId) -> anyhow::Result<ContextHandle> {
        let (handle, source) = {
            let tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
            let entry = tabs
                .get(&tab)
                .ok_or_else(|| anyhow::anyhow!("unknown tab {}", tab))?;
            (entry.handle.clone(), entry.source.clone())
        };

        if let Some(handle) = handle {
            if self.ping(&handle).await {
                return Ok(handle);
            }
            tracing::warn!(tab, "page context unresponsive, re-injecting");
        }

        let handle = spawn_page_context(source);
        tokio::time::sleep(SETTLE_DELAY).await;
        if !self.ping(&handle).await {
            anyhow::bail!("page context did not come up after injection");
        }

        let mut tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = tabs.get_mut(&tab) {
            entry.handle = Some(handle.clone());
        }
        Ok(handle)
    }

    async fn ping(&self, handle: &ContextHandle) -> bool {
        use crate::router::Dialect;
        match handle
            .request(Request::Ping { dialect: Dialect::Action }, PING_TIMEOUT)
            .await
        {
            Ok(Response::Pong { .. }) => true,
            Ok(_) => false,
            Err(ChannelError::Timeout) | Err(ChannelError::ContextGone) => false,
        }
    }

    fn begin_cycle(&self, tab: TabId) -> anyhow::Result<()> {
        let mut tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
        let entry = tabs
            .get_mut(&tab)
            .ok_or_else(|| anyhow::anyhow!("unknown tab {}", tab))?;
        if entry.in_flight {
            anyhow::bail!("analysis already in progress for tab {}", tab);
        }
        entry.in_flight = true;
        Ok(())
    }

    fn finish_cycle(&self, tab: TabId) {
        let mut tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = tabs.get_mut(&tab) {
            entry.in_flight = false;
        }
    }
}
