//! Record fetching through a chain of fallback strategies
//!
//! Layout find-queries are tried first, in candidate order. When every
//! layout fails, each script runs globally and then in the context of each
//! layout. Attempts are strictly sequential and the first success wins.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde_json::{Value, json};
use uuid::Uuid;

use super::client::DataApi;
use super::models::{ApiResponse, FindRequest, Record};
use super::normalize::{Normalized, normalize};
use crate::records::active::filter_active;

/// Outcome of one failed strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub layout: Option<String>,
    pub script: Option<String>,
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(script) = &self.script {
            parts.push(format!("script: {}", script));
        }
        if let Some(layout) = &self.layout {
            parts.push(format!("layout: {}", layout));
        }
        match self.status {
            Some(status) => parts.push(format!("status: {}", status)),
            None => parts.push("status: network".to_string()),
        }
        parts.push(format!("message: {}", self.message));
        write!(f, "{}", parts.join(", "))
    }
}

/// Every strategy failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub attempts: Vec<Attempt>,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not load records from any layout or script")?;
        if !self.attempts.is_empty() {
            let details: Vec<String> = self.attempts.iter().map(|a| format!("[{}]", a)).collect();
            write!(f, ". Attempts: {}", details.join(" | "))?;
        }
        Ok(())
    }
}

impl std::error::Error for FetchError {}

/// Strategy that last produced records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessContext {
    pub script: Option<String>,
    pub layout: Option<String>,
}

/// Candidate names tried by the fetcher
#[derive(Debug, Clone, Default)]
pub struct FetchCandidates {
    pub layouts: Vec<String>,
    pub scripts: Vec<String>,
    pub find_limit: Option<u32>,
}

pub struct RecordFetcher {
    api: Arc<dyn DataApi>,
    candidates: FetchCandidates,
    last_success: ArcSwapOption<SuccessContext>,
}

impl RecordFetcher {
    pub fn new(api: Arc<dyn DataApi>, candidates: FetchCandidates) -> Self {
        Self {
            api,
            candidates,
            last_success: ArcSwapOption::empty(),
        }
    }

    pub fn candidates(&self) -> &FetchCandidates {
        &self.candidates
    }

    pub fn last_success(&self) -> Option<SuccessContext> {
        self.last_success.load_full().map(|ctx| (*ctx).clone())
    }

    /// Fetch active records, trying every strategy until one succeeds
    pub async fn fetch_records(&self) -> Result<Vec<Record>, FetchError> {
        let run = Uuid::new_v4();
        let mut attempts = Vec::new();

        if let Some(records) = self.fetch_via_layouts(run, &mut attempts).await {
            return Ok(self.keep_active(run, records));
        }
        if let Some(records) = self.fetch_via_scripts(run, &mut attempts).await {
            return Ok(self.keep_active(run, records));
        }

        log::warn!("[{}] Record fetch exhausted {} attempts", run, attempts.len());
        Err(FetchError { attempts })
    }

    fn keep_active(&self, run: Uuid, records: Vec<Record>) -> Vec<Record> {
        let total = records.len();
        let active = filter_active(records);
        log::info!("[{}] Loaded {} records ({} active)", run, total, active.len());
        active
    }

    fn remember(&self, script: Option<&str>, layout: Option<&str>) {
        self.last_success.store(Some(Arc::new(SuccessContext {
            script: script.map(str::to_string),
            layout: layout.map(str::to_string),
        })));
    }

    async fn fetch_via_layouts(&self, run: Uuid, attempts: &mut Vec<Attempt>) -> Option<Vec<Record>> {
        let request = FindRequest::active(self.candidates.find_limit);

        for layout in &self.candidates.layouts {
            log::debug!("[{}] Trying layout {}", run, layout);
            let failed = |status: Option<u16>, message: String| Attempt {
                layout: Some(layout.clone()),
                script: None,
                status,
                message,
            };

            let response = match self.api.find(layout, &request).await {
                Ok(response) => response,
                Err(e) => {
                    log::warn!("[{}] Layout {} unreachable: {:#}", run, layout, e);
                    attempts.push(failed(None, format!("{:#}", e)));
                    continue;
                }
            };

            // 401 on a find means "no matching records"
            let payload = if response.is_unauthorized() {
                log::debug!("[{}] Layout {} answered 401, treating as empty", run, layout);
                json!({ "response": { "data": [] } })
            } else if !response.ok() {
                log::warn!("[{}] Layout {} failed with status {}", run, layout, response.status);
                attempts.push(failed(Some(response.status), response.describe()));
                continue;
            } else {
                response_payload(&response)
            };

            let normalized = normalize(&payload);
            if let Some(error) = normalized.error {
                log::warn!("[{}] Layout {} returned an unusable payload: {}", run, layout, error);
                attempts.push(failed(Some(response.status), error));
                continue;
            }

            log::debug!(
                "[{}] Layout {} returned {} records ({})",
                run,
                layout,
                normalized.records.len(),
                normalized.source
            );
            self.remember(None, Some(layout));
            return Some(normalized.records);
        }
        None
    }

    async fn fetch_via_scripts(&self, run: Uuid, attempts: &mut Vec<Attempt>) -> Option<Vec<Record>> {
        for script in &self.candidates.scripts {
            log::debug!("[{}] Trying script {}", run, script);
            let outcome = self.api.run_script(script).await;
            match evaluate_script(outcome) {
                Ok(normalized) => {
                    self.remember(Some(script), None);
                    return Some(normalized.records);
                }
                Err((status, message)) => {
                    log::warn!("[{}] Script {} failed: {}", run, script, message);
                    attempts.push(Attempt {
                        layout: None,
                        script: Some(script.clone()),
                        status,
                        message,
                    });
                }
            }

            for layout in &self.candidates.layouts {
                log::debug!("[{}] Trying script {} on layout {}", run, script, layout);
                let outcome = self.api.run_layout_script(layout, script).await;
                match evaluate_script(outcome) {
                    Ok(normalized) => {
                        self.remember(Some(script), Some(layout));
                        return Some(normalized.records);
                    }
                    Err((status, message)) => {
                        log::warn!("[{}] Script {} on layout {} failed: {}", run, script, layout, message);
                        attempts.push(Attempt {
                            layout: Some(layout.clone()),
                            script: Some(script.clone()),
                            status,
                            message,
                        });
                    }
                }
            }
        }
        None
    }
}

/// Body of a successful response; an unparseable body counts as empty
fn response_payload(response: &ApiResponse) -> Value {
    if let Some(error) = &response.parse_error {
        log::warn!("Ignoring unparseable response body: {}", error);
    }
    response.body.clone().unwrap_or(Value::Null)
}

/// A script attempt succeeds on an OK status with a parseable body whose
/// embedded result code is zero
fn evaluate_script(
    outcome: anyhow::Result<ApiResponse>,
) -> Result<Normalized, (Option<u16>, String)> {
    let response = outcome.map_err(|e| (None, format!("{:#}", e)))?;
    if !response.ok() {
        return Err((Some(response.status), response.describe()));
    }
    if let Some(error) = &response.parse_error {
        return Err((
            Some(response.status),
            format!("could not parse the script response: {}", error),
        ));
    }

    let normalized = normalize(response.body.as_ref().unwrap_or(&Value::Null));
    match normalized.error.clone() {
        Some(error) => Err((Some(response.status), error)),
        None => Ok(normalized),
    }
}
