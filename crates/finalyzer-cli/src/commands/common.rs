use std::sync::Arc;

use chrono::{DateTime, Utc};
use finalyzer_core::api::ApiClient;
use finalyzer_core::config::ClientConfig;
use finalyzer_core::models::{AnalysisResult, Document, DocumentId};
use finalyzer_core::pagination::{PageState, PageWindow};
use finalyzer_core::router::{navigation_channel, NavigationRequests, Route};
use finalyzer_core::session::{SessionStore, CREDENTIAL_KEY};
use finalyzer_core::shell::Shell;
use finalyzer_core::util::compact_text;
use serde::Serialize;

use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;
use crate::storage::{ChangeMonitor, KeyringStorage};

/// Resolved profile plus the client configuration derived from it.
#[derive(Debug, Clone)]
pub struct Environment {
    pub profile_name: String,
    pub config: ClientConfig,
}

pub fn load_environment(
    global_profile: Option<&str>,
    api_url: Option<String>,
) -> Result<Environment, CliError> {
    let profiles = CliProfilesConfig::load()?;
    let profile_name = profiles.resolve_profile_name(global_profile);
    let config = profiles
        .profile(&profile_name)
        .cloned()
        .unwrap_or_default()
        .to_client_config(api_url)?;
    tracing::debug!(
        "Using profile {} against {}",
        profile_name,
        config.api_base_url
    );
    Ok(Environment {
        profile_name,
        config,
    })
}

pub fn api_client(environment: &Environment) -> Result<ApiClient, CliError> {
    Ok(ApiClient::new(&environment.config.api_base_url)?)
}

/// Session over the profile's keychain entry, without a view attached.
pub fn open_session(
    environment: &Environment,
) -> (SessionStore<KeyringStorage>, NavigationRequests) {
    let (navigator, requests) = navigation_channel();
    let storage = KeyringStorage::new(&environment.profile_name);
    (SessionStore::open(storage, navigator), requests)
}

/// Shell for a protected route, failing when the guard redirects.
///
/// The returned monitor keeps watching the keychain so a logout from another
/// process ends long-running commands.
pub fn open_protected_shell(
    environment: &Environment,
    route: Route,
) -> Result<(Shell<KeyringStorage>, ChangeMonitor), CliError> {
    let client = api_client(environment)?;
    let storage = KeyringStorage::new(&environment.profile_name);
    let monitor = storage.spawn_change_monitor(CREDENTIAL_KEY, environment.config.poll_interval());
    let shell = Shell::new(
        storage,
        Arc::new(client),
        environment.config.clone(),
        route.clone(),
    );
    if shell.route() == &route {
        Ok((shell, monitor))
    } else {
        Err(CliError::NotSignedIn)
    }
}

/// What to do next after landing on `route`.
pub const fn route_hint(route: &Route) -> &'static str {
    match route {
        Route::Login => "Run `finalyzer auth login --email <email> --password <password>` to sign in.",
        Route::Register => "Run `finalyzer auth register --email <email> --password <password>` to create an account.",
        Route::Dashboard => "Run `finalyzer documents` to list your uploads.",
        Route::Upload => "Run `finalyzer upload <PATH>` to submit a PDF.",
        Route::Analysis(_) => "Run `finalyzer analysis <DOCUMENT_ID>` to follow the analysis.",
    }
}

/// Accepts a bare document ID or an `/analysis/<id>` route path.
pub fn parse_document_id(value: &str) -> Result<DocumentId, CliError> {
    let value = value.trim();
    if value.starts_with('/') {
        return match Route::parse(value) {
            Some(Route::Analysis(document_id)) => Ok(document_id),
            _ => Err(CliError::NotAnAnalysisPath(value.to_string())),
        };
    }
    value.parse().map_err(|_| CliError::EmptyDocumentId)
}

/// Remembers the last reported failure so an unchanged error is shown once.
#[derive(Debug, Default)]
pub struct ErrorLatch {
    reported: Option<String>,
}

impl ErrorLatch {
    /// Returns `error` when it differs from the last one reported. A cleared
    /// error re-arms the latch.
    pub fn fresh<'a>(&mut self, error: Option<&'a str>) -> Option<&'a str> {
        match error {
            None => {
                self.reported = None;
                None
            }
            Some(message) if self.reported.as_deref() == Some(message) => None,
            Some(message) => {
                self.reported = Some(message.to_string());
                Some(message)
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentListItem {
    pub id: String,
    pub filename: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentListPage {
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
    pub documents: Vec<DocumentListItem>,
}

pub fn document_to_list_item(document: &Document) -> DocumentListItem {
    DocumentListItem {
        id: document.id.to_string(),
        filename: document.filename.clone(),
        status: document.status.to_string(),
    }
}

pub fn page_to_list(state: &PageState<Document>, window: PageWindow) -> DocumentListPage {
    DocumentListPage {
        page: window.current_page(),
        total_pages: window.total_pages(),
        total: state.total,
        documents: state.items.iter().map(document_to_list_item).collect(),
    }
}

pub fn format_document_lines(documents: &[Document]) -> Vec<String> {
    if documents.is_empty() {
        return vec!["No documents uploaded yet.".to_string()];
    }
    documents
        .iter()
        .map(|document| {
            let filename = truncate(&document.filename, 40);
            format!(
                "{:<24}  {filename:<40}  {}",
                document.id.as_str(),
                document.status
            )
        })
        .collect()
}

pub fn format_page_footer(window: PageWindow) -> String {
    let noun = if window.total == 1 {
        "document"
    } else {
        "documents"
    };
    format!(
        "Page {} of {} ({} {noun})",
        window.current_page(),
        window.total_pages(),
        window.total
    )
}

pub fn format_analysis_lines(results: &[AnalysisResult]) -> Vec<String> {
    if results.is_empty() {
        return vec!["No analysis yet.".to_string()];
    }

    let mut lines = Vec::new();
    for (index, result) in results.iter().enumerate() {
        let id = result.id.as_deref().unwrap_or("-");
        lines.push(format!("#{}  {id}  status={}", index + 1, result.status));
        if let Some(summary) = &result.local_summary {
            let confidence = summary
                .confidence
                .map(|value| format!(" (confidence {value:.2})"))
                .unwrap_or_default();
            push_block(&mut lines, "summary", summary.summary.trim(), &confidence);
        }
        if let Some(crew_result) = &result.crew_result {
            push_block(&mut lines, "analysis", &render_crew_result(crew_result), "");
        }
        if let Some(error) = &result.error {
            lines.push(format!("    error: {}", compact_text(error)));
        }
    }
    lines
}

/// Pushes `text` under `label`; continuation lines are indented below it.
fn push_block(lines: &mut Vec<String>, label: &str, text: &str, suffix: &str) {
    let mut text_lines = text.lines();
    let first = text_lines.next().unwrap_or_default();
    let rest: Vec<&str> = text_lines.collect();
    if rest.is_empty() {
        lines.push(format!("    {label}: {first}{suffix}"));
        return;
    }
    lines.push(format!("    {label}: {first}"));
    let last = rest.len() - 1;
    for (index, line) in rest.into_iter().enumerate() {
        let tail = if index == last { suffix } else { "" };
        lines.push(format!("      {line}{tail}"));
    }
}

fn render_crew_result(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.trim().to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub fn format_fetched_at(fetched_at: DateTime<Utc>) -> String {
    format!("-- fetched {} --", fetched_at.format("%Y-%m-%d %H:%M:%S UTC"))
}

pub fn format_progress(percent: u8) -> String {
    const WIDTH: usize = 20;
    let filled = usize::from(percent.min(100)) * WIDTH / 100;
    format!(
        "[{}{}] {percent:>3}%",
        "#".repeat(filled),
        "-".repeat(WIDTH - filled)
    )
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut truncated = value
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
