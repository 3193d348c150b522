use chrono::{DateTime, Utc};
use finalyzer_core::models::{AnalysisResult, DocumentId};
use finalyzer_core::poller::{FetchOutcome, PollPhase, PollState};
use finalyzer_core::router::Route;
use finalyzer_core::shell::{Shell, ShellEvent};
use finalyzer_core::views::{AnalysisView, MountedView};

use crate::commands::common::{
    format_analysis_lines, format_fetched_at, load_environment, open_protected_shell,
    parse_document_id, ErrorLatch,
};
use crate::error::CliError;
use crate::storage::KeyringStorage;

pub async fn run_analysis(
    document_id: &str,
    once: bool,
    as_json: bool,
    global_profile: Option<&str>,
    api_url: Option<String>,
) -> Result<(), CliError> {
    let document_id = parse_document_id(document_id)?;
    let environment = load_environment(global_profile, api_url)?;
    let (mut shell, _monitor) = open_protected_shell(&environment, Route::Analysis(document_id))?;
    follow_analysis(&mut shell, once, as_json).await
}

fn analysis_view(shell: &Shell<KeyringStorage>) -> Result<&AnalysisView, CliError> {
    match shell.visible_view() {
        Some(MountedView::Analysis(view)) => Ok(view),
        _ => Err(CliError::SessionEnded),
    }
}

/// Prints analysis snapshots until Ctrl-C, or the first settled fetch with
/// `once`. Polling continues past `done`/`error` statuses.
pub async fn follow_analysis(
    shell: &mut Shell<KeyringStorage>,
    once: bool,
    as_json: bool,
) -> Result<(), CliError> {
    enum Input {
        Updated,
        Shell(ShellEvent),
        Interrupted,
    }

    let view = analysis_view(shell)?;
    let document_id = view.document_id().clone();
    let mut updates = view.subscribe();
    if !once {
        eprintln!("Following analysis of {document_id} (Ctrl-C to stop)");
    }

    let mut printer = SnapshotPrinter {
        document_id,
        as_json,
        last_printed: None,
        failures: ErrorLatch::default(),
    };
    let initial = updates.borrow_and_update().clone();
    if once && matches!(initial.phase, PollPhase::Settled(_)) {
        return finish_once(&initial, as_json);
    }
    printer.show(initial)?;

    loop {
        let input = tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Err(CliError::SessionEnded);
                }
                Input::Updated
            }
            event = shell.next_event() => Input::Shell(event),
            _ = tokio::signal::ctrl_c() => Input::Interrupted,
        };

        match input {
            Input::Updated => {
                let state = updates.borrow_and_update().clone();
                if !once {
                    printer.show(state)?;
                } else if matches!(state.phase, PollPhase::Settled(_)) {
                    return finish_once(&state, as_json);
                }
            }
            Input::Shell(ShellEvent::Closed) | Input::Interrupted => {
                tracing::debug!("Stopping poller for {}", printer.document_id);
                return Ok(());
            }
            Input::Shell(_) => {
                if !matches!(shell.route(), Route::Analysis(_)) {
                    return Err(CliError::SessionEnded);
                }
            }
        }
    }
}

/// Prints each new snapshot once; failed polls are logged once per
/// distinct error.
struct SnapshotPrinter {
    document_id: DocumentId,
    as_json: bool,
    last_printed: Option<Vec<AnalysisResult>>,
    failures: ErrorLatch,
}

impl SnapshotPrinter {
    fn show(&mut self, state: PollState<Vec<AnalysisResult>>) -> Result<(), CliError> {
        if let Some(message) = self.failures.fresh(state.last_error.as_deref()) {
            tracing::warn!("Poll of {} failed, retrying: {}", self.document_id, message);
        }
        let Some(latest) = state.latest else {
            return Ok(());
        };
        if self.last_printed.as_ref() != Some(&latest) {
            print_results(&latest, state.fetched_at, self.as_json)?;
            self.last_printed = Some(latest);
        }
        Ok(())
    }
}

fn finish_once(state: &PollState<Vec<AnalysisResult>>, as_json: bool) -> Result<(), CliError> {
    match (&state.latest, state.phase) {
        (Some(results), _) => print_results(results, state.fetched_at, as_json),
        (None, PollPhase::Settled(FetchOutcome::Error)) => Err(CliError::Fetch {
            what: "analysis",
            message: state
                .last_error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        }),
        (None, _) => Ok(()),
    }
}

fn print_results(
    results: &[AnalysisResult],
    fetched_at: Option<DateTime<Utc>>,
    as_json: bool,
) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(results)?);
    } else {
        if let Some(fetched_at) = fetched_at {
            println!("{}", format_fetched_at(fetched_at));
        }
        for line in format_analysis_lines(results) {
            println!("{line}");
        }
    }
    Ok(())
}
