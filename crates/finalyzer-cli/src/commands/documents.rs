use finalyzer_core::models::Document;
use finalyzer_core::pagination::{PageRequest, PageState};
use finalyzer_core::router::Route;
use finalyzer_core::shell::{Shell, ShellEvent};
use finalyzer_core::views::{DashboardView, MountedView};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::commands::common::{
    format_document_lines, format_page_footer, load_environment, open_protected_shell,
    page_to_list, ErrorLatch,
};
use crate::error::CliError;
use crate::storage::KeyringStorage;

const BROWSE_HELP: &str = "n: next page, p: previous page, <number>: jump to page, r: refresh, q: quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseCommand {
    Next,
    Prev,
    Jump(usize),
    Refresh,
    Quit,
    Help,
}

pub fn parse_browse_command(input: &str) -> BrowseCommand {
    let input = input.trim();
    match input.to_ascii_lowercase().as_str() {
        "n" | "next" | "" => BrowseCommand::Next,
        "p" | "prev" | "previous" => BrowseCommand::Prev,
        "r" | "refresh" => BrowseCommand::Refresh,
        "q" | "quit" | "exit" => BrowseCommand::Quit,
        other => other
            .parse::<usize>()
            .ok()
            .filter(|page| *page > 0)
            .map_or(BrowseCommand::Help, BrowseCommand::Jump),
    }
}

/// What browse mode prints for a page-state update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEcho {
    Page,
    RefreshFailed(String),
    Quiet,
}

/// Remembers what browse mode last printed so background refreshes that
/// change nothing stay silent.
#[derive(Debug, Default)]
pub struct PageEchoes {
    failures: ErrorLatch,
    shown: Option<(PageRequest, usize, Vec<Document>)>,
}

impl PageEchoes {
    pub fn observe(&mut self, state: &PageState<Document>, window: PageRequest) -> PageEcho {
        if state.last_error.is_some() {
            return self
                .failures
                .fresh(state.last_error.as_deref())
                .map_or(PageEcho::Quiet, |message| {
                    PageEcho::RefreshFailed(message.to_string())
                });
        }
        self.failures.fresh(None);
        if state.loaded != Some(window) {
            return PageEcho::Quiet;
        }
        let page = (window, state.total, state.items.clone());
        if self.shown.as_ref() == Some(&page) {
            return PageEcho::Quiet;
        }
        self.shown = Some(page);
        PageEcho::Page
    }

    /// Makes the next loaded page print even if its content is unchanged.
    pub fn forget_page(&mut self) {
        self.shown = None;
    }
}

pub async fn run_documents(
    page: usize,
    as_json: bool,
    interactive: bool,
    global_profile: Option<&str>,
    api_url: Option<String>,
) -> Result<(), CliError> {
    if page == 0 {
        return Err(CliError::InvalidPage);
    }
    let environment = load_environment(global_profile, api_url)?;
    let (mut shell, _monitor) = open_protected_shell(&environment, Route::Dashboard)?;

    {
        let view = dashboard(&shell)?;
        let mut updates = view.subscribe();
        wait_for_window(&mut updates, view.window().request()).await?;
        if page > 1 && view.jump_to_page(page) {
            wait_for_window(&mut updates, view.window().request()).await?;
        }
    }

    if interactive {
        browse(&mut shell).await
    } else {
        print_page(dashboard(&shell)?, as_json)
    }
}

fn dashboard(shell: &Shell<KeyringStorage>) -> Result<&DashboardView, CliError> {
    match shell.visible_view() {
        Some(MountedView::Dashboard(view)) => Ok(view),
        _ => Err(CliError::SessionEnded),
    }
}

async fn wait_for_window(
    updates: &mut watch::Receiver<PageState<Document>>,
    request: PageRequest,
) -> Result<(), CliError> {
    loop {
        {
            let state = updates.borrow_and_update();
            if state.loaded == Some(request) {
                return Ok(());
            }
            if let Some(message) = &state.last_error {
                return Err(CliError::Fetch {
                    what: "documents",
                    message: message.clone(),
                });
            }
        }
        if updates.changed().await.is_err() {
            return Err(CliError::SessionEnded);
        }
    }
}

fn print_page(view: &DashboardView, as_json: bool) -> Result<(), CliError> {
    let state = view.snapshot();
    let window = view.window();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&page_to_list(&state, window))?);
    } else {
        for line in format_document_lines(&state.items) {
            println!("{line}");
        }
        println!("{}", format_page_footer(window));
    }
    Ok(())
}

async fn browse(shell: &mut Shell<KeyringStorage>) -> Result<(), CliError> {
    enum Input {
        Line(Option<String>),
        PageChanged,
        Shell(ShellEvent),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut updates = dashboard(shell)?.subscribe();
    let mut echoes = PageEchoes::default();
    {
        let view = dashboard(shell)?;
        echoes.observe(&updates.borrow_and_update(), view.window().request());
        print_page(view, false)?;
    }
    println!("{BROWSE_HELP}");

    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            changed = updates.changed() => {
                if changed.is_err() {
                    return Err(CliError::SessionEnded);
                }
                Input::PageChanged
            }
            event = shell.next_event() => Input::Shell(event),
        };

        match input {
            Input::Line(None) => return Ok(()),
            Input::Line(Some(line)) => {
                let view = dashboard(shell)?;
                match parse_browse_command(&line) {
                    BrowseCommand::Next => {
                        if !view.next_page() {
                            println!("Already on the last page.");
                        }
                    }
                    BrowseCommand::Prev => {
                        if !view.prev_page() {
                            println!("Already on the first page.");
                        }
                    }
                    BrowseCommand::Jump(page) => {
                        if !view.jump_to_page(page) {
                            println!("{}", format_page_footer(view.window()));
                        }
                    }
                    BrowseCommand::Refresh => {
                        echoes.forget_page();
                        view.refresh();
                    }
                    BrowseCommand::Quit => return Ok(()),
                    BrowseCommand::Help => println!("{BROWSE_HELP}"),
                }
            }
            Input::PageChanged => {
                let view = dashboard(shell)?;
                let echo = echoes.observe(&updates.borrow_and_update(), view.window().request());
                match echo {
                    PageEcho::Page => print_page(view, false)?,
                    PageEcho::RefreshFailed(message) => {
                        eprintln!("Refresh failed, showing last loaded page: {message}");
                    }
                    PageEcho::Quiet => {}
                }
            }
            Input::Shell(ShellEvent::Closed) => return Ok(()),
            Input::Shell(_) => {
                if shell.route() != &Route::Dashboard {
                    return Err(CliError::SessionEnded);
                }
            }
        }
    }
}
