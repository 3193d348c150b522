use std::io::{self, Write};
use std::path::Path;

use finalyzer_core::router::Route;
use finalyzer_core::upload::UploadFile;
use finalyzer_core::util::normalize_text_option;
use finalyzer_core::views::MountedView;

use crate::commands::analysis::follow_analysis;
use crate::commands::common::{format_progress, load_environment, open_protected_shell};
use crate::error::CliError;

pub async fn run_upload(
    path: &Path,
    query: Option<String>,
    watch: bool,
    global_profile: Option<&str>,
    api_url: Option<String>,
) -> Result<(), CliError> {
    let mut environment = load_environment(global_profile, api_url)?;
    if let Some(query) = normalize_text_option(query) {
        environment.config.upload_query = query;
    }

    let file = UploadFile::from_path(path).await?;
    let (mut shell, _monitor) = open_protected_shell(&environment, Route::Upload)?;

    let MountedView::Upload(view) = shell.view_mut() else {
        return Err(CliError::SessionEnded);
    };
    view.select_file(file);

    let mut progress = view.progress();
    let reporter = tokio::spawn(async move {
        let mut stderr = io::stderr();
        while progress.changed().await.is_ok() {
            let percent = *progress.borrow_and_update();
            let _ = write!(stderr, "\rUploading {}", format_progress(percent));
            let _ = stderr.flush();
        }
    });

    let result = view.submit().await;
    reporter.abort();
    eprintln!();

    let document_id = result?;
    println!("Uploaded {} as {document_id}", path.display());

    if !watch {
        println!("Run `finalyzer analysis {document_id}` to follow the analysis.");
        return Ok(());
    }

    let Some(route) = view.analysis_route() else {
        return Ok(());
    };
    shell.navigate(route);
    follow_analysis(&mut shell, false, false).await
}
