use crate::commands::common::{api_client, load_environment};
use crate::error::CliError;

pub async fn run_health(
    global_profile: Option<&str>,
    api_url: Option<String>,
) -> Result<(), CliError> {
    let environment = load_environment(global_profile, api_url)?;
    let client = api_client(&environment)?;
    let health = client.health().await?;
    match health.version {
        Some(version) => println!(
            "{}: {} (version {version})",
            client.base_url(),
            health.status
        ),
        None => println!("{}: {}", client.base_url(), health.status),
    }
    Ok(())
}
