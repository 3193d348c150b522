use finalyzer_core::util::{is_http_url, normalize_text_option};

use crate::cli::ConfigCommands;
use crate::commands::common::load_environment;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Values passed to `config init`; unset fields keep the stored profile value.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub api_base_url: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub page_size: Option<usize>,
    pub dashboard_refresh_secs: Option<u64>,
    pub upload_query: Option<String>,
}

pub fn run_config(
    command: ConfigCommands,
    global_profile: Option<&str>,
    api_url: Option<String>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_base_url,
            poll_interval,
            page_size,
            refresh_interval,
            upload_query,
            no_activate,
        } => run_config_init(
            global_profile,
            ProfileUpdate {
                api_base_url: api_base_url.or(api_url),
                poll_interval_secs: poll_interval,
                page_size,
                dashboard_refresh_secs: refresh_interval,
                upload_query,
            },
            no_activate,
        ),
        ConfigCommands::Show { json } => run_config_show(global_profile, api_url, json),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load()?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    apply_profile_update(profile, update)?;
    // Reject values the client could not start with before persisting them.
    profile.to_client_config(None)?;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save()?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );
    println!("Run `finalyzer auth login --email <email> --password <password>` to sign in.");
    Ok(())
}

pub fn apply_profile_update(profile: &mut CliProfile, update: ProfileUpdate) -> Result<(), CliError> {
    if let Some(url) = normalize_text_option(update.api_base_url) {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "api_base_url must include http:// or https://".to_string(),
            ));
        }
        profile.api_base_url = Some(url.trim_end_matches('/').to_string());
    }
    if let Some(secs) = update.poll_interval_secs {
        if secs == 0 {
            return Err(CliError::Config(
                "poll_interval must be at least one second".to_string(),
            ));
        }
        profile.poll_interval_secs = Some(secs);
    }
    if let Some(size) = update.page_size {
        if size == 0 {
            return Err(CliError::Config("page_size must be at least 1".to_string()));
        }
        profile.page_size = Some(size);
    }
    if let Some(secs) = update.dashboard_refresh_secs {
        profile.dashboard_refresh_secs = Some(secs);
    }
    if let Some(query) = normalize_text_option(update.upload_query) {
        profile.upload_query = Some(query);
    }
    Ok(())
}

fn run_config_show(
    global_profile: Option<&str>,
    api_url: Option<String>,
    as_json: bool,
) -> Result<(), CliError> {
    let environment = load_environment(global_profile, api_url)?;
    let config = &environment.config;
    if as_json {
        let rendered = serde_json::json!({
            "profile": environment.profile_name,
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&rendered)?);
        return Ok(());
    }

    println!("profile:            {}", environment.profile_name);
    println!("api_base_url:       {}", config.api_base_url);
    println!("poll_interval_secs: {}", config.poll_interval_secs);
    println!("page_size:          {}", config.page_size);
    println!(
        "dashboard_refresh:  {}",
        config
            .dashboard_refresh()
            .map_or_else(|| "off".to_string(), |every| format!("{}s", every.as_secs()))
    );
    println!("upload_query:       {}", config.upload_query);
    Ok(())
}
