use finalyzer_core::api::SignUpOutcome;
use finalyzer_core::router::{NavigationRequests, Route};

use crate::cli::AuthCommands;
use crate::commands::common::{api_client, load_environment, open_session, route_hint};
use crate::error::CliError;

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";

pub async fn run_auth(
    command: AuthCommands,
    global_profile: Option<&str>,
    api_url: Option<String>,
) -> Result<(), CliError> {
    let environment = load_environment(global_profile, api_url)?;
    let profile_name = environment.profile_name.clone();

    match command {
        AuthCommands::Register {
            email,
            password,
            role,
        } => {
            let client = api_client(&environment)?;
            let role = role.unwrap_or_else(|| environment.config.default_role.clone());
            let outcome = client
                .register(&email, &password, &role)
                .await
                .map_err(|error| CliError::Auth(error.user_message(REGISTRATION_FAILED)))?;

            let (session, mut requests) = open_session(&environment);
            match outcome {
                SignUpOutcome::SignedIn(credential) => {
                    session.login(credential)?;
                    println!("Registered and signed in profile '{profile_name}' as {email}");
                }
                SignUpOutcome::LoginRequired => {
                    session.navigator().navigate(Route::Login);
                    println!("Registered {email}. Sign in to continue.");
                }
            }
            print_next_step(&mut requests);
            Ok(())
        }
        AuthCommands::Login { email, password } => {
            let client = api_client(&environment)?;
            let credential = client
                .login(&email, &password)
                .await
                .map_err(|error| CliError::Auth(error.user_message(LOGIN_FAILED)))?;

            let (session, mut requests) = open_session(&environment);
            session.login(credential)?;
            println!("Signed in profile '{profile_name}' as {email}");
            print_next_step(&mut requests);
            Ok(())
        }
        AuthCommands::Status => {
            let (session, _requests) = open_session(&environment);
            if session.is_authenticated() {
                println!(
                    "Profile '{profile_name}' is signed in ({})",
                    environment.config.api_base_url
                );
            } else {
                println!("Profile '{profile_name}' is not signed in.");
            }
            Ok(())
        }
        AuthCommands::Logout => {
            let (session, _requests) = open_session(&environment);
            session.logout()?;
            println!("Signed out profile '{profile_name}'");
            Ok(())
        }
    }
}

fn print_next_step(requests: &mut NavigationRequests) {
    let mut last = None;
    while let Some(route) = requests.try_recv() {
        last = Some(route);
    }
    if let Some(route) = last {
        tracing::debug!("Session navigated to {}", route);
        println!("{}", route_hint(&route));
    }
}
