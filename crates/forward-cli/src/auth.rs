//! Account login.
//!
//! User-facing output goes through the console (this is a CLI binary, not debug output).

use std::path::Path;

use tracing::{debug, info};

use crate::api::ControlApi;
use crate::config::CliConfig;
use crate::console::Console;
use crate::error::ClientError;
use crate::prompt::Prompt;

/// Make sure `api` carries an API token, logging in when none is stored.
///
/// A token obtained by logging in is saved to `config_dir` for later runs.
pub async fn ensure_api_token(
    api: &dyn ControlApi,
    prompt: &dyn Prompt,
    console: &Console,
    config_dir: &Path,
) -> Result<(), ClientError> {
    let mut config = CliConfig::load(config_dir);
    if let Some(token) = config.token() {
        debug!("Using stored API token");
        api.authorize(token);
        return Ok(());
    }

    console.line("Enter your email and password");
    let login = prompt.login()?;
    debug!(email = %login.email, "Authenticating user");

    let user = api
        .api_token(&login.email, &login.password)
        .await
        .map_err(ClientError::Login)?;
    api.authorize(&user.api_token);

    config.email = Some(user.email.unwrap_or(login.email));
    config.api_token = Some(user.api_token);
    config
        .save(config_dir)
        .map_err(|e| ClientError::Settings(e.to_string()))?;
    info!(path = %CliConfig::config_path(config_dir).display(), "Saved API token");
    Ok(())
}
