//! Collaborator commands.
//!
//! ```bash
//! pushnotif vapid-key
//! pushnotif trigger --channel orders --event created --data '{"title":"New order"}'
//! ```

use anyhow::{Context, Result};
use serde_json::Value;

use crate::api::{ApiClient, TriggerRequest, TriggerResponse};
use crate::config::Config;

/// Prints the collaborator's VAPID public key.
///
/// # Errors
///
/// Returns an error if the collaborator cannot be reached.
pub async fn vapid_key(config: &Config) -> Result<()> {
    let client = ApiClient::from_config(config)?;
    let key = client
        .vapid_public_key()
        .await
        .context("Failed to fetch VAPID public key")?;
    println!("{key}");
    Ok(())
}

/// Parses the `--data` argument. Missing data becomes `{}`.
///
/// # Errors
///
/// Returns an error if `data` is not valid JSON.
pub fn parse_data(data: Option<&str>) -> Result<Option<Value>> {
    data.map(|raw| serde_json::from_str(raw).context("--data must be valid JSON"))
        .transpose()
}

/// Sends a trigger and returns the collaborator's answer.
///
/// # Errors
///
/// Returns an error if the data is invalid or the request fails.
pub async fn send_trigger(
    config: &Config,
    channels: Vec<String>,
    event: &str,
    data: Option<&str>,
) -> Result<TriggerResponse> {
    let client = ApiClient::from_config(config)?;
    let request = TriggerRequest::new(channels, event, parse_data(data)?);
    let response = client
        .trigger(&request)
        .await
        .with_context(|| format!("Failed to trigger '{event}'"))?;
    log::info!(
        "[Api] Trigger '{event}' -> sent={:?} failed={:?}",
        response.sent,
        response.failed
    );
    Ok(response)
}

/// Sends a trigger and prints the response as JSON.
///
/// # Errors
///
/// See [`send_trigger`].
pub async fn trigger(
    config: &Config,
    channels: Vec<String>,
    event: &str,
    data: Option<&str>,
) -> Result<()> {
    let response = send_trigger(config, channels, event, data).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
