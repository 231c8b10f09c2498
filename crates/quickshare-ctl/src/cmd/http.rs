//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

pub async fn get_json<T: DeserializeOwned>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to quickshared at {} — is it running?", url))?
        .error_for_status()
        .context("quickshared returned an error response")?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn post_json<T: DeserializeOwned>(url: &str) -> Result<T> {
    reqwest::Client::new()
        .post(url)
        .send()
        .await
        .with_context(|| format!("failed to connect to quickshared at {} — is it running?", url))?
        .error_for_status()
        .context("quickshared returned an error response")?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn post_json_body<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: DeserializeOwned,
{
    reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("failed to connect to quickshared at {} — is it running?", url))?
        .error_for_status()
        .context("quickshared returned an error response")?
        .json::<R>()
        .await
        .context("failed to parse response")
}
