//! HTTP client for a running CronSync service, used by the CLI

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::web::responses::{
    ErrorResponse, JobsResponse, MessageResponse, ScheduleJobResponse, StatsResponse,
};

pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API URL: {base_url}"))?;
        if base_url.cannot_be_a_base() {
            bail!("Invalid API URL: {base_url}");
        }
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    /// Append path segments to the base URL; each one is percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Invalid API URL: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn schedule(
        &self,
        name: &str,
        cron_pattern: &str,
        script: &str,
    ) -> Result<ScheduleJobResponse> {
        let response = self
            .client
            .post(self.url(&["jobs"])?)
            .json(&json!({
                "name": name,
                "cronPattern": cron_pattern,
                "script": script,
            }))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn list(&self) -> Result<JobsResponse> {
        let response = self.client.get(self.url(&["jobs"])?).send().await?;
        decode(response).await
    }

    pub async fn stop(&self, job_id: &str) -> Result<MessageResponse> {
        let response = self
            .client
            .delete(self.url(&["jobs", job_id])?)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn stop_all(&self) -> Result<MessageResponse> {
        let response = self.client.post(self.url(&["jobs", "stop-all"])?).send().await?;
        decode(response).await
    }

    pub async fn stats(&self, name: &str) -> Result<StatsResponse> {
        let response = self
            .client
            .get(self.url(&["jobs", name, "stats"])?)
            .send()
            .await?;
        decode(response).await
    }
}

/// Decode a success body, or turn the server's `{ "error": ... }` into an error
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
        return Err(anyhow!(error.error));
    }
    if body.is_empty() {
        Err(anyhow!("{}", status))
    } else {
        Err(anyhow!(body))
    }
}
