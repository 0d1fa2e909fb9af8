use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::CONTENT_TYPE, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::ReportError;

pub const REPORTING_URL_ENV: &str = "KH_REPORTING_URL";
pub const RUN_UUID_ENV: &str = "KH_RUN_UUID";
pub const RUN_DEADLINE_ENV: &str = "KH_CHECK_RUN_DEADLINE";

pub const RUN_UUID_HEADER: &str = "kh-run-uuid";

/// Request timeout used when Kuberhealthy did not hand out a run deadline.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Floor for the request timeout once the run deadline has (nearly) passed.
pub const MIN_REPORT_TIMEOUT: Duration = Duration::from_secs(1);

/// Body Kuberhealthy expects on its reporting endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Report {
    #[serde(rename = "OK")]
    pub ok: bool,
    #[serde(rename = "Errors")]
    pub errors: Vec<String>,
}

impl Report {
    pub fn success() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
        }
    }

    pub fn failure(errors: Vec<String>) -> Self {
        Self { ok: false, errors }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report_success(&self) -> Result<(), ReportError>;

    async fn report_failure(&self, messages: Vec<String>) -> Result<(), ReportError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReporterSettings {
    pub reporting_url: Option<String>,
    pub run_uuid: String,
    pub deadline: Option<DateTime<Utc>>,
}

impl ReporterSettings {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let deadline = read(RUN_DEADLINE_ENV).and_then(|value| {
            let parsed = value
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
            if parsed.is_none() {
                warn!("Ignoring unparseable {}: {}", RUN_DEADLINE_ENV, value);
            }
            parsed
        });

        Self {
            reporting_url: read(REPORTING_URL_ENV),
            run_uuid: read(RUN_UUID_ENV).unwrap_or_default(),
            deadline,
        }
    }

    /// How long a report may take given the time left until the run deadline.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_at(Utc::now())
    }

    fn request_timeout_at(&self, now: DateTime<Utc>) -> Duration {
        match self.deadline {
            Some(deadline) => (deadline - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .max(MIN_REPORT_TIMEOUT),
            None => DEFAULT_REPORT_TIMEOUT,
        }
    }

    pub fn url(&self) -> Result<Url, ReportError> {
        let raw = self.reporting_url.as_deref().ok_or(ReportError::MissingUrl)?;
        Url::parse(raw).map_err(|e| ReportError::InvalidUrl {
            url: raw.to_string(),
            message: e.to_string(),
        })
    }
}

/// Posts check results to the Kuberhealthy instance that scheduled this run.
pub struct KuberhealthyReporter {
    client: reqwest::Client,
    settings: ReporterSettings,
}

impl KuberhealthyReporter {
    pub fn from_env() -> Result<Self, ReportError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = ReporterSettings::from_lookup(lookup);
        if let Some(deadline) = settings.deadline {
            info!("Check run deadline: {}", deadline.to_rfc3339());
        }

        let client = reqwest::Client::builder().build().map_err(|e| {
            error!("failed to build the Kuberhealthy client: {}", e);
            ReportError::Transport(e)
        })?;

        Ok(Self::with_client(settings, client))
    }

    pub fn with_client(settings: ReporterSettings, client: reqwest::Client) -> Self {
        Self { client, settings }
    }

    async fn send(&self, report: &Report) -> Result<(), ReportError> {
        let url = self.settings.url()?;
        let body = serde_json::to_vec(report)?;

        let timeout = self.settings.request_timeout();

        info!("Sending report to {}: ok={}", url, report.ok);
        debug!("Report request timeout: {:?}", timeout);

        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(RUN_UUID_HEADER, &self.settings.run_uuid)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Reporter for KuberhealthyReporter {
    async fn report_success(&self) -> Result<(), ReportError> {
        self.send(&Report::success()).await
    }

    async fn report_failure(&self, messages: Vec<String>) -> Result<(), ReportError> {
        self.send(&Report::failure(messages)).await
    }
}
