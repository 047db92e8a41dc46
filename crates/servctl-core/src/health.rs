use std::time::Duration;

use crate::config::Config;
use crate::poll::wait_until;

/// One bounded health-check run against the server's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub url: String,
    /// Substring the response body must contain for an attempt to pass.
    pub content: Option<String>,
    pub attempt_timeout: Duration,
    pub overall_timeout: Duration,
    pub interval: Duration,
}

impl HealthCheck {
    /// Builds the check from configuration; `None` when no URL is set.
    pub fn from_config(config: &Config) -> Option<Self> {
        let url = config.health_url.clone()?;
        Some(Self {
            url,
            content: config.health_content.clone(),
            attempt_timeout: config.health_attempt_timeout,
            overall_timeout: config.health_timeout,
            interval: config.poll_interval,
        })
    }
}

/// Polls `check.url` until an attempt passes or the overall window
/// closes. An attempt passes on a status in [100,400) whose body contains
/// `check.content` (when set). Connection errors and per-attempt timeouts
/// count as failed attempts; only a window with no passing attempt fails
/// the check.
pub fn check(check: &HealthCheck) -> bool {
    let client = match reqwest::blocking::Client::builder()
        .timeout(check.attempt_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
    {
        Ok(client) => client,
        Err(_) => return false,
    };
    wait_until(
        check.overall_timeout,
        check.interval,
        || attempt(&client, check),
        std::thread::sleep,
    )
}

fn attempt(client: &reqwest::blocking::Client, check: &HealthCheck) -> bool {
    let response = match client.get(&check.url).send() {
        Ok(response) => response,
        Err(_) => return false,
    };
    let status = response.status().as_u16();
    if !(100..400).contains(&status) {
        return false;
    }
    match &check.content {
        None => true,
        Some(needle) => response.text().is_ok_and(|body| body.contains(needle)),
    }
}
