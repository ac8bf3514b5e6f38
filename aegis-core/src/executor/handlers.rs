//! Built-in step handlers.
//!
//! These wrap the external systems a real deployment would call (chat
//! webhooks, EDR, firewall). Where no external endpoint is configured they
//! log the action and report success, so playbooks stay runnable in
//! development. All of them are safe to re-execute under retry.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{AegisError, AegisResult};
use crate::models::{Alert, AlertStatus, Step, StepAction};

use super::{AlertIntent, StepExecution, StepHandler};

fn step_error(action: StepAction, message: impl Into<String>) -> AegisError {
    AegisError::StepExecution {
        action: action.name().to_string(),
        message: message.into(),
    }
}

/// Sends a notification. With a `webhook_url` param the message is POSTed
/// as JSON; without one the notification is logged only.
pub struct NotifyHandler {
    client: reqwest::Client,
}

impl NotifyHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StepHandler for NotifyHandler {
    fn action(&self) -> StepAction {
        StepAction::Notify
    }

    async fn execute(
        &self,
        step: &Step,
        alert: &Alert,
        attempt: u32,
    ) -> AegisResult<StepExecution> {
        let message = step
            .param_str("message")
            .unwrap_or("alert notification")
            .to_string();

        let Some(url) = step.param_str("webhook_url") else {
            info!(alert_id = %alert.id, %message, "Notification (no webhook configured)");
            return Ok(StepExecution::ok().with_detail(json!({ "delivered": "log" })));
        };

        let payload = json!({
            "alert_id": alert.id,
            "title": alert.title,
            "severity": alert.severity,
            "source": alert.source,
            "message": message,
            "attempt": attempt,
        });

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| step_error(StepAction::Notify, format!("webhook request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(step_error(
                StepAction::Notify,
                format!("webhook returned status {}", response.status()),
            ));
        }

        info!(alert_id = %alert.id, webhook = url, "Notification delivered");
        Ok(StepExecution::ok().with_detail(json!({ "delivered": "webhook" })))
    }
}

/// Adds a tag to the alert via an intent.
pub struct TagHandler;

#[async_trait]
impl StepHandler for TagHandler {
    fn action(&self) -> StepAction {
        StepAction::Tag
    }

    async fn execute(
        &self,
        step: &Step,
        _alert: &Alert,
        _attempt: u32,
    ) -> AegisResult<StepExecution> {
        let tag = step
            .param_str("tag")
            .ok_or_else(|| step_error(StepAction::Tag, "missing 'tag' parameter"))?;
        Ok(StepExecution::ok().with_intent(AlertIntent::AddTag {
            tag: tag.to_string(),
        }))
    }
}

/// Blocks an offending IP at the perimeter. The address comes from the
/// `ip` param or the alert's `ip_address` attribute.
pub struct BlockIpHandler;

#[async_trait]
impl StepHandler for BlockIpHandler {
    fn action(&self) -> StepAction {
        StepAction::BlockIp
    }

    async fn execute(
        &self,
        step: &Step,
        alert: &Alert,
        _attempt: u32,
    ) -> AegisResult<StepExecution> {
        let ip = step
            .param_str("ip")
            .map(str::to_string)
            .or_else(|| {
                alert
                    .attributes
                    .get("ip_address")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .ok_or_else(|| {
                step_error(
                    StepAction::BlockIp,
                    "no 'ip' parameter and alert has no ip_address attribute",
                )
            })?;

        if ip.parse::<std::net::IpAddr>().is_err() {
            return Err(step_error(
                StepAction::BlockIp,
                format!("'{ip}' is not a valid IP address"),
            ));
        }

        info!(alert_id = %alert.id, %ip, "Blocking IP at perimeter");
        Ok(StepExecution::ok()
            .with_intent(AlertIntent::AddTag {
                tag: "ip-blocked".to_string(),
            })
            .with_intent(AlertIntent::SetAttribute {
                key: "blocked_ip".to_string(),
                value: json!(ip),
            }))
    }
}

/// Isolates a host from the network. Host comes from the `hostname` param
/// or the alert's `hostname` attribute.
pub struct QuarantineHostHandler;

#[async_trait]
impl StepHandler for QuarantineHostHandler {
    fn action(&self) -> StepAction {
        StepAction::QuarantineHost
    }

    async fn execute(
        &self,
        step: &Step,
        alert: &Alert,
        _attempt: u32,
    ) -> AegisResult<StepExecution> {
        let host = step
            .param_str("hostname")
            .map(str::to_string)
            .or_else(|| {
                alert
                    .attributes
                    .get("hostname")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .ok_or_else(|| {
                step_error(
                    StepAction::QuarantineHost,
                    "no 'hostname' parameter and alert has no hostname attribute",
                )
            })?;

        info!(alert_id = %alert.id, hostname = %host, "Quarantining host");
        Ok(StepExecution::ok()
            .with_intent(AlertIntent::AddTag {
                tag: "quarantined".to_string(),
            })
            .with_intent(AlertIntent::SetAttribute {
                key: "quarantined_host".to_string(),
                value: json!(host),
            }))
    }
}

/// Requests a severity escalation, optionally moving status to
/// investigating when `set_investigating` is true.
pub struct EscalateHandler;

#[async_trait]
impl StepHandler for EscalateHandler {
    fn action(&self) -> StepAction {
        StepAction::Escalate
    }

    async fn execute(
        &self,
        step: &Step,
        alert: &Alert,
        _attempt: u32,
    ) -> AegisResult<StepExecution> {
        let mut execution = StepExecution::ok().with_intent(AlertIntent::Escalate);
        if step
            .params
            .get("set_investigating")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            execution = execution.with_intent(AlertIntent::SetStatus {
                status: AlertStatus::Investigating,
            });
        }
        info!(alert_id = %alert.id, severity = %alert.severity, "Escalation requested");
        Ok(execution)
    }
}

/// Dispatches a named response script. Script names are allow-listed; the
/// list is also checked at playbook save time, this is the runtime backstop.
pub struct RunScriptHandler {
    allow_list: Vec<String>,
}

impl RunScriptHandler {
    pub fn new(allow_list: Vec<String>) -> Self {
        Self { allow_list }
    }
}

#[async_trait]
impl StepHandler for RunScriptHandler {
    fn action(&self) -> StepAction {
        StepAction::RunScript
    }

    async fn execute(
        &self,
        step: &Step,
        alert: &Alert,
        _attempt: u32,
    ) -> AegisResult<StepExecution> {
        let script = step
            .param_str("script")
            .ok_or_else(|| step_error(StepAction::RunScript, "missing 'script' parameter"))?;

        if !self.allow_list.iter().any(|s| s == script) {
            warn!(alert_id = %alert.id, %script, "Rejected script not on allow-list");
            return Err(step_error(
                StepAction::RunScript,
                format!("script '{script}' is not on the allow-list"),
            ));
        }

        info!(alert_id = %alert.id, %script, "Dispatched response script");
        Ok(StepExecution::ok().with_detail(json!({ "script": script, "dispatched": true })))
    }
}

/// Pauses between steps. The duration is capped at validation time; the
/// per-step timeout still applies on top.
pub struct WaitHandler;

/// Upper bound on a single wait step, matching playbook validation.
pub const MAX_WAIT_SECS: u64 = 300;

#[async_trait]
impl StepHandler for WaitHandler {
    fn action(&self) -> StepAction {
        StepAction::Wait
    }

    async fn execute(
        &self,
        step: &Step,
        _alert: &Alert,
        _attempt: u32,
    ) -> AegisResult<StepExecution> {
        let seconds = step
            .param_u64("seconds")
            .ok_or_else(|| step_error(StepAction::Wait, "missing 'seconds' parameter"))?;
        let seconds = seconds.min(MAX_WAIT_SECS);
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        Ok(StepExecution::ok())
    }
}
