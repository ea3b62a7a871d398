// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Normalized webhook responses produced by the output and status templates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw HTTP response as seen by output and status templates.
///
/// Serializes as `{"Headers": {...}, "Body": ...}` so templates can address
/// `{{.Headers.Location}}` and `{{.Body.error}}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseData {
    #[serde(rename = "Headers")]
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "Body")]
    pub body: Value,
}

/// Outcome of a webhook call, as extracted by its output template.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub success_status_code: Option<u16>,
    #[serde(default)]
    pub incomplete_status_code: Option<u16>,
    #[serde(default)]
    pub gone_status_code: Option<u16>,
    #[serde(default)]
    pub error: Option<String>,
    /// Configuration returned by the remote system, any JSON shape.
    #[serde(default)]
    pub config: Option<Value>,
    /// HTTP status the call actually returned.
    #[serde(skip)]
    pub actual_status_code: u16,
}

impl Response {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.success_status_code.is_none() {
            return Err("missing Output Template success status code field".to_string());
        }
        if self.error.is_none() {
            return Err("missing Output Template error field".to_string());
        }
        Ok(())
    }

    pub fn is_success(&self) -> bool {
        self.success_status_code == Some(self.actual_status_code)
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete_status_code == Some(self.actual_status_code)
    }

    /// Non-empty error reported by the remote system.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// Returned configuration, ignoring `null` and empty strings.
    ///
    /// A string that itself holds JSON is decoded.
    pub fn config_value(&self) -> Option<Value> {
        match self.config.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(
                serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
            ),
            other => Some(other.clone()),
        }
    }

    /// Location to poll, ignoring empty strings.
    pub fn poll_location(&self) -> Option<&str> {
        self.location.as_deref().filter(|l| !l.is_empty())
    }
}

/// Three-way interpretation of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollOutcome {
    Success,
    Pending,
    Failed,
}

/// Operation status, as extracted by a webhook's status template.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub success_status_code: Option<u16>,
    #[serde(default)]
    pub success_status_identifier: Option<String>,
    #[serde(default)]
    pub in_progress_status_identifier: Option<String>,
    #[serde(default)]
    pub failed_status_identifier: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(skip)]
    pub actual_status_code: u16,
}

impl ResponseStatus {
    pub(crate) fn validate(&self) -> Result<(), String> {
        let required = [
            ("status", self.status.is_some()),
            ("success status code", self.success_status_code.is_some()),
            (
                "success status identifier",
                self.success_status_identifier.is_some(),
            ),
            (
                "in progress status identifier",
                self.in_progress_status_identifier.is_some(),
            ),
            (
                "failed status identifier",
                self.failed_status_identifier.is_some(),
            ),
            ("error", self.error.is_some()),
        ];

        match required.iter().find(|(_, present)| !present) {
            Some((name, _)) => Err(format!("missing Status Template {} field", name)),
            None => Ok(()),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// Maps the reported status onto success, failure or still running.
    pub fn outcome(&self) -> PollOutcome {
        let status = self.status.as_deref();
        if status.is_some() && status == self.success_status_identifier.as_deref() {
            PollOutcome::Success
        } else if status.is_some() && status == self.failed_status_identifier.as_deref() {
            PollOutcome::Failed
        } else {
            PollOutcome::Pending
        }
    }
}

/// Canonical MIME form of a header name: `x-correlation-id` becomes `X-Correlation-Id`.
pub fn canonical_header_key(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_header_key() {
        assert_eq!(canonical_header_key("location"), "Location");
        assert_eq!(canonical_header_key("x-correlation-id"), "X-Correlation-Id");
        assert_eq!(canonical_header_key("CONTENT-TYPE"), "Content-Type");
    }

    #[test]
    fn test_response_validation() {
        let response: Response =
            serde_json::from_value(json!({"location": "https://x", "error": ""})).unwrap();
        assert_eq!(
            response.validate().unwrap_err(),
            "missing Output Template success status code field"
        );

        let response: Response =
            serde_json::from_value(json!({"success_status_code": 200})).unwrap();
        assert_eq!(
            response.validate().unwrap_err(),
            "missing Output Template error field"
        );
    }

    #[test]
    fn test_status_validation_reports_first_missing_field() {
        let status: ResponseStatus = serde_json::from_value(json!({
            "status": "",
            "success_status_identifier": "SUCCEEDED",
            "in_progress_status_identifier": "IN_PROGRESS",
            "failed_status_identifier": "FAILED",
            "error": ""
        }))
        .unwrap();
        assert_eq!(
            status.validate().unwrap_err(),
            "missing Status Template success status code field"
        );
    }

    #[test]
    fn test_poll_outcome() {
        let mut status = ResponseStatus {
            status: Some("SUCCEEDED".into()),
            success_status_identifier: Some("SUCCEEDED".into()),
            in_progress_status_identifier: Some("IN_PROGRESS".into()),
            failed_status_identifier: Some("FAILED".into()),
            ..Default::default()
        };
        assert_eq!(status.outcome(), PollOutcome::Success);

        status.status = Some("FAILED".into());
        assert_eq!(status.outcome(), PollOutcome::Failed);

        status.status = Some("IN_PROGRESS".into());
        assert_eq!(status.outcome(), PollOutcome::Pending);

        status.status = Some("SOMETHING_ELSE".into());
        assert_eq!(status.outcome(), PollOutcome::Pending);
    }

    #[test]
    fn test_config_value() {
        let mut response = Response::default();
        assert_eq!(response.config_value(), None);

        response.config = Some(json!(""));
        assert_eq!(response.config_value(), None);

        response.config = Some(json!("{\"key\":\"value\"}"));
        assert_eq!(response.config_value(), Some(json!({"key": "value"})));

        response.config = Some(json!({"nested": true}));
        assert_eq!(response.config_value(), Some(json!({"nested": true})));
    }
}
