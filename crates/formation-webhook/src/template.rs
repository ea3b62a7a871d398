// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Template rendering for webhook requests and responses.
//!
//! Every webhook carries up to five templates:
//!
//! | Template | Rendered against | Produces |
//! |----------|------------------|----------|
//! | URL      | request object   | `{"method": ..., "path": ...}` |
//! | input    | request object   | JSON request body |
//! | headers  | request object   | `{"Name": "v"}` or `{"Name": ["v1", "v2"]}` |
//! | output   | HTTP response    | [`Response`] |
//! | status   | poll response    | [`ResponseStatus`] |
//!
//! Templates use Jinja syntax. Go-style leading-dot access such as
//! `{{.Application.ID}}` is accepted and rewritten to `{{ Application.ID }}`.
//!
//! Maps and sequences are written as JSON escaped for use inside a JSON string
//! literal. In response templates strings are escaped the same way, so remote
//! payloads containing quotes or newlines stay valid JSON. Request templates
//! insert strings verbatim, which lets raw JSON text be embedded unquoted. Use
//! the `tojson` filter to embed a structured value unquoted.
//!
//! Only output expressions that start with a leading dot are rewritten. Go
//! control actions such as `{{ if .X }}`, `{{ range .X }}`, `{{ end }}` or
//! function calls like `eq` are rejected with an error naming the action;
//! write those parts in Jinja syntax (`{% if X %}`, `{% endif %}`).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use minijinja::value::ValueKind;
use minijinja::{Environment, ErrorKind, Output, State, UndefinedBehavior};
use serde::Deserialize;
use serde_json::Value;

use crate::error::WebhookError;
use crate::response::{Response, ResponseData, ResponseStatus};

const ALLOWED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Failure to render a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Which undefined-value policy a render uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Request templates address the known request object; printing an
    /// undefined value is an error.
    Request,
    /// Response templates address arbitrary remote payloads; undefined values
    /// and chained lookups on them render empty.
    Response,
}

/// Renders a template string against JSON data.
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, data: &Value, mode: RenderMode)
    -> Result<String, RenderError>;
}

/// [`Renderer`] backed by `minijinja`.
pub struct JinjaRenderer {
    request_env: Environment<'static>,
    response_env: Environment<'static>,
}

impl JinjaRenderer {
    pub fn new() -> Self {
        Self {
            request_env: build_environment(UndefinedBehavior::SemiStrict, format_request_value),
            response_env: build_environment(UndefinedBehavior::Chainable, format_response_value),
        }
    }
}

impl Default for JinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JinjaRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JinjaRenderer").finish_non_exhaustive()
    }
}

impl Renderer for JinjaRenderer {
    fn render(
        &self,
        template: &str,
        data: &Value,
        mode: RenderMode,
    ) -> Result<String, RenderError> {
        let env = match mode {
            RenderMode::Request => &self.request_env,
            RenderMode::Response => &self.response_env,
        };

        reject_go_actions(template)?;
        let source = normalize_field_access(template);
        env.render_str(&source, minijinja::Value::from_serialize(data))
            .map_err(|e| RenderError(describe_error(&e)))
    }
}

type Formatter =
    fn(&mut Output<'_>, &State<'_, '_>, &minijinja::Value) -> Result<(), minijinja::Error>;

fn build_environment(undefined: UndefinedBehavior, formatter: Formatter) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(undefined);
    env.set_formatter(formatter);
    env
}

fn format_request_value(
    out: &mut Output<'_>,
    _state: &State<'_, '_>,
    value: &minijinja::Value,
) -> Result<(), minijinja::Error> {
    write_value(out, value, false)
}

fn format_response_value(
    out: &mut Output<'_>,
    _state: &State<'_, '_>,
    value: &minijinja::Value,
) -> Result<(), minijinja::Error> {
    write_value(out, value, true)
}

fn write_value(
    out: &mut Output<'_>,
    value: &minijinja::Value,
    escape_strings: bool,
) -> Result<(), minijinja::Error> {
    let written = match value.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(()),
        ValueKind::Map | ValueKind::Seq if !value.is_safe() => {
            let json = serde_json::to_string(value)
                .map_err(|e| minijinja::Error::new(ErrorKind::BadSerialization, e.to_string()))?;
            out.write_str(&escape_for_json_string(&json))
        }
        ValueKind::String if escape_strings && !value.is_safe() => {
            out.write_str(&escape_for_json_string(value.as_str().unwrap_or_default()))
        }
        _ => write!(out, "{}", value),
    };

    written.map_err(|_| {
        minijinja::Error::new(ErrorKind::WriteFailure, "failed to write rendered value")
    })
}

/// Escapes `raw` so it can sit between the quotes of a JSON string.
fn escape_for_json_string(raw: &str) -> String {
    let quoted = Value::String(raw.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

fn describe_error(err: &minijinja::Error) -> String {
    match err.detail() {
        Some(detail) => format!("{}: {}", err.kind(), detail),
        None => err.kind().to_string(),
    }
}

const GO_KEYWORDS: [&str; 10] = [
    "if", "else", "end", "range", "with", "define", "template", "block", "break", "continue",
];

const GO_FUNCTIONS: [&str; 17] = [
    "eq", "ne", "lt", "le", "gt", "ge", "and", "or", "not", "len", "index", "printf", "print",
    "html", "js", "urlquery", "slice",
];

/// Fails on Go template actions, which have no leading-dot rewrite.
fn reject_go_actions(template: &str) -> Result<(), RenderError> {
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let body = rest[start + 2..].trim_start_matches('-').trim_start();
        rest = &rest[start + 2..];

        let ident_len = body
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(body.len());
        let (ident, tail) = body.split_at(ident_len);
        if ident.is_empty() {
            if body.starts_with('$') {
                return Err(RenderError(
                    "go template variables are not supported".to_string(),
                ));
            }
            continue;
        }

        let next = tail.trim_start();
        let keyword = GO_KEYWORDS.contains(&ident) && next.starts_with(['.', '$', '}', '-']);
        let call = GO_FUNCTIONS.contains(&ident)
            && tail.starts_with(char::is_whitespace)
            && next.starts_with(['.', '"', '$']);

        if keyword || call {
            return Err(RenderError(format!(
                "go template action {:?} is not supported, use Jinja syntax such as {{% if X %}}",
                ident
            )));
        }
    }

    Ok(())
}

/// Rewrites `{{.Field}}` and `{{- .Field}}` into Jinja attribute access.
///
/// Only a leading-dot expression directly after the opening delimiter is
/// rewritten; Go control actions are rejected by the renderer.
pub fn normalize_field_access(template: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let (before, after_open) = rest.split_at(start + 2);
        result.push_str(before);

        let trim_marker = if after_open.starts_with('-') { 1 } else { 0 };
        let (marker, body) = after_open.split_at(trim_marker);
        let leading_ws = body.len() - body.trim_start().len();
        let (ws, expr) = body.split_at(leading_ws);

        result.push_str(marker);
        result.push_str(ws);

        let mut chars = expr.chars();
        if chars.next() == Some('.')
            && chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            if ws.is_empty() {
                result.push(' ');
            }
            rest = &expr[1..];
        } else {
            rest = expr;
        }
    }

    result.push_str(rest);
    result
}

/// Method and target produced by a URL template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestUrl {
    pub method: String,
    pub path: String,
}

impl RequestUrl {
    fn validate(&self) -> Result<(), String> {
        let method = self.method.to_ascii_uppercase();
        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return Err(format!("unsupported http method {:?}", self.method));
        }

        let url = reqwest::Url::parse(&self.path)
            .map_err(|e| format!("invalid path {:?}: {}", self.path, e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(format!("unsupported url scheme {:?}", url.scheme()));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

/// A snapshot that webhook templates are evaluated against.
///
/// Implementors only supply [`template_data`](TemplateInput::template_data);
/// parsing of every template kind is shared.
pub trait TemplateInput: Send + Sync {
    /// JSON view of the object exposed to request templates.
    fn template_data(&self) -> Value;

    fn parse_url_template(
        &self,
        renderer: &dyn Renderer,
        template: &str,
    ) -> Result<RequestUrl, WebhookError> {
        let rendered = renderer
            .render(template, &self.template_data(), RenderMode::Request)
            .map_err(|e| WebhookError::UrlTemplate(e.to_string()))?;

        let url: RequestUrl = serde_json::from_str(&rendered)
            .map_err(|e| WebhookError::UrlTemplate(e.to_string()))?;
        url.validate().map_err(WebhookError::UrlTemplate)?;

        Ok(RequestUrl {
            method: url.method.to_ascii_uppercase(),
            path: url.path,
        })
    }

    /// Renders the request body; no template means `{}`.
    fn parse_input_template(
        &self,
        renderer: &dyn Renderer,
        template: Option<&str>,
    ) -> Result<String, WebhookError> {
        let Some(template) = template else {
            return Ok("{}".to_string());
        };

        let rendered = renderer
            .render(template, &self.template_data(), RenderMode::Request)
            .map_err(|e| WebhookError::InputTemplate(e.to_string()))?;

        serde_json::from_str::<Value>(&rendered)
            .map_err(|e| WebhookError::InputTemplate(format!("invalid json body: {}", e)))?;

        Ok(rendered)
    }

    /// Renders request headers; no template means none.
    fn parse_headers_template(
        &self,
        renderer: &dyn Renderer,
        template: Option<&str>,
    ) -> Result<Vec<(String, String)>, WebhookError> {
        let Some(template) = template else {
            return Ok(Vec::new());
        };

        let rendered = renderer
            .render(template, &self.template_data(), RenderMode::Request)
            .map_err(|e| WebhookError::HeadersTemplate(e.to_string()))?;

        let parsed: BTreeMap<String, HeaderValues> = serde_json::from_str(&rendered)
            .map_err(|e| WebhookError::HeadersTemplate(e.to_string()))?;

        let mut headers = Vec::new();
        for (name, values) in parsed {
            match values {
                HeaderValues::One(value) => headers.push((name, value)),
                HeaderValues::Many(values) => {
                    headers.extend(values.into_iter().map(|value| (name.clone(), value)))
                }
            }
        }
        Ok(headers)
    }

    fn parse_output_template(
        &self,
        renderer: &dyn Renderer,
        template: &str,
        data: &ResponseData,
    ) -> Result<Response, WebhookError> {
        let rendered = render_response(renderer, template, data)
            .map_err(WebhookError::OutputTemplate)?;

        let response: Response = serde_json::from_str(&rendered)
            .map_err(|e| WebhookError::OutputTemplate(e.to_string()))?;
        response.validate().map_err(WebhookError::OutputTemplate)?;

        Ok(response)
    }

    fn parse_status_template(
        &self,
        renderer: &dyn Renderer,
        template: &str,
        data: &ResponseData,
    ) -> Result<ResponseStatus, WebhookError> {
        let rendered = render_response(renderer, template, data)
            .map_err(WebhookError::StatusTemplate)?;

        let status: ResponseStatus = serde_json::from_str(&rendered)
            .map_err(|e| WebhookError::StatusTemplate(e.to_string()))?;
        status.validate().map_err(WebhookError::StatusTemplate)?;

        Ok(status)
    }
}

fn render_response(
    renderer: &dyn Renderer,
    template: &str,
    data: &ResponseData,
) -> Result<String, String> {
    let data = serde_json::to_value(data).map_err(|e| e.to_string())?;
    renderer
        .render(template, &data, RenderMode::Response)
        .map_err(|e| e.to_string())
}

/// Plain JSON documents can be used directly as template input.
impl TemplateInput for Value {
    fn template_data(&self) -> Value {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app() -> Value {
        json!({"Application": {"ID": "app-1", "Name": "orders"}})
    }

    #[test]
    fn test_normalize_field_access() {
        assert_eq!(
            normalize_field_access("{{.Application.ID}}"),
            "{{ Application.ID}}"
        );
        assert_eq!(
            normalize_field_access("{{ .Headers.Location }}"),
            "{{ Headers.Location }}"
        );
        assert_eq!(
            normalize_field_access("{{- .Body.error }}"),
            "{{- Body.error }}"
        );
        assert_eq!(
            normalize_field_access("{{ Body.error }} and {{ 1.5 }}"),
            "{{ Body.error }} and {{ 1.5 }}"
        );
        assert_eq!(normalize_field_access("no templates"), "no templates");
    }

    #[test]
    fn test_go_control_actions_are_rejected() {
        let renderer = JinjaRenderer::new();

        for template in [
            r#"{"id": "{{ if .Application.ID }}x{{ end }}"}"#,
            r#"{"op": "{{ if eq .Operation "assign" }}a{{ else }}b{{ end }}"}"#,
            r#"{"n": "{{ len .Items }}"}"#,
        ] {
            let err = renderer
                .render(template, &app(), RenderMode::Request)
                .unwrap_err();
            assert!(err.0.contains("go template action"), "{}", err);
        }
    }

    #[test]
    fn test_jinja_control_blocks_still_render() {
        let renderer = JinjaRenderer::new();
        let rendered = renderer
            .render(
                r#"{% if Application.ID %}{{.Application.Name}}{% endif %}"#,
                &app(),
                RenderMode::Request,
            )
            .unwrap();
        assert_eq!(rendered, "orders");
    }

    #[test]
    fn test_request_strings_are_inserted_verbatim() {
        let renderer = JinjaRenderer::new();
        let data = json!({"Assignment": {"Value": "{\"url\": \"https://tenant\"}"}});

        let body = data
            .parse_input_template(&renderer, Some(r#"{"config": {{.Assignment.Value}}}"#))
            .unwrap();

        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["config"]["url"], "https://tenant");
    }

    #[test]
    fn test_url_template() {
        let renderer = JinjaRenderer::new();
        let url = app()
            .parse_url_template(
                &renderer,
                r#"{"method": "delete", "path": "https://test-domain.com/api/v1/applications/{{.Application.ID}}"}"#,
            )
            .unwrap();

        assert_eq!(url.method, "DELETE");
        assert_eq!(url.path, "https://test-domain.com/api/v1/applications/app-1");
    }

    #[test]
    fn test_url_template_rejects_bad_method_and_path() {
        let renderer = JinjaRenderer::new();

        let err = app()
            .parse_url_template(&renderer, r#"{"method": "FETCH", "path": "https://x"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unable to parse webhook URL"));

        let err = app()
            .parse_url_template(&renderer, r#"{"method": "GET", "path": "not a url"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unable to parse webhook URL"));
    }

    #[test]
    fn test_input_template_missing_field_is_an_error() {
        let renderer = JinjaRenderer::new();
        let err = app()
            .parse_input_template(
                &renderer,
                Some(r#"{"group": "{{.Application.Group}}"}"#),
            )
            .unwrap_err();

        assert!(err.is_template_error());
        assert!(err.to_string().contains("unable to parse webhook input body"));
    }

    #[test]
    fn test_input_template_defaults_to_empty_object() {
        let renderer = JinjaRenderer::new();
        assert_eq!(app().parse_input_template(&renderer, None).unwrap(), "{}");
    }

    #[test]
    fn test_input_template_must_be_json() {
        let renderer = JinjaRenderer::new();
        let err = app()
            .parse_input_template(&renderer, Some("name={{.Application.Name}}"))
            .unwrap_err();
        assert!(err.to_string().contains("invalid json body"));
    }

    #[test]
    fn test_headers_template_accepts_strings_and_lists() {
        let renderer = JinjaRenderer::new();
        let headers = app()
            .parse_headers_template(
                &renderer,
                Some(r#"{"X-App": "{{.Application.ID}}", "X-Tags": ["a", "b"]}"#),
            )
            .unwrap();

        assert_eq!(
            headers,
            vec![
                ("X-App".to_string(), "app-1".to_string()),
                ("X-Tags".to_string(), "a".to_string()),
                ("X-Tags".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_headers_template_invalid() {
        let renderer = JinjaRenderer::new();
        let err = app()
            .parse_headers_template(&renderer, Some("{{ unclosed"))
            .unwrap_err();
        assert!(err.to_string().contains("unable to parse webhook headers"));
    }

    #[test]
    fn test_output_template_with_missing_body_fields() {
        let renderer = JinjaRenderer::new();
        let mut data = ResponseData::default();
        data.headers
            .insert("Location".to_string(), "https://x/op".to_string());
        data.body = json!({});

        let response = app()
            .parse_output_template(
                &renderer,
                r#"{"location":"{{.Headers.Location}}","success_status_code": 202,"error": "{{.Body.error}}"}"#,
                &data,
            )
            .unwrap();

        assert_eq!(response.location.as_deref(), Some("https://x/op"));
        assert_eq!(response.success_status_code, Some(202));
        assert_eq!(response.error.as_deref(), Some(""));
    }

    #[test]
    fn test_output_template_stringifies_structured_errors() {
        let renderer = JinjaRenderer::new();
        let data = ResponseData {
            headers: BTreeMap::new(),
            body: json!({"error": {"code": "401", "message": "Unauthorized"}}),
        };

        let response = app()
            .parse_output_template(
                &renderer,
                r#"{"success_status_code": 200, "error": "{{.Body.error}}"}"#,
                &data,
            )
            .unwrap();

        let error = response.error.unwrap();
        assert!(error.contains("Unauthorized"));
        assert!(error.contains("401"));
    }

    #[test]
    fn test_output_template_keeps_quoted_multiline_errors() {
        let renderer = JinjaRenderer::new();
        let data = ResponseData {
            headers: BTreeMap::new(),
            body: json!({"error": "field \"name\" is required\nsecond \\ line"}),
        };

        let response = app()
            .parse_output_template(
                &renderer,
                r#"{"success_status_code": 200, "error": "{{.Body.error}}"}"#,
                &data,
            )
            .unwrap();

        assert_eq!(
            response.error.as_deref(),
            Some("field \"name\" is required\nsecond \\ line")
        );
    }

    #[test]
    fn test_output_template_embeds_config_with_tojson() {
        let renderer = JinjaRenderer::new();
        let data = ResponseData {
            headers: BTreeMap::new(),
            body: json!({"configuration": {"url": "https://tenant"}}),
        };

        let response = app()
            .parse_output_template(
                &renderer,
                r#"{"success_status_code": 200, "error": "", "config": {{ .Body.configuration | tojson }}}"#,
                &data,
            )
            .unwrap();

        assert_eq!(response.config, Some(json!({"url": "https://tenant"})));
    }

    #[test]
    fn test_status_template_round_trip() {
        let renderer = JinjaRenderer::new();
        let data = ResponseData {
            headers: BTreeMap::new(),
            body: json!({"status": "FAILED", "error": "boom"}),
        };

        let status = app()
            .parse_status_template(
                &renderer,
                r#"{"status":"{{.Body.status}}","success_status_code": 200,"success_status_identifier":"SUCCEEDED","in_progress_status_identifier":"IN_PROGRESS","failed_status_identifier":"FAILED","error": "{{.Body.error}}"}"#,
                &data,
            )
            .unwrap();

        assert_eq!(status.status.as_deref(), Some("FAILED"));
        assert_eq!(status.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_status_template_missing_success_code() {
        let renderer = JinjaRenderer::new();
        let err = app()
            .parse_status_template(
                &renderer,
                r#"{"status":"{{.Body.status}}","success_status_identifier":"SUCCEEDED","in_progress_status_identifier":"IN_PROGRESS","failed_status_identifier":"FAILED","error": "{{.Body.error}}"}"#,
                &ResponseData::default(),
            )
            .unwrap_err();

        assert!(
            err.to_string()
                .contains("missing Status Template success status code field")
        );
    }
}
