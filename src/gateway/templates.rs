//! Command templates.
//!
//! Operators never send free-form command text to a device. They pick a
//! template and supply parameters; a template body uses `{{name}}`
//! placeholders and carries a default risk level.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{GateError, GateResult};
use crate::risk::RiskLevel;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static regex"));

const FORBIDDEN_SEQUENCES: &[&str] = &["\n", "\r", ";", "|", "&&"];

/// A device command template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandTemplate {
    pub id: String,
    pub vendor: String,
    pub body: String,
    pub default_risk: RiskLevel,
    #[serde(default)]
    pub params: Vec<String>,
}

impl CommandTemplate {
    pub fn new(
        id: impl Into<String>,
        vendor: impl Into<String>,
        body: impl Into<String>,
        default_risk: RiskLevel,
    ) -> Self {
        let body = body.into();
        let params = PLACEHOLDER
            .captures_iter(&body)
            .map(|c| c[1].to_string())
            .fold(Vec::new(), |mut acc, name| {
                if !acc.contains(&name) {
                    acc.push(name);
                }
                acc
            });
        Self {
            id: id.into(),
            vendor: vendor.into(),
            body,
            default_risk,
            params,
        }
    }

    /// Substitute every placeholder with its parameter value
    pub fn render(&self, params: &Map<String, Value>) -> GateResult<String> {
        let mut failure = None;
        let rendered = PLACEHOLDER.replace_all(&self.body, |caps: &Captures<'_>| {
            let name = &caps[1];
            match params.get(name).map(|v| param_text(name, v)) {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    failure.get_or_insert(e);
                    String::new()
                }
                None => {
                    failure.get_or_insert(GateError::BadRequest(format!(
                        "missing template param '{name}'"
                    )));
                    String::new()
                }
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(rendered.into_owned()),
        }
    }
}

fn param_text(name: &str, value: &Value) -> GateResult<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => {
            return Err(GateError::BadRequest(format!(
                "template param '{name}' must be a string, number or boolean"
            )))
        }
    };

    if text.trim().is_empty() {
        return Err(GateError::BadRequest(format!("template param '{name}' is empty")));
    }
    if FORBIDDEN_SEQUENCES.iter().any(|seq| text.contains(seq)) {
        return Err(GateError::BadRequest(format!(
            "template param '{name}' contains a line break or command separator"
        )));
    }
    Ok(text)
}

/// A rendered template, ready for policy checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    pub template_id: String,
    pub vendor: String,
    pub command: String,
    pub default_risk: RiskLevel,
}

/// Template catalog keyed by id
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, CommandTemplate>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only show commands plus a few change templates for Cisco IOS
    /// and MikroTik RouterOS
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for template in [
            CommandTemplate::new("show_version", "cisco", "show version", RiskLevel::R0Read),
            CommandTemplate::new(
                "show_interface",
                "cisco",
                "show interface {{iface}}",
                RiskLevel::R0Read,
            ),
            CommandTemplate::new("show_ip_route", "cisco", "show ip route", RiskLevel::R0Read),
            CommandTemplate::new(
                "interface_print",
                "mikrotik",
                "/interface print",
                RiskLevel::R0Read,
            ),
            CommandTemplate::new(
                "ip_route_print",
                "mikrotik",
                "/ip route print",
                RiskLevel::R0Read,
            ),
            CommandTemplate::new(
                "set_interface_comment",
                "mikrotik",
                "/interface set {{iface}} comment=\"{{comment}}\"",
                RiskLevel::R2Change,
            ),
            CommandTemplate::new(
                "disable_interface",
                "mikrotik",
                "/interface disable {{iface}}",
                RiskLevel::R3Dangerous,
            ),
            CommandTemplate::new("reload", "cisco", "reload", RiskLevel::R3Dangerous),
        ] {
            catalog.templates.insert(template.id.clone(), template);
        }
        catalog
    }

    /// Add a template; ids are unique
    pub fn register(&mut self, template: CommandTemplate) -> GateResult<()> {
        if self.templates.contains_key(&template.id) {
            return Err(GateError::Conflict(format!("template {} already exists", template.id)));
        }
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    pub fn get(&self, id: &str) -> GateResult<&CommandTemplate> {
        self.templates
            .get(id)
            .ok_or_else(|| GateError::UnknownTemplate(id.to_string()))
    }

    pub fn list(&self) -> Vec<&CommandTemplate> {
        self.templates.values().collect()
    }

    pub fn render(&self, id: &str, params: &Map<String, Value>) -> GateResult<RenderedCommand> {
        let template = self.get(id)?;
        Ok(RenderedCommand {
            template_id: template.id.clone(),
            vendor: template.vendor.clone(),
            command: template.render(params)?,
            default_risk: template.default_risk,
        })
    }
}
