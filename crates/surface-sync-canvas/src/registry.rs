//! Kind registry: maps a surface's declared kind to a known renderer.
//!
//! Rendering itself lives outside this crate. The registry only decides
//! whether a kind is known; unknown kinds resolve to an inline placeholder
//! instead of failing the whole set.

use serde_json::Value;

use crate::reconciler::DisplaySurface;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindInfo {
    pub name: String,
    pub description: String,
    /// Fetches its own data on its own cadence; pushed props are optional.
    pub self_updating: bool,
}

impl KindInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            self_updating: false,
        }
    }

    fn self_updating(mut self) -> Self {
        self.self_updating = true;
        self
    }
}

/// Outcome of looking up a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    Known(&'a KindInfo),
    Unknown(&'a str),
}

#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: Vec<KindInfo>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in kinds.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for info in builtin_kinds() {
            registry.register(info);
        }
        registry
    }

    /// Register a kind, replacing any existing entry with the same name.
    pub fn register(&mut self, info: KindInfo) {
        match self.kinds.iter_mut().find(|k| k.name == info.name) {
            Some(existing) => *existing = info,
            None => self.kinds.push(info),
        }
    }

    pub fn get(&self, name: &str) -> Option<&KindInfo> {
        self.kinds.iter().find(|k| k.name == name)
    }

    pub fn list(&self) -> &[KindInfo] {
        &self.kinds
    }

    pub fn resolve<'a>(&'a self, kind: &'a str) -> Resolved<'a> {
        match self.get(kind) {
            Some(info) => Resolved::Known(info),
            None => Resolved::Unknown(kind),
        }
    }

    /// One-line text rendering of a display entry.
    pub fn render_line(&self, entry: &DisplaySurface) -> String {
        let surface = &entry.surface;
        let body = match self.resolve(&surface.kind) {
            Resolved::Known(info) => {
                let summary = summarize_props(&surface.props);
                if summary.is_empty() {
                    format!("[{}] {}", info.name, surface.id)
                } else {
                    format!("[{}] {}  {}", info.name, surface.id, summary)
                }
            }
            Resolved::Unknown(kind) => {
                format!("[!] {}  Unknown component: {}", surface.id, kind)
            }
        };

        if entry.exiting {
            format!("{body}  (exiting)")
        } else {
            body
        }
    }
}

/// Scalar props as `key=value`, sorted by key. Nested values are elided.
fn summarize_props(props: &serde_json::Map<String, Value>) -> String {
    let mut parts: Vec<String> = props
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some(format!("{key}={text}"))
        })
        .collect();
    parts.sort();
    parts.join(" ")
}

fn builtin_kinds() -> Vec<KindInfo> {
    vec![
        KindInfo::new("LeoStatus", "Agent status: model, session, gateway health. No props.")
            .self_updating(),
        KindInfo::new("OllamaMonitor", "Currently loaded Ollama model and runtime stats. No props.")
            .self_updating(),
        KindInfo::new("GatewayLog", "Recent gateway errors and warnings. Props: limit?")
            .self_updating(),
        KindInfo::new("CostMeter", "Daily/monthly API spend vs budget limits. No props.")
            .self_updating(),
        KindInfo::new("SystemHealth", "Live CPU, RAM, disk bars. No props.").self_updating(),
        KindInfo::new("Clock", "Self-updating clock and date. Props: timezone?").self_updating(),
        KindInfo::new(
            "TaskCard",
            "Task with status badge, description, and optional steps. Props: title, status, description?, steps?, priority?",
        ),
        KindInfo::new(
            "ApprovalCard",
            "Approval request with Approve/Deny buttons; fires a callback. Props: title, description?, command?, risk?",
        ),
        KindInfo::new(
            "AlertBanner",
            "Highlighted alert or blocker. Props: message, severity (info|warning|error), details?",
        ),
        KindInfo::new(
            "StatusCard",
            "Labeled value with icon and color. Props: title, value, icon?, color?, subtitle?",
        ),
        KindInfo::new(
            "QuickAction",
            "Button that fires a callback. Props: label, icon?, color?, action?",
        ),
        KindInfo::new("TextBlock", "Text display (body/code/quote). Props: text, heading?, variant?"),
        KindInfo::new("DataTable", "Table with column headers and rows. Props: title?, columns, rows"),
        KindInfo::new(
            "ProgressBar",
            "Horizontal progress bar. Props: label, value, max?, color?, showPercent?",
        ),
        KindInfo::new(
            "BarChart",
            "Bar chart. Props: title?, data ({label, value, color?}[]), height?",
        ),
        KindInfo::new("Form", "Agent-generated form. Props: title?, fields, submitLabel?"),
        KindInfo::new(
            "ListCard",
            "List with optional title. Props: title?, items ({text, icon?, color?}[]), ordered?",
        ),
    ]
}
