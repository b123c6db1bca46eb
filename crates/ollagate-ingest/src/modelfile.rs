//! Modelfile rendering for the backend's import channel.

use std::path::Path;

/// Optional prompt configuration and generation defaults for a created model.
#[derive(Debug, Clone)]
pub struct ModelfileOptions {
    pub system: Option<String>,
    pub template: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

impl Default for ModelfileOptions {
    fn default() -> Self {
        Self {
            system: None,
            template: None,
            temperature: 0.7,
            top_p: 0.9,
            stop: vec!["<|im_start|>".to_string(), "<|im_end|>".to_string()],
        }
    }
}

/// Render the Modelfile text for an artifact at `artifact`.
pub fn render_modelfile(artifact: &Path, options: &ModelfileOptions) -> String {
    let mut out = format!("FROM {}\n", artifact.display());

    if let Some(system) = &options.system {
        out.push_str(&format!("SYSTEM \"{}\"\n", escape_quoted(system)));
    }
    if let Some(template) = &options.template {
        out.push_str(&format!("TEMPLATE \"\"\"{}\"\"\"\n", template));
    }

    out.push_str(&format!("PARAMETER temperature {}\n", options.temperature));
    out.push_str(&format!("PARAMETER top_p {}\n", options.top_p));
    for stop in &options.stop {
        out.push_str(&format!("PARAMETER stop \"{}\"\n", escape_quoted(stop)));
    }

    out
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
