//! Queue row types and the hub request encoding.

use serde::{Deserialize, Serialize};

/// Which pipeline a queue row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// A model the backend can pull itself (`ollama pull` namespace).
    Native,
    /// A Hugging Face repository handled by the ingestion pipeline.
    Hub,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Native => "native",
            QueueKind::Hub => "hub",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "hub" | "huggingface" => QueueKind::Hub,
            _ => QueueKind::Native,
        }
    }
}

/// Row lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Downloading => "downloading",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "downloading" => QueueStatus::Downloading,
            "completed" => QueueStatus::Completed,
            "failed" => QueueStatus::Failed,
            _ => QueueStatus::Pending,
        }
    }
}

/// One persisted queue row.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub id: i64,
    pub model: String,
    pub kind: QueueKind,
    pub requester_ip: String,
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl QueueEntry {
    /// Human-facing model name for catalog merging and logs.
    pub fn display_model(&self) -> String {
        match self.kind {
            QueueKind::Native => self.model.clone(),
            QueueKind::Hub => HubSpec::parse(&self.model).repo_id,
        }
    }

    /// Names under which this row's subject may appear in the backend
    /// catalog. Used by startup reconciliation.
    pub fn subject_names(&self) -> Vec<String> {
        match self.kind {
            QueueKind::Native => {
                let base = self.model.split(':').next().unwrap_or(&self.model);
                vec![self.model.clone(), base.to_string()]
            }
            QueueKind::Hub => {
                let spec = HubSpec::parse(&self.model);
                let registered = spec.registered_name();
                vec![registered.clone(), format!("{}:latest", registered)]
            }
        }
    }
}

/// Abbreviated terminal row for the queue status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RecentEntry {
    pub id: i64,
    pub model: String,
    pub status: QueueStatus,
    pub error: Option<String>,
    pub updated_at: String,
}

/// Result of an enqueue attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued { id: i64 },
    AlreadyQueued,
}

/// A hub queue row's model field, decoded.
///
/// Plain requests store the bare `owner/repo` id; requests carrying a
/// non-default quantization or a custom name store a JSON object instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubSpec {
    pub repo_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl HubSpec {
    pub fn new(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            quant: None,
            name: None,
        }
    }

    /// Decode a stored model field. Anything that is not the JSON object
    /// form is a bare repository id.
    pub fn parse(model: &str) -> Self {
        if model.starts_with('{') {
            if let Ok(spec) = serde_json::from_str::<HubSpec>(model) {
                return spec;
            }
        }
        Self::new(model)
    }

    /// Encode for storage: the bare repo id when the quantization is the
    /// default and no custom name was given, else the JSON object form.
    pub fn encode(&self, default_quant: &str) -> String {
        let default_quant_requested =
            self.quant.is_none() || self.quant.as_deref() == Some(default_quant);
        if default_quant_requested && self.name.is_none() {
            self.repo_id.clone()
        } else {
            serde_json::to_string(self).expect("hub spec serializes")
        }
    }

    /// The name this model is registered under in the backend: the custom
    /// name if given, else the repo basename; lowercased with '_' -> '-'.
    pub fn registered_name(&self) -> String {
        let raw = self
            .name
            .as_deref()
            .unwrap_or_else(|| self.repo_id.rsplit('/').next().unwrap_or(&self.repo_id));
        raw.to_lowercase().replace('_', "-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_spec_roundtrip_bare() {
        let spec = HubSpec::new("owner/model");
        assert_eq!(spec.encode("Q4_K_M"), "owner/model");
        assert_eq!(HubSpec::parse("owner/model"), spec);
    }

    #[test]
    fn hub_spec_explicit_default_quant_stays_bare() {
        // Naming the default quantization outright changes nothing
        let spec = HubSpec {
            repo_id: "owner/model".to_string(),
            quant: Some("Q4_K_M".to_string()),
            name: None,
        };
        assert_eq!(spec.encode("Q4_K_M"), "owner/model");
    }

    #[test]
    fn hub_spec_roundtrip_structured() {
        let spec = HubSpec {
            repo_id: "owner/model".to_string(),
            quant: Some("Q5_K_M".to_string()),
            name: Some("My_Model".to_string()),
        };
        let encoded = spec.encode("Q4_K_M");
        assert!(encoded.starts_with('{'));
        assert_eq!(HubSpec::parse(&encoded), spec);
    }

    #[test]
    fn hub_spec_custom_name_forces_structured_form() {
        let spec = HubSpec {
            repo_id: "owner/model".to_string(),
            quant: None,
            name: Some("custom".to_string()),
        };
        assert!(spec.encode("Q4_K_M").starts_with('{'));
    }

    #[test]
    fn registered_name_is_normalized() {
        let spec = HubSpec::new("TheOrg/Fancy_Model_7B");
        assert_eq!(spec.registered_name(), "fancy-model-7b");

        let named = HubSpec {
            repo_id: "owner/model".to_string(),
            quant: None,
            name: Some("Custom_Name".to_string()),
        };
        assert_eq!(named.registered_name(), "custom-name");
    }

    #[test]
    fn subject_names_cover_base_and_tag() {
        let entry = QueueEntry {
            id: 1,
            model: "llama2:7b".to_string(),
            kind: QueueKind::Native,
            requester_ip: "10.0.0.1".to_string(),
            status: QueueStatus::Completed,
            error: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(entry.subject_names(), vec!["llama2:7b", "llama2"]);
    }
}
