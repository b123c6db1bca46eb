//! Ingestion planning: classify a repository as already-packaged,
//! convertible, or neither.

use crate::{HubClient, HubError, Result};
use serde_json::Value;
use tracing::{debug, info};

/// Architectures the converter tool understands.
pub const SUPPORTED_ARCHITECTURES: &[&str] = &[
    "LlamaForCausalLM",
    "MistralForCausalLM",
    "MixtralForCausalLM",
    "Qwen2ForCausalLM",
    "GemmaForCausalLM",
    "Gemma2ForCausalLM",
    "Phi3ForCausalLM",
    "StableLmForCausalLM",
];

/// Community accounts that publish pre-quantized GGUF mirrors, in probe order.
const GGUF_PROVIDERS: &[&str] = &["bartowski", "mradermacher", "TheBloke", "QuantFactory"];

const GGUF_EXT: &str = ".gguf";

/// A repository holding ready-to-load artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
    /// Repository the artifacts live in (the source repo or a mirror).
    pub repo: String,
    /// GGUF filenames available there, hub order preserved.
    pub files: Vec<String>,
}

/// What the planner learned about a repository.
#[derive(Debug, Clone)]
pub struct RepoProfile {
    pub repo: String,
    pub architecture: Option<String>,
    pub is_convertible: bool,
    pub packaged: Option<PackagedArtifact>,
}

impl RepoProfile {
    /// Diagnostic for repositories that can be neither fetched nor converted.
    pub fn unprocessable_reason(&self) -> String {
        match &self.architecture {
            Some(arch) => format!(
                "no GGUF artifacts found and architecture '{}' is not supported by the converter",
                arch
            ),
            None => "no GGUF artifacts found and the repository declares no architecture".to_string(),
        }
    }
}

/// Probe a repository and work out how to ingest it.
pub async fn plan_repo(client: &HubClient, repo: &str) -> Result<RepoProfile> {
    // A repo that already ships GGUF files needs no conversion
    let files = client.list_files(repo).await?;
    let gguf: Vec<String> = files
        .iter()
        .filter(|f| f.to_lowercase().ends_with(GGUF_EXT))
        .cloned()
        .collect();
    if !gguf.is_empty() {
        info!("{} ships {} packaged artifact(s)", repo, gguf.len());
        return Ok(RepoProfile {
            repo: repo.to_string(),
            architecture: None,
            is_convertible: false,
            packaged: Some(PackagedArtifact {
                repo: repo.to_string(),
                files: gguf,
            }),
        });
    }

    let architecture = match client.get_config(repo).await {
        Ok(config) => declared_architecture(&config),
        Err(HubError::NotFound) => None,
        Err(e) => return Err(e),
    };
    let is_convertible = architecture
        .as_deref()
        .is_some_and(|arch| SUPPORTED_ARCHITECTURES.contains(&arch));

    let packaged = find_community_mirror(client, repo).await;
    if let Some(mirror) = &packaged {
        info!("Found community mirror {} for {}", mirror.repo, repo);
    }

    Ok(RepoProfile {
        repo: repo.to_string(),
        architecture,
        is_convertible,
        packaged,
    })
}

fn declared_architecture(config: &Value) -> Option<String> {
    config
        .get("architectures")
        .and_then(Value::as_array)
        .and_then(|archs| archs.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Name spellings a mirror might use for a model.
fn name_variants(name: &str) -> Vec<String> {
    let candidates = [
        name.to_string(),
        name.replace('_', "-"),
        name.replace('-', "_"),
        name.to_lowercase(),
    ];
    let mut variants = Vec::new();
    for candidate in candidates {
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

/// Probe well-known quantizer accounts for a `<name>-GGUF` mirror of `repo`.
async fn find_community_mirror(client: &HubClient, repo: &str) -> Option<PackagedArtifact> {
    let model_name = repo.rsplit('/').next()?;

    for provider in GGUF_PROVIDERS {
        for variant in name_variants(model_name) {
            let candidate = format!("{}/{}-GGUF", provider, variant);
            debug!("Probing mirror candidate {}", candidate);
            match client.list_files(&candidate).await {
                Ok(files) => {
                    let gguf: Vec<String> = files
                        .iter()
                        .filter(|f| f.to_lowercase().ends_with(GGUF_EXT))
                        .cloned()
                        .collect();
                    if !gguf.is_empty() {
                        return Some(PackagedArtifact {
                            repo: candidate,
                            files: gguf,
                        });
                    }
                }
                // Missing and inaccessible candidates are both just "keep looking"
                Err(_) => continue,
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn variants_cover_separator_spellings() {
        let variants = name_variants("My_Model-7B");
        assert!(variants.contains(&"My_Model-7B".to_string()));
        assert!(variants.contains(&"My-Model-7B".to_string()));
        assert!(variants.contains(&"My_Model_7B".to_string()));
        assert!(variants.contains(&"my_model-7b".to_string()));
    }

    #[test]
    fn variants_deduplicate() {
        let variants = name_variants("model");
        assert_eq!(variants, vec!["model".to_string()]);
    }

    #[tokio::test]
    async fn packaged_repo_short_circuits() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/models/owner/model");
                then.status(200).json_body(json!({
                    "siblings": [
                        {"rfilename": "README.md"},
                        {"rfilename": "model-Q4_K_M.gguf"}
                    ]
                }));
            })
            .await;

        let client = HubClient::new(server.base_url(), None);
        let profile = plan_repo(&client, "owner/model").await.unwrap();
        let packaged = profile.packaged.unwrap();
        assert_eq!(packaged.repo, "owner/model");
        assert_eq!(packaged.files, vec!["model-Q4_K_M.gguf"]);
    }

    #[tokio::test]
    async fn convertible_architecture_is_detected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/models/owner/model");
                then.status(200).json_body(json!({
                    "siblings": [{"rfilename": "model.safetensors"}]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/owner/model/raw/main/config.json");
                then.status(200)
                    .json_body(json!({"architectures": ["LlamaForCausalLM"]}));
            })
            .await;
        // All mirror probes miss
        server
            .mock_async(|when, then| {
                when.method(GET).path_matches(Regex::from("/api/models/(bartowski|mradermacher|TheBloke|QuantFactory)/.*"));
                then.status(404);
            })
            .await;

        let client = HubClient::new(server.base_url(), None);
        let profile = plan_repo(&client, "owner/model").await.unwrap();
        assert_eq!(profile.architecture.as_deref(), Some("LlamaForCausalLM"));
        assert!(profile.is_convertible);
        assert!(profile.packaged.is_none());
    }

    #[tokio::test]
    async fn mirror_search_finds_packaged_variant() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/models/owner/My_Model");
                then.status(200).json_body(json!({
                    "siblings": [{"rfilename": "model.safetensors"}]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/owner/My_Model/raw/main/config.json");
                then.status(200)
                    .json_body(json!({"architectures": ["ExoticForCausalLM"]}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/models/bartowski/My-Model-GGUF");
                then.status(200).json_body(json!({
                    "siblings": [{"rfilename": "my-model-Q4_K_M.gguf"}]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path_matches(Regex::from(".*"));
                then.status(404);
            })
            .await;

        let client = HubClient::new(server.base_url(), None);
        let profile = plan_repo(&client, "owner/My_Model").await.unwrap();
        assert!(!profile.is_convertible);
        let packaged = profile.packaged.unwrap();
        assert_eq!(packaged.repo, "bartowski/My-Model-GGUF");
    }

    #[tokio::test]
    async fn unprocessable_reason_names_architecture() {
        let profile = RepoProfile {
            repo: "owner/model".to_string(),
            architecture: Some("ExoticForCausalLM".to_string()),
            is_convertible: false,
            packaged: None,
        };
        assert!(profile.unprocessable_reason().contains("ExoticForCausalLM"));
    }
}
