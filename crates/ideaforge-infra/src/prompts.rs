//! Filesystem-backed prompt assembler.
//!
//! Loads the discovery prompt assets from a prompts directory laid out as:
//!
//! ```text
//! prompts/
//!   product-manager-system-prompt.md
//!   sections/
//!     section-output-rules.md
//!     section-inputs.json
//!     prompts/<section>.prompt.md
//!     schemas/<section>.schema.json
//! ```
//!
//! Assets are loaded once and cached. Missing files degrade to empty
//! strings with a warning; a malformed section schema is skipped with a
//! warning rather than failing the whole load.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;

use ideaforge_core::prompt::{IncomingInfoContext, PromptAssembler, PromptAssets, build_incoming_info};
use ideaforge_types::error::PromptError;
use ideaforge_types::field::FIELD_DEFINITIONS;

/// [`PromptAssembler`] reading assets from a prompts directory.
pub struct FsPromptAssembler {
    prompts_dir: PathBuf,
    cache: OnceCell<Arc<PromptAssets>>,
}

impl FsPromptAssembler {
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.into(),
            cache: OnceCell::new(),
        }
    }

    /// Read one asset file, treating a missing file as empty content.
    async fn read_optional(&self, relative: &str) -> Result<String, PromptError> {
        let path = self.prompts_dir.join(relative);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(asset = relative, "prompt asset missing");
                Ok(String::new())
            }
            Err(err) => Err(PromptError::Io {
                path: path.display().to_string(),
                source: err,
            }),
        }
    }

    async fn load(&self) -> Result<Arc<PromptAssets>, PromptError> {
        let mut assets = PromptAssets {
            system_prompt: self
                .read_optional("product-manager-system-prompt.md")
                .await?,
            output_rules: self.read_optional("sections/section-output-rules.md").await?,
            ..Default::default()
        };

        let sections: BTreeSet<&str> =
            FIELD_DEFINITIONS.iter().map(|field| field.section).collect();
        for section in sections {
            let prompt = self
                .read_optional(&format!("sections/prompts/{section}.prompt.md"))
                .await?;
            if !prompt.is_empty() {
                assets.section_prompts.insert(section.to_string(), prompt);
            }

            let schema_text = self
                .read_optional(&format!("sections/schemas/{section}.schema.json"))
                .await?;
            if !schema_text.is_empty() {
                match serde_json::from_str(&schema_text) {
                    Ok(schema) => {
                        assets.section_schemas.insert(section.to_string(), schema);
                    }
                    Err(err) => {
                        tracing::warn!(section, error = %err, "invalid section schema, skipping");
                    }
                }
            }
        }

        let inputs_text = self.read_optional("sections/section-inputs.json").await?;
        if !inputs_text.is_empty() {
            match serde_json::from_str::<HashMap<String, Vec<String>>>(&inputs_text) {
                Ok(section_inputs) => assets.section_inputs = section_inputs,
                Err(err) => {
                    tracing::warn!(error = %err, "invalid section-inputs.json, using empty dependencies");
                }
            }
        }

        Ok(Arc::new(assets))
    }
}

impl PromptAssembler for FsPromptAssembler {
    async fn assets(&self) -> Result<Arc<PromptAssets>, PromptError> {
        self.cache.get_or_try_init(|| self.load()).await.cloned()
    }

    async fn incoming_info(
        &self,
        field_key: &str,
        context: &IncomingInfoContext<'_>,
    ) -> Result<serde_json::Value, PromptError> {
        let assets = self.assets().await?;
        Ok(build_incoming_info(&assets, field_key, context))
    }
}
