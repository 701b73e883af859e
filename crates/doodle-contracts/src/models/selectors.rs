use std::collections::BTreeSet;

use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    /// Why the requested model was not used, when one was requested.
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no model offers '{capability}' through an available provider")]
    NoCandidate { capability: String },
}

/// Resolves a model name for a capability against the catalog.
///
/// When restricted to a provider set, only models those providers serve are
/// ever returned, so a selection can always be executed.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    registry: ModelRegistry,
    providers: Option<BTreeSet<String>>,
}

impl ModelSelector {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            registry,
            providers: None,
        }
    }

    pub fn builtin() -> Self {
        Self::new(ModelRegistry::new(None))
    }

    pub fn with_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = Some(providers.into_iter().map(Into::into).collect());
        self
    }

    fn is_servable(&self, model: &ModelSpec) -> bool {
        self.providers
            .as_ref()
            .map_or(true, |providers| providers.contains(&model.provider))
    }

    /// The named model, or why it cannot serve `capability`.
    fn accept(&self, name: &str, capability: &str) -> Result<&ModelSpec, String> {
        let Some(model) = self.registry.get(name) else {
            return Err(format!("unknown model '{name}'"));
        };
        if !model.supports(capability) {
            return Err(format!("model '{name}' cannot do '{capability}'"));
        }
        if !self.is_servable(model) {
            return Err(format!(
                "model '{name}' needs provider '{}', which is unavailable",
                model.provider
            ));
        }
        Ok(model)
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, SelectionError> {
        let requested = requested.map(str::trim).filter(|name| !name.is_empty());
        let mut fallback_reason = None;
        if let Some(name) = requested {
            match self.accept(name, capability) {
                Ok(model) => {
                    return Ok(ModelSelection {
                        model: model.clone(),
                        requested: Some(name.to_string()),
                        fallback_reason: None,
                    })
                }
                Err(reason) => fallback_reason = Some(reason),
            }
        }

        let model = self
            .registry
            .by_capability(capability)
            .find(|model| self.is_servable(model))
            .cloned()
            .ok_or_else(|| SelectionError::NoCandidate {
                capability: capability.to_string(),
            })?;
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::models::{IMAGE_CAPABILITY, VISION_CAPABILITY};

    fn model(name: &str, provider: &str, capability: &str) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: vec![capability.to_string()],
        }
    }

    fn catalog(models: &[ModelSpec]) -> ModelRegistry {
        let map: IndexMap<String, ModelSpec> = models
            .iter()
            .map(|spec| (spec.name.clone(), spec.clone()))
            .collect();
        ModelRegistry::new(Some(map))
    }

    #[test]
    fn requested_model_is_honored() -> anyhow::Result<()> {
        let selection =
            ModelSelector::builtin().select(Some(" dryrun-image-1 "), IMAGE_CAPABILITY)?;
        assert_eq!(selection.model.name, "dryrun-image-1");
        assert_eq!(selection.fallback_reason, None);
        Ok(())
    }

    #[test]
    fn no_request_uses_default_silently() -> anyhow::Result<()> {
        let selection = ModelSelector::builtin().select(None, VISION_CAPABILITY)?;
        assert_eq!(selection.model.name, "gemini-2.5-pro-preview-03-25");
        assert!(selection.fallback_reason.is_none());

        let blank = ModelSelector::builtin().select(Some("  "), VISION_CAPABILITY)?;
        assert_eq!(blank.requested, None);
        assert!(blank.fallback_reason.is_none());
        Ok(())
    }

    #[test]
    fn unknown_or_incapable_requests_fall_back_with_reason() -> anyhow::Result<()> {
        let selector = ModelSelector::builtin();
        let unknown = selector.select(Some("missing"), IMAGE_CAPABILITY)?;
        assert_eq!(unknown.model.name, "gemini-2.0-flash-exp-image-generation");
        assert_eq!(unknown.requested.as_deref(), Some("missing"));
        assert_eq!(
            unknown.fallback_reason.as_deref(),
            Some("unknown model 'missing'")
        );

        let incapable = selector.select(Some("dryrun-image-1"), VISION_CAPABILITY)?;
        assert_eq!(incapable.model.name, "gemini-2.5-pro-preview-03-25");
        assert_eq!(
            incapable.fallback_reason.as_deref(),
            Some("model 'dryrun-image-1' cannot do 'vision'")
        );
        Ok(())
    }

    #[test]
    fn models_of_unavailable_providers_are_skipped() -> anyhow::Result<()> {
        let selector = ModelSelector::new(catalog(&[
            model("remote-render", "gemini", IMAGE_CAPABILITY),
            model("local-render", "dryrun", IMAGE_CAPABILITY),
        ]))
        .with_providers(["dryrun"]);

        let default = selector.select(None, IMAGE_CAPABILITY)?;
        assert_eq!(default.model.name, "local-render");

        let requested = selector.select(Some("remote-render"), IMAGE_CAPABILITY)?;
        assert_eq!(requested.model.name, "local-render");
        assert_eq!(
            requested.fallback_reason.as_deref(),
            Some("model 'remote-render' needs provider 'gemini', which is unavailable")
        );
        Ok(())
    }

    #[test]
    fn errors_when_no_servable_model_has_capability() {
        let selector = ModelSelector::new(catalog(&[
            model("render-only", "dryrun", IMAGE_CAPABILITY),
            model("remote-vision", "gemini", VISION_CAPABILITY),
        ]))
        .with_providers(["dryrun"]);
        assert_eq!(
            selector.select(Some("remote-vision"), VISION_CAPABILITY).err(),
            Some(SelectionError::NoCandidate {
                capability: VISION_CAPABILITY.to_string(),
            })
        );
    }
}
