use indexmap::IndexMap;

pub const VISION_CAPABILITY: &str = "vision";
pub const IMAGE_CAPABILITY: &str = "image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    /// Models offering `capability`, in catalog order.
    pub fn by_capability<'a>(
        &'a self,
        capability: &'a str,
    ) -> impl Iterator<Item = &'a ModelSpec> + 'a {
        self.models
            .values()
            .filter(move |model| model.supports(capability))
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, capabilities: &[&str]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
            },
        );
    };

    // First entry per capability is the default.
    insert("gemini-2.5-pro-preview-03-25", "gemini", &[VISION_CAPABILITY]);
    insert("gemini-2.0-flash", "gemini", &[VISION_CAPABILITY]);
    insert(
        "gemini-2.0-flash-exp-image-generation",
        "gemini",
        &[IMAGE_CAPABILITY],
    );
    insert("dryrun-vision-1", "dryrun", &[VISION_CAPABILITY]);
    insert("dryrun-image-1", "dryrun", &[IMAGE_CAPABILITY]);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_defaults_to_gemini() {
        let registry = ModelRegistry::new(None);
        let vision: Vec<&ModelSpec> = registry.by_capability(VISION_CAPABILITY).collect();
        let image: Vec<&ModelSpec> = registry.by_capability(IMAGE_CAPABILITY).collect();
        assert_eq!(vision[0].name, "gemini-2.5-pro-preview-03-25");
        assert_eq!(image[0].name, "gemini-2.0-flash-exp-image-generation");
        assert!(vision.iter().all(|model| !model.supports(IMAGE_CAPABILITY)));
    }

    #[test]
    fn lookup_reports_capabilities_and_provider() {
        let registry = ModelRegistry::new(None);
        let Some(model) = registry.get("dryrun-image-1") else {
            panic!("dryrun image model should be built in");
        };
        assert_eq!(model.provider, "dryrun");
        assert!(model.supports(IMAGE_CAPABILITY));
        assert!(!model.supports(VISION_CAPABILITY));
        assert!(registry.get("missing").is_none());
    }
}
