use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;

/// The YAML-configured set of thing types and their permitted
/// sub-types, exposed to the query layer via `get_types`.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeEntry {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, rename = "subTypes")]
    pub sub_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TypesFile {
    types: Vec<TypeEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct TypeCatalogue {
    by_type: HashMap<String, Vec<String>>,
}

impl TypeCatalogue {
    pub fn from_yaml(contents: &str) -> Result<TypeCatalogue> {
        let parsed: TypesFile = serde_yaml::from_str(contents).context("parsing types catalogue yaml")?;
        let by_type = parsed
            .types
            .into_iter()
            .map(|entry| (entry.type_name, entry.sub_types))
            .collect();
        Ok(TypeCatalogue { by_type })
    }

    pub async fn load(path: &str) -> Result<TypeCatalogue> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading types catalogue at {path}"))?;
        Self::from_yaml(&contents)
    }

    pub fn get_types(&self) -> Vec<&str> {
        self.by_type.keys().map(String::as_str).collect()
    }

    pub fn get_sub_types(&self, type_name: &str) -> Option<&[String]> {
        self.by_type.get(type_name).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_types_and_subtypes_from_yaml() {
        let yaml = r#"
types:
  - type: Container
    subTypes: ["Recycling", "Waste"]
  - type: Room
"#;
        let catalogue = TypeCatalogue::from_yaml(yaml).unwrap();
        assert_eq!(catalogue.get_sub_types("Container"), Some(&["Recycling".to_string(), "Waste".to_string()][..]));
        assert_eq!(catalogue.get_sub_types("Room"), Some(&[][..]));
        assert_eq!(catalogue.get_sub_types("Unknown"), None);
    }
}
