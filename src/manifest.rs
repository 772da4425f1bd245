use crate::errors::*;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

/// The list of images to pull, either a plain sequence or a mapping
/// whose keys only serve as labels.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ImageList {
    Sequence(Vec<Value>),
    Mapping(IndexMap<Value, Value>),
}

impl ImageList {
    pub fn deserialize(buf: &str) -> Result<Self> {
        let list = serde_yaml::from_str(buf)
            .context("Failed to load image list from yaml, expected a sequence or a mapping")?;
        Ok(list)
    }

    /// Project the list to its image references, in document order.
    pub fn into_images(self) -> Result<Vec<String>> {
        let values = match self {
            ImageList::Sequence(values) => values,
            ImageList::Mapping(map) => map.into_values().collect(),
        };
        values
            .into_iter()
            .map(|value| match value {
                Value::String(image) => Ok(image),
                other => Err(anyhow!("{other:?} is not a string")),
            })
            .collect()
    }
}
