use serde::{Deserialize, Serialize};

use crate::model::AttrType;

/// A complete, explicit description of all model definitions at one commit.
///
/// Snapshots are plain data computed from a commit's schema content; they are
/// immutable per commit and therefore cacheable by commit hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Collection of model definitions
    pub models: Vec<ModelDef>,
    /// Optional schema description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaSnapshot {
    pub fn new(models: Vec<ModelDef>) -> Self {
        Self {
            models,
            description: None,
        }
    }

    /// Find a model definition by name
    pub fn get_model(&self, model_name: &str) -> Option<&ModelDef> {
        self.models.iter().find(|model| model.name == model_name)
    }

    pub fn has_model(&self, model_name: &str) -> bool {
        self.get_model(model_name).is_some()
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|model| model.name.as_str())
    }
}

/// A named model with an ordered sequence of attribute definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub attributes: Vec<AttributeDef>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>, attributes: Vec<AttributeDef>) -> Self {
        Self {
            name: name.into(),
            description: None,
            attributes,
        }
    }

    /// Find an attribute definition by name
    pub fn get_attribute(&self, attr_name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|attr| attr.name == attr_name)
    }

    pub fn has_attribute(&self, attr_name: &str) -> bool {
        self.get_attribute(attr_name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: AttrType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, attr_type: AttrType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: None,
        }
    }

}
