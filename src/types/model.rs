//! Model listing types.

use serde::{Deserialize, Serialize};

/// One servable model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCard {
    pub id: String,
    pub object: String,
    pub owned_by: String,
}

impl ModelCard {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: "model".to_string(),
            owned_by: "owner".to_string(),
        }
    }
}

/// Response body of `/models`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelCard>,
}

impl ModelList {
    pub fn new(data: Vec<ModelCard>) -> Self {
        Self {
            object: "list".to_string(),
            data,
        }
    }

    /// Model ids in listing order.
    pub fn ids(&self) -> Vec<&str> {
        self.data.iter().map(|card| card.id.as_str()).collect()
    }
}
