//! UI settings file: allow-lists and per-group texts.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MintError, Result};
use crate::merkle::{MerkleTree, Node};

/// Wallet addresses per guard group label.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowLists(BTreeMap<String, Vec<String>>);

impl AllowLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: impl Into<String>, addresses: Vec<String>) -> Self {
        self.0.insert(label.into(), addresses);
        self
    }

    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.0.get(label).map(|v| v.as_slice())
    }

    pub fn tree(&self, label: &str) -> Option<MerkleTree> {
        self.get(label).map(MerkleTree::new)
    }

    pub fn root(&self, label: &str) -> Option<Node> {
        self.tree(label).map(|t| t.root())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupText {
    pub label: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub mint_text: Option<String>,
    #[serde(default)]
    pub button_label: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub header_text: Option<String>,
    #[serde(default)]
    pub allow_lists: AllowLists,
    #[serde(default)]
    pub groups: Vec<GroupText>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MintError::Config(format!("cannot read settings {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| MintError::Config(format!("invalid settings file: {}", e)))
    }

    pub fn text(&self, label: &str) -> Option<&GroupText> {
        self.groups.iter().find(|g| g.label == label)
    }
}
