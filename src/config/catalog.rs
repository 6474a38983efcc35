// src/config/catalog.rs

//! Host and action catalogs.
//!
//! Both are supplied by the surrounding platform; the engine only reads them.
//! They can be built in code or loaded from TOML files:
//!
//! ```toml
//! [host.web-1]
//! ip = "10.0.0.11"
//! user = "deploy"
//! mode = "key"
//! key_path = "~/.ssh/id_ed25519"
//!
//! [action.backup]
//! language = "sh"
//! content = "tar czf /tmp/backup.tgz /etc"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::{reveal, Cipher};
use crate::errors::Result;
use crate::types::ConnectionMode;

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "root".to_string()
}

/// One host as the engine sees it: where it is and how to log in.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HostDescriptor {
    /// Filled from the catalog key when loading from TOML.
    #[serde(default)]
    pub id: String,

    pub ip: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub mode: ConnectionMode,

    /// Plaintext or `enc:`-prefixed password.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default)]
    pub key_path: Option<PathBuf>,

    /// Plaintext or `enc:`-prefixed key passphrase.
    #[serde(default, skip_serializing)]
    pub passphrase: Option<String>,
}

impl HostDescriptor {
    /// A host reached through the controller itself.
    pub fn local(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ip: "127.0.0.1".to_string(),
            port: default_port(),
            user: default_user(),
            mode: ConnectionMode::Local,
            password: None,
            key_path: None,
            passphrase: None,
        }
    }

    /// Decrypt stored credentials in place.
    pub fn reveal_credentials(&mut self, cipher: Option<&Cipher>) -> Result<()> {
        if let Some(ref stored) = self.password {
            self.password = Some(reveal(stored, cipher)?);
        }
        if let Some(ref stored) = self.passphrase {
            self.passphrase = Some(reveal(stored, cipher)?);
        }
        Ok(())
    }
}

/// Host id -> descriptor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HostCatalog {
    #[serde(default)]
    pub host: BTreeMap<String, HostDescriptor>,
}

impl HostCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut host: HostDescriptor) {
        if host.id.is_empty() {
            host.id = host.ip.clone();
        }
        self.host.insert(host.id.clone(), host);
    }

    pub fn get(&self, id: &str) -> Option<&HostDescriptor> {
        self.host.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.host.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    /// Parse TOML text and decrypt any `enc:` credentials.
    pub fn from_toml(text: &str, cipher: Option<&Cipher>) -> Result<Self> {
        let mut catalog: HostCatalog = toml::from_str(text)?;
        for (id, host) in catalog.host.iter_mut() {
            host.id = id.clone();
            host.reveal_credentials(cipher)?;
        }
        debug!(hosts = catalog.len(), "loaded host catalog");
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>, cipher: Option<&Cipher>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text, cipher)
    }
}

/// One reusable action (script body or command list source).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Action {
    /// Interpreter or language tag, e.g. `"sh"`, `"bash"`, `"python3"`.
    #[serde(default = "default_language")]
    pub language: String,
    pub content: String,
}

fn default_language() -> String {
    "sh".to_string()
}

/// Action id -> action.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ActionCatalog {
    #[serde(default)]
    pub action: BTreeMap<String, Action>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, action: Action) {
        self.action.insert(id.into(), action);
    }

    pub fn get(&self, id: &str) -> Option<&Action> {
        self.action.get(id)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let catalog: ActionCatalog = toml::from_str(text)?;
        debug!(actions = catalog.action.len(), "loaded action catalog");
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }
}
