//! Settings for the application. Configuration is read from `settings.toml`
//! (optional) and from `BUDGETBOX__*` environment variables, e.g.
//! `BUDGETBOX__STORE__DATA_DIR=/var/lib/budgetbox`.
use std::path::PathBuf;

use config::{Config, Environment, File};
use engine::SameKindPolicy;
use serde::Deserialize;
use store::{CollectionSchema, StoreDescriptor};

use crate::error::Result;

pub const TRANSACTIONS: &str = "transactions";
pub const ENVELOPES: &str = "envelopes";
pub const GOALS: &str = "goals";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Store {
    /// `None` keeps everything in memory for the lifetime of the process.
    pub data_dir: Option<PathBuf>,
    pub descriptor: StoreDescriptor,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            data_dir: Some(PathBuf::from("data")),
            descriptor: default_descriptor(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Worker {
    pub same_kind_policy: SameKindPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct List {
    pub item_height: f64,
    pub viewport_height: f64,
    pub overscan: usize,
}

impl Default for List {
    fn default() -> Self {
        Self {
            item_height: 40.0,
            viewport_height: 400.0,
            overscan: 3,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub store: Store,
    pub worker: Worker,
    pub list: List,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("BUDGETBOX")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

pub fn default_descriptor() -> StoreDescriptor {
    StoreDescriptor::new("budgetbox", 1)
        .collection(
            CollectionSchema::new(TRANSACTIONS, "id")
                .index("by_envelope", "envelopeId")
                .index("by_date", "date"),
        )
        .collection(CollectionSchema::new(ENVELOPES, "id"))
        .collection(CollectionSchema::new(GOALS, "id"))
}
