// src/stage.rs

//! Stage registry
//!
//! Maps the lifecycle stages to their directories on the agency server. A package
//! lives in exactly one stage directory at a time; that location is the only
//! record of where it is in the pipeline.

use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// Default root of the stage directories on the agency server
pub const DEFAULT_STAGE_ROOT: &str = "/share";

/// Lifecycle stage of a package on the agency server
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumString, Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Uploaded for translation
    Open,
    /// Translated, waiting to be deployed
    Deploy,
    /// Deployed and archived
    Done,
}

impl Stage {
    /// Directory name of the stage below the stage root
    ///
    /// `2_review` belonged to the retired review stage; the numbering is kept so
    /// existing servers keep working.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Open => "1_open",
            Self::Deploy => "3_deploy",
            Self::Done => "4_done",
        }
    }
}

/// Resolves stages to absolute remote paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRegistry {
    root: String,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_STAGE_ROOT)
    }
}

impl StageRegistry {
    /// Create a registry rooted at `root`
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let trimmed = root.trim_end_matches('/');
        let root = if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        };
        Self { root }
    }

    /// Root directory holding all stages
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Absolute remote path of a stage directory
    pub fn path_for(&self, stage: Stage) -> String {
        join_remote(&self.root, stage.dir_name())
    }

    /// Absolute remote path of an entry inside a stage
    pub fn entry_path(&self, stage: Stage, name: &str) -> String {
        join_remote(&self.path_for(stage), name)
    }

    /// All stages in pipeline order
    pub fn all() -> impl Iterator<Item = Stage> {
        Stage::iter()
    }
}

/// Join remote path segments with `/`, collapsing duplicate separators
pub fn join_remote(base: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches('/');
    if rel.is_empty() {
        return base.to_string();
    }
    if base.ends_with('/') {
        format!("{}{}", base, rel)
    } else {
        format!("{}/{}", base, rel)
    }
}
