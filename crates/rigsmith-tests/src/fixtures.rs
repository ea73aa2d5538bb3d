//! Test fixtures: built rigs and config files on disk.

use std::fs;
use std::path::{Path, PathBuf};

use rigsmith_core::{MemoryScene, NodeId, RigConfig, RigWorkflow, SceneAdapter};
use tempfile::TempDir;

/// Runs every workflow step for `config` on a fresh in-memory scene.
pub fn built_rig(config: RigConfig) -> RigWorkflow<MemoryScene> {
    let mut workflow =
        RigWorkflow::new(MemoryScene::new(), config).expect("Failed to start workflow");
    workflow.build_all().expect("Failed to build rig");
    workflow
}

/// Parent hops from `node` up to `ancestor`, `None` when it is not an ancestor.
pub fn hops<S: SceneAdapter>(scene: &S, node: NodeId, ancestor: NodeId) -> Option<usize> {
    let mut count = 0;
    let mut current = node;
    while current != ancestor {
        current = scene.parent(current).ok()??;
        count += 1;
    }
    Some(count)
}

/// A temporary directory holding a rig config file.
pub struct ConfigFixture {
    pub root: TempDir,
    pub config_path: PathBuf,
}

impl ConfigFixture {
    /// Writes `config` as `rig.json` in a new temporary directory.
    pub fn new(config: &RigConfig) -> Self {
        let json = config.to_json().expect("Failed to serialize config");
        Self::from_json(&json)
    }

    /// Writes raw JSON, valid or not, as `rig.json`.
    pub fn from_json(json: &str) -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let config_path = root.path().join("rig.json");
        fs::write(&config_path, json).expect("Failed to write config file");
        Self { root, config_path }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn config_str(&self) -> &str {
        self.config_path.to_str().expect("Temp path is not UTF-8")
    }

    /// Path for an output file inside the fixture directory.
    pub fn output(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }
}
