//! JSON fixture loader.
//!
//! Loads fixture files (raw legacy user documents, normalized rows) relative to
//! the crate that runs the test.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Load a JSON fixture file relative to the calling crate's manifest directory.
///
/// # Example
/// ```no_run
/// use campus_testing::fixture::Fixture;
/// let val = Fixture::load("fixtures/population.json");
/// ```
pub struct Fixture;

impl Fixture {
    /// Load and parse a fixture JSON file at `manifest_dir/path`, falling back
    /// to the workspace root (the first ancestor holding `Cargo.lock`).
    ///
    /// Panics if the file is missing or invalid JSON.
    pub fn load(relative_path: &str) -> Value {
        let full_path = resolve(relative_path);
        let contents = std::fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("fixture not found at {}: {}", full_path.display(), e));
        serde_json::from_str(&contents)
            .unwrap_or_else(|e| panic!("invalid JSON in fixture {}: {}", relative_path, e))
    }

    /// Load a fixture and deserialize it into `T`.
    pub fn load_as<T: DeserializeOwned>(relative_path: &str) -> T {
        serde_json::from_value(Self::load(relative_path))
            .unwrap_or_else(|e| panic!("fixture {} has unexpected shape: {}", relative_path, e))
    }
}

fn resolve(relative_path: &str) -> PathBuf {
    let start = std::env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap());

    let direct = start.join(relative_path);
    if direct.exists() {
        return direct;
    }

    let workspace_root = Path::new(&start)
        .ancestors()
        .find(|a| a.join("Cargo.lock").exists())
        .unwrap_or(&start)
        .to_path_buf();
    workspace_root.join(relative_path)
}
