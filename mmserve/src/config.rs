//! The workspace descriptor supplied by the editor collaborator.

use crate::Error;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

fn default_jobs() -> usize {
    1
}

/// Workspace configuration: the include-graph root and the size of the
/// worker pool.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub main_file: PathBuf,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Workspace {
    pub fn new(main_file: impl Into<PathBuf>) -> Self {
        Self {
            main_file: main_file.into(),
            jobs: default_jobs(),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Read a JSON descriptor like `{ "mainFile": "set.mm", "jobs": 4 }`.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let ws: Workspace = serde_json::from_reader(File::open(path)?)?;
        Ok(ws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_parses() {
        let ws: Workspace = serde_json::from_str(r#"{ "mainFile": "set.mm", "jobs": 4 }"#).unwrap();
        assert_eq!(ws.main_file, PathBuf::from("set.mm"));
        assert_eq!(ws.jobs, 4);

        let ws: Workspace = serde_json::from_str(r#"{ "mainFile": "set.mm" }"#).unwrap();
        assert_eq!(ws.jobs, 1);
    }
}
