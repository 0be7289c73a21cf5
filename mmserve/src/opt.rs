use crate::config::Workspace;
use crate::Error;
use clap::Parser;
use std::path::PathBuf;

/// A query server for Metamath proof databases.
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct Opt {
    /// The main database file (the include-graph root)
    ///
    /// May be omitted when --config supplies a workspace descriptor.
    pub main_file: Option<PathBuf>,

    /// Number of worker threads for parsing and verification
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Enable debug logging
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Read a JSON workspace descriptor, e.g. {"mainFile": "set.mm", "jobs": 4}
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Build and verify the database, print diagnostics and exit
    #[arg(long)]
    pub check: bool,
}

impl Opt {
    /// Merge the command line over the workspace descriptor.
    pub fn workspace(&self) -> Result<Workspace, Error> {
        let mut ws = match &self.config {
            Some(path) => Workspace::from_file(path)?,
            None => Workspace::new(self.main_file.clone().ok_or(Error::NoMainFile)?),
        };
        if let Some(main) = &self.main_file {
            ws.main_file = main.clone();
        }
        if let Some(jobs) = self.jobs {
            ws = ws.with_jobs(jobs);
        }
        Ok(ws)
    }
}
