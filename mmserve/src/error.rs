use std::io;

/// Central error type.
#[derive(Debug)]
pub enum Error {
    /// No main file given, neither on the command line nor in a
    /// workspace descriptor.
    NoMainFile,
    Io(io::Error),
    Config(serde_json::Error),
    /// The include-graph root could not be read at startup.
    Root(metamath_parse::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err)
    }
}

impl From<metamath_parse::Error> for Error {
    fn from(err: metamath_parse::Error) -> Self {
        Self::Root(err)
    }
}
