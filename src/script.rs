//! # Action Scripts
//!
//! Actions fed to the `psicash` binary, one JSON object per line:
//!
//! ```text
//! # comments and blank lines are skipped
//! {"type": "GetPsiCashRemote", "connection_state": "connected"}
//! {"type": "LoadVideoAd", "connection_state": "connected"}
//! {"type": "Foo"}                       ← kept as Unrecognized
//! ```
//!
//! An unknown `type` is not a script error: it reaches the pipeline, which
//! reports it. A known `type` with bad fields is rejected here.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use log::{debug, info};

use crate::core::action::IncomingAction;

#[derive(Debug)]
pub enum ScriptError {
    Io(io::Error),
    Parse { line: usize, source: serde_json::Error },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Io(e) => write!(f, "script I/O error: {e}"),
            ScriptError::Parse { line, source } => {
                write!(f, "script parse error on line {line}: {source}")
            }
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScriptError::Io(e) => Some(e),
            ScriptError::Parse { source, .. } => Some(source),
        }
    }
}

/// Parses a whole script. Line numbers in errors are 1-based.
pub fn parse_script(contents: &str) -> Result<Vec<IncomingAction>, ScriptError> {
    let mut actions = Vec::new();
    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parse_error = |source| ScriptError::Parse {
            line: index + 1,
            source,
        };
        let value = serde_json::from_str(line).map_err(parse_error)?;
        let action = IncomingAction::from_json(value).map_err(parse_error)?;
        debug!("Script line {}: {}", index + 1, action);
        actions.push(action);
    }
    Ok(actions)
}

/// Reads a script from `path`, or from stdin when no path is given.
pub fn read_script(path: Option<&Path>) -> Result<Vec<IncomingAction>, ScriptError> {
    let contents = match path {
        Some(path) => {
            info!("Reading action script from {}", path.display());
            fs::read_to_string(path).map_err(ScriptError::Io)?
        }
        None => {
            info!("Reading action script from stdin");
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).map_err(ScriptError::Io)?;
            buf
        }
    };
    parse_script(&contents)
}
