//! System hosts file loader.

use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use super::SystemHosts;
use super::parser::{HostsFileParser, ParseError};

/// Why the system hosts file could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("hosts file {0:?} does not exist")]
    NotFound(PathBuf),

    #[error("hosts file {0:?} is not readable")]
    PermissionDenied(PathBuf),

    #[error("failed to read hosts file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed hosts file")]
    Parse(#[from] ParseError),

    /// The blocking parse task panicked or was cancelled.
    #[error("hosts parsing task failed")]
    Join(#[from] tokio::task::JoinError),
}

impl LoadError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Loads the system hosts file from disk.
pub struct HostsLoader;

impl HostsLoader {
    /// Read, parse and compile a hosts file.
    ///
    /// Parsing runs on the blocking pool: pattern names in the file compile
    /// to regexes.
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use hostgate::hosts::{HostsLoader, QueryType};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let hosts = HostsLoader::load(Path::new("/etc/hosts")).await?;
    /// println!("localhost is {:?}", hosts.lookup("localhost", QueryType::A));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load(path: &Path) -> Result<SystemHosts, LoadError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| LoadError::from_io(path, err))?;

        let hosts = tokio::task::spawn_blocking(move || {
            HostsFileParser
                .parse(&mut BufReader::new(content.as_bytes()))
                .map(SystemHosts::from_mapping)
        })
        .await??;

        Ok(hosts)
    }
}
