//! Places a source CSV where the database server process can read it.
//!
//! A staging directory is either a plain local path (the server shares the
//! filesystem) or `user@host:/dir`. Remote files are streamed through
//! `ssh host "cat > <path>"` and removed with `ssh host rm -f -- <path>`;
//! the remote path is always single-quoted for the remote shell. The staged
//! file is always named `<table>.csv` so reruns overwrite rather than
//! accumulate.
//!
//! A local source that already is the staged file is used in place and is
//! never removed afterwards.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::{debug, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingTarget {
    Local(PathBuf),
    Remote { host: String, directory: String },
}

/// A file placed by [`StagingTarget::stage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    path: String,
    in_place: bool,
}

impl StagedFile {
    /// Path of the staged file as the database server sees it.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True when the source already was the staged file; it is left alone
    /// on release.
    pub fn is_in_place(&self) -> bool {
        self.in_place
    }
}

impl StagingTarget {
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if let Some((host, directory)) = location.split_once(':')
            && host.contains('@')
            && !directory.is_empty()
        {
            return StagingTarget::Remote {
                host: host.to_string(),
                directory: directory.trim_end_matches('/').to_string(),
            };
        }
        StagingTarget::Local(PathBuf::from(location))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StagingTarget::Remote { .. })
    }

    /// Path of the staged file as the database server sees it.
    pub fn server_path(&self, table: &str) -> String {
        let file_name = staged_file_name(table);
        match self {
            StagingTarget::Local(dir) => dir.join(file_name).to_string_lossy().into_owned(),
            StagingTarget::Remote { directory, .. } => format!("{directory}/{file_name}"),
        }
    }

    /// Copies `source` into the staging location.
    pub fn stage(&self, source: &Path, table: &str) -> Result<StagedFile> {
        let destination = self.server_path(table);
        match self {
            StagingTarget::Local(_) => {
                if same_file(source, Path::new(&destination)) {
                    info!("{source:?} already sits in the staging directory; using it in place");
                    return Ok(StagedFile {
                        path: destination,
                        in_place: true,
                    });
                }
                info!("Staging {source:?} at {destination}");
                fs::copy(source, &destination).map_err(|source| Error::Transfer {
                    path: destination.clone(),
                    source,
                })?;
            }
            StagingTarget::Remote { host, .. } => {
                let target = format!("{host}:{destination}");
                info!("Staging {source:?} at {target}");
                let input = File::open(source).map_err(|err| Error::Transfer {
                    path: source.to_string_lossy().into_owned(),
                    source: err,
                })?;
                run_command(
                    remote_upload_command(host, &destination).stdin(Stdio::from(input)),
                    &target,
                )?;
            }
        }
        Ok(StagedFile {
            path: destination,
            in_place: false,
        })
    }

    /// Removes a file placed by [`stage`](Self::stage) unless it was used in
    /// place.
    pub fn release(&self, staged: &StagedFile, table: &str) -> Result<()> {
        if staged.in_place {
            debug!("Keeping {} (source used in place)", staged.path);
            return Ok(());
        }
        self.remove(table)
    }

    /// Removes the staged file for `table`; a missing file is not an error.
    pub fn remove(&self, table: &str) -> Result<()> {
        let staged = self.server_path(table);
        match self {
            StagingTarget::Local(_) => {
                debug!("Removing staged file {staged}");
                match fs::remove_file(&staged) {
                    Ok(()) => Ok(()),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                    Err(source) => Err(Error::Transfer {
                        path: staged,
                        source,
                    }),
                }
            }
            StagingTarget::Remote { host, .. } => {
                debug!("Removing staged file {host}:{staged}");
                run_command(
                    &mut remote_remove_command(host, &staged),
                    &format!("{host}:{staged}"),
                )
            }
        }
    }
}

pub fn staged_file_name(table: &str) -> String {
    format!("{table}.csv")
}

/// Single-quotes `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `ssh <host> cat > '<path>'`; the caller wires the source file to stdin.
pub fn remote_upload_command(host: &str, path: &str) -> Command {
    let mut command = Command::new("ssh");
    command
        .arg(host)
        .arg(format!("cat > {}", shell_quote(path)));
    command
}

pub fn remote_remove_command(host: &str, path: &str) -> Command {
    let mut command = Command::new("ssh");
    command
        .arg(host)
        .arg(format!("rm -f -- {}", shell_quote(path)));
    command
}

fn same_file(source: &Path, destination: &Path) -> bool {
    match (fs::canonicalize(source), fs::canonicalize(destination)) {
        (Ok(source), Ok(destination)) => source == destination,
        _ => false,
    }
}

fn run_command(command: &mut Command, target: &str) -> Result<()> {
    let status = command.status().map_err(|source| Error::Transfer {
        path: target.to_string(),
        source,
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Transfer {
            path: target.to_string(),
            source: io::Error::other(format!("{command:?} exited with {status}")),
        })
    }
}
