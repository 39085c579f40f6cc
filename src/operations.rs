//! Action dispatch for the command line.
//!
//! Arguments are validated before anything touches the network: an action
//! with missing flags prints a message and never authenticates.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use clap::{Args, ValueEnum};

use crate::client::DriveClient;
use crate::error::{DriveError, Result};
use crate::url_parser::extract_id;

/// File operation to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    Create,
    List,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Create => "create",
            Action::List => "list",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Flags shared by all actions. Which ones are required depends on the action.
#[derive(Debug, Clone, Default, Args)]
pub struct FileArgs {
    /// Name of the file to create.
    #[arg(long)]
    pub filename: Option<String>,

    /// MIME type of the file to create/update.
    #[arg(long)]
    pub mimetype: Option<String>,

    /// Path of the local file to create/update from.
    #[arg(long)]
    pub filepath: Option<PathBuf>,

    /// ID or URL of the file to update/delete.
    #[arg(long)]
    pub fileid: Option<String>,

    /// New name of the file for update.
    #[arg(long)]
    pub newname: Option<String>,
}

/// A fully validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create {
        name: String,
        mime_type: String,
        path: PathBuf,
    },
    List {
        page_size: u32,
    },
    Update {
        file_id: String,
        new_name: String,
        mime_type: String,
        path: PathBuf,
    },
    Delete {
        file_id: String,
    },
}

impl Operation {
    /// Validate the flags required by `action`.
    pub fn from_args(action: Action, args: &FileArgs, page_size: u32) -> Result<Self> {
        match action {
            Action::Create => match (&args.filename, &args.mimetype, &args.filepath) {
                (Some(name), Some(mime_type), Some(path)) => Ok(Operation::Create {
                    name: name.clone(),
                    mime_type: mime_type.clone(),
                    path: path.clone(),
                }),
                _ => Err(DriveError::MissingArguments("Missing arguments for creation.")),
            },
            Action::List => Ok(Operation::List { page_size }),
            Action::Update => {
                match (&args.fileid, &args.newname, &args.mimetype, &args.filepath) {
                    (Some(file_id), Some(new_name), Some(mime_type), Some(path)) => {
                        Ok(Operation::Update {
                            file_id: extract_id(file_id)?,
                            new_name: new_name.clone(),
                            mime_type: mime_type.clone(),
                            path: path.clone(),
                        })
                    }
                    _ => Err(DriveError::MissingArguments("Missing arguments for update.")),
                }
            }
            Action::Delete => match &args.fileid {
                Some(file_id) => Ok(Operation::Delete {
                    file_id: extract_id(file_id)?,
                }),
                None => Err(DriveError::MissingArguments("File ID required for deletion.")),
            },
        }
    }

    /// Perform the operation and report the outcome to `out`.
    pub async fn execute<W: Write>(&self, client: &DriveClient, out: &mut W) -> Result<()> {
        match self {
            Operation::Create {
                name,
                mime_type,
                path,
            } => {
                let file = client.create_file(name, mime_type, path).await?;
                writeln!(out, "File ID: {} - {} created.", file.id, name)?;
            }
            Operation::List { page_size } => {
                let files = client.list_files(*page_size).await?;
                if files.is_empty() {
                    writeln!(out, "No files found.")?;
                } else {
                    writeln!(out, "Files:")?;
                    for file in files {
                        writeln!(out, "{}", file)?;
                    }
                }
            }
            Operation::Update {
                file_id,
                new_name,
                mime_type,
                path,
            } => {
                let file = client.update_file(file_id, new_name, mime_type, path).await?;
                writeln!(out, "File ID: {} - {} updated.", file.id, new_name)?;
            }
            Operation::Delete { file_id } => {
                client.delete_file(file_id).await?;
                writeln!(out, "File {} deleted.", file_id)?;
            }
        }
        Ok(())
    }
}

/// Validate and run `action`.
///
/// Missing flags are reported on `out` and are not an error: nothing is sent
/// and the call returns `Ok(())`.
pub async fn run<W: Write>(
    action: Action,
    args: &FileArgs,
    page_size: u32,
    client: &DriveClient,
    out: &mut W,
) -> Result<()> {
    match Operation::from_args(action, args, page_size) {
        Ok(operation) => operation.execute(client, out).await,
        Err(DriveError::MissingArguments(message)) => {
            writeln!(out, "{}", message)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}
