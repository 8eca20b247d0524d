use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::common::Options;
use crate::reflink::ReflinkMode;
use crate::ArchiverError;

/// Pack a directory into a single file, cloning file extents on copy-on-write filesystems.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["create", "extract", "list"])))]
pub struct Args {
    /// Create an archive from one or more directories.
    #[arg(short = 'c', long)]
    pub create: bool,

    /// Extract the archive into the directory PATH.
    #[arg(short = 'x', long)]
    pub extract: bool,

    /// List the contents of the archive.
    #[arg(short = 't', long)]
    pub list: bool,

    /// The archive file to create, extract or list.
    #[arg(short = 'f', long = "file", value_name = "ARCHIVE")]
    pub file: PathBuf,

    /// Log every entry as it is processed.
    #[arg(short, long)]
    pub verbose: bool,

    /// Never attempt block cloning; always copy file contents.
    #[arg(long = "no-reflink", action = clap::ArgAction::SetFalse, default_value_t = true)]
    pub reflink: bool,

    /// Source directories with -c (one or more), the destination directory with -x.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}

/// The operation selected on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    Create { sources: Vec<PathBuf>, archive: PathBuf },
    Extract { archive: PathBuf, destination: PathBuf },
    List { archive: PathBuf },
}

impl Args {
    /// Resolves the mode flags into a single command.
    ///
    /// clap already guarantees exactly one mode flag; how many PATHs are allowed depends on
    /// the mode and is checked here.
    pub fn command(&self) -> Result<Commands, ArchiverError> {
        let archive = self.file.clone();
        if self.create {
            if self.paths.is_empty() {
                return Err(ArchiverError::Usage("-c needs at least one PATH to archive".into()));
            }
            Ok(Commands::Create { sources: self.paths.clone(), archive })
        } else if self.extract {
            match self.paths.as_slice() {
                [destination] => Ok(Commands::Extract { archive, destination: destination.clone() }),
                [] => Err(ArchiverError::Usage("-x needs a destination PATH".into())),
                _ => Err(ArchiverError::Usage("-x takes exactly one destination PATH".into())),
            }
        } else if self.list {
            if !self.paths.is_empty() {
                return Err(ArchiverError::Usage("-t takes no PATH".into()));
            }
            Ok(Commands::List { archive })
        } else {
            Err(ArchiverError::Usage("exactly one of -c, -x or -t must be given".into()))
        }
    }

    pub fn options(&self) -> Options {
        Options {
            reflink: if self.reflink { ReflinkMode::Auto } else { ReflinkMode::Never },
        }
    }
}

/// Parses command-line arguments using `clap`.
///
/// Errors are returned rather than printed so the caller decides on the exit status.
pub fn run() -> Result<Args, clap::Error> {
    Args::try_parse()
}
