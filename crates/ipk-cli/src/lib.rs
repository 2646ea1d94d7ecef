//! ipk - webOS package builder
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Builds an installable `.ipk` from one application directory and any
//! number of service directories.
//!
//! # Output Layout
//!
//! ```text
//! <id>_<version>_<arch>.ipk      ar archive
//! ├── debian-binary              "2.0\n"
//! ├── control.tar.gz             ./control
//! └── data.tar.gz                ./usr/palm/{applications,services,packages}/<id>/
//! ```
//!
//! # Configuration
//!
//! Settings come from `--config`, then `$IPK_CONFIG`, then
//! `~/.config/ipk/config.toml`. Command-line flags override the file.

pub mod cmd;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ipk")]
#[command(author, version, about = "ipk - build webOS .ipk packages")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to a config file
    #[arg(long, global = true, env = "IPK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a package from app and service directories
    Package(PackageArgs),
    /// Classify directories and validate their metadata without building
    Check {
        /// Application, service and package directories
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct PackageArgs {
    /// Application, service and package directories
    #[arg(required = true)]
    pub dirs: Vec<PathBuf>,

    /// Directory the package is written to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Architecture recorded in the control file and the file name
    #[arg(long)]
    pub arch: Option<String>,

    /// Copy scripts unchanged
    #[arg(long)]
    pub no_minify: bool,

    /// External uglify-compatible minifier program
    #[arg(long, conflicts_with = "no_minify")]
    pub minifier: Option<String>,

    /// Keep the staging directory after a successful build
    #[arg(long)]
    pub keep_temp: bool,
}
