// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Command-line structure.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(name = "tpl", version, about = "Render Go templates with data files, env vars and interactive input")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: ~/.tpl.yaml or ./.tpl.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Render templates
    Exec(ExecArgs),

    /// Check that the data covers every key the templates use
    Ensure(DataArgs),

    /// Print the keys the templates use, with the values the data has
    Keys(KeysArgs),

    /// Print a shell completion script
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct DataArgs {
    /// Colon separated data files or glob patterns
    #[arg(short = 'd', long = "datafile", default_value = "")]
    pub datafile: String,

    /// Take referenced top-level keys from environment variables
    #[arg(short, long)]
    pub env: bool,

    /// Take keys below PREFIX from environment variables
    #[arg(short = 'p', long = "env-prefix", value_name = "PREFIX")]
    pub env_prefix: Option<String>,

    /// Format of data files without a known extension
    #[arg(short = 'f', long = "format", default_value = "yaml")]
    pub format: String,

    /// Template files
    #[arg(value_name = "TMPL_FILE", required = true)]
    pub templates: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExecArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Store the data, including interactive answers, in FILE
    #[arg(short = 'x', long = "export-data", value_name = "FILE")]
    pub export_data: Option<PathBuf>,

    /// Do not show the enclosing lines of a missing key
    #[arg(short = 'c', long = "no-fold-context")]
    pub no_fold_context: bool,

    /// Ask for missing keys on stdin
    #[arg(short, long)]
    pub interactive: bool,

    /// Missing key policy: error, zero, default or invalid
    #[arg(short = 'm', long = "missingkey", default_value = "error")]
    pub missing_key: String,

    /// Output file; with several templates use --outdir
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Directory for rendered templates
    #[arg(long)]
    pub outdir: Option<PathBuf>,

    /// Prefix removed from template paths below --outdir
    #[arg(long, value_name = "PREFIX")]
    pub trim_prefix: Option<String>,

    /// Replace existing files without asking
    #[arg(long)]
    pub overwrite: bool,

    /// Report each processed template
    #[arg(short = 's', long = "show-file")]
    pub show_file: bool,
}

#[derive(Debug, Args)]
pub struct KeysArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Output format: yaml, json or kv (default: from --out, else yaml)
    #[arg(short = 't', long = "output-format", value_name = "FMT")]
    pub output_format: Option<String>,

    /// Only list keys the data does not provide
    #[arg(short = 'm', long)]
    pub missing: bool,

    /// Store the keys in FILE instead of printing them
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}
