// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::io;
use std::process::ExitCode;

use anyhow::Result;
use tpl_core::{DataFormat, Session, Terminal, WriteOutcome};

use super::Environment;
use crate::cli::KeysArgs;

pub fn run(env: &Environment, args: KeysArgs) -> Result<ExitCode> {
    let mut options = env.options(args.data);
    options.export_file = args.out;
    options.export_format = args
        .output_format
        .as_deref()
        .map(str::parse::<DataFormat>)
        .transpose()?;
    options.only_missing = args.missing;

    let session = Session::open(options, super::env_vars())?;
    let keys = session.extract_keys()?;
    let text = session.export_data(&keys)?;

    let mut prompt = Terminal::stdio();
    let outcome = session.store_data(&text, &mut io::stdout(), &mut prompt)?;
    if let (Some(WriteOutcome::Skipped), Some(path)) = (outcome, &session.options().export_file) {
        eprintln!("tpl: skipped '{}'", path.display());
    }
    Ok(ExitCode::SUCCESS)
}
