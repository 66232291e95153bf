// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tpl_core::{parse_missing_key, Session, Terminal, WriteOutcome};
use tracing::debug;

use super::{report_failures, Environment};
use crate::cli::ExecArgs;

pub fn run(env: &Environment, args: ExecArgs) -> Result<ExitCode> {
    let mut options = env.options(args.data);
    options.missing_key = parse_missing_key(&args.missing_key)?;
    options.interactive |= args.interactive;
    options.fold_context &= !args.no_fold_context;
    options.out = args.out;
    options.outdir = args.outdir;
    options.trim_prefix = args.trim_prefix;
    options.overwrite |= args.overwrite;
    options.show_processed |= args.show_file;
    options.export_file = args.export_data;

    let session = Session::open(options, super::env_vars())?;
    let mut prompt = Terminal::stdio();
    let mut stdout = io::stdout();

    let execution = session
        .execute(&mut prompt, &env.palette)
        .context("failed to execute templates")?;
    debug!(
        rendered = execution.files.len(),
        failed = execution.failures.len(),
        "templates executed"
    );

    if session.options().export_file.is_some() {
        let text = session.export_data(&execution.answers)?;
        if let Some(WriteOutcome::Skipped) = session.store_data(&text, &mut stdout, &mut prompt)? {
            eprintln!("tpl: data export skipped");
        }
    }

    let mut files = execution.files;
    session.fill_destinations(&mut files);
    let outcomes = session
        .write_rendered(&mut files, &mut stdout, &mut prompt, &env.palette)
        .context("failed to write processed templates")?;
    for (path, outcome) in outcomes {
        if outcome == WriteOutcome::Skipped {
            eprintln!("tpl: skipped '{}'", path.display());
        }
    }

    Ok(report_failures(&execution.failures))
}
