// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::process::ExitCode;

use anyhow::Result;
use tpl_core::{Error, Session};

use super::Environment;
use crate::cli::DataArgs;

pub fn run(env: &Environment, args: DataArgs) -> Result<ExitCode> {
    let options = env.options(args);
    let session = Session::open(options, super::env_vars())?;

    let failures = session.ensure();
    if failures.is_empty() {
        println!("there is no missing key");
        return Ok(ExitCode::SUCCESS);
    }
    for failure in &failures {
        match failure {
            Error::MissingKey { name, key } => {
                eprintln!("tpl: missing key found in '{name}': {key}");
            }
            other => eprintln!("tpl: {other}"),
        }
    }
    Ok(ExitCode::FAILURE)
}
