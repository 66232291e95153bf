// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Line-oriented interaction with whoever is answering for missing keys.

use std::io::{self, BufRead, Write};

use crate::error::{Error, Result};

/// Display and question channel used by the completion driver and the
/// overwrite confirmation.
pub trait Prompt {
    /// Prints `line` followed by a newline.
    fn show(&mut self, line: &str) -> Result<()>;

    /// Prints `question` without a newline and reads one answer line with
    /// its line ending removed. End of input reads as an empty answer.
    fn ask(&mut self, question: &str) -> Result<String>;
}

/// [`Prompt`] over any reader and writer pair.
#[derive(Debug)]
pub struct Terminal<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Terminal<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Terminal { input, output }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl Terminal<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Terminal::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompt for Terminal<R, W> {
    fn show(&mut self, line: &str) -> Result<()> {
        writeln!(self.output, "{line}").map_err(|err| Error::io("failed to write prompt", err))
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{question}")
            .and_then(|()| self.output.flush())
            .map_err(|err| Error::io("failed to write prompt", err))?;

        let mut answer = String::new();
        self.input
            .read_line(&mut answer)
            .map_err(|err| Error::io("failed to read answer", err))?;
        if answer.ends_with('\n') {
            answer.pop();
            if answer.ends_with('\r') {
                answer.pop();
            }
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn strips_line_endings_only() {
        let mut term = Terminal::new(Cursor::new("  spaced \r\nnext\n"), Vec::new());
        assert_eq!(term.ask("value: ").unwrap(), "  spaced ");
        assert_eq!(term.ask("again: ").unwrap(), "next");
        let (_, output) = term.into_parts();
        assert_eq!(String::from_utf8(output).unwrap(), "value: again: ");
    }

    #[test]
    fn end_of_input_is_empty_answer() {
        let mut term = Terminal::new(Cursor::new(""), Vec::new());
        assert_eq!(term.ask("q? ").unwrap(), "");
    }

    #[test]
    fn show_appends_newline() {
        let mut term = Terminal::new(Cursor::new(""), Vec::new());
        term.show("[a.tpl]").unwrap();
        assert_eq!(term.into_parts().1, b"[a.tpl]\n");
    }
}
