//! Operator confirmation before destructive steps.

use std::io::{self, BufRead, Write};
use tracing::warn;

const YES: &[&str] = &["yes", "y", "ye", "yup", "yo", "sure"];
const NO: &[&str] = &["no", "n", "nope", "na", "better not"];

/// Decides whether a deletion may go ahead.
#[cfg_attr(test, mockall::automock)]
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Asks on the terminal and waits for a yes/no answer.
///
/// Declines without asking when stdin is not a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if !atty::is(atty::Stream::Stdin) {
            warn!("Confirmation required but stdin is not a terminal; declining: {}", prompt);
            return false;
        }
        let stdin = io::stdin();
        let mut stderr = io::stderr();
        match ask(&mut stdin.lock(), &mut stderr, prompt) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Could not read confirmation: {}", e);
                false
            }
        }
    }
}

/// Writes `prompt` and reads lines until one is a recognised answer.
/// End of input counts as "no".
pub(crate) fn ask<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    prompt: &str,
) -> io::Result<bool> {
    writeln!(writer, "{} (yes|no)", prompt)?;
    writer.flush()?;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        let choice = line.trim().to_lowercase();
        if YES.contains(&choice.as_str()) {
            return Ok(true);
        }
        if NO.contains(&choice.as_str()) {
            return Ok(false);
        }
        writeln!(writer, "Please respond with 'yes' or 'no'")?;
        writer.flush()?;
    }
}
