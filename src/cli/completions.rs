//! Shell completion generation.

use std::io::{self, Write};

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::args::Cli;

/// Render the completion script for `shell` into `out`.
pub fn write(shell: Shell, out: &mut impl Write) {
    let mut cmd = Cli::command();
    let command_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, command_name, out);
}

/// Print the completion script for `shell` to stdout.
pub fn print(shell: Shell) {
    write(shell, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_script_references_the_command() {
        let mut buf = Vec::new();
        write(Shell::Bash, &mut buf);
        let script = String::from_utf8(buf).expect("completion script must be UTF-8");
        assert!(script.contains("screenrec"));
        assert!(script.contains("record"));
    }
}
