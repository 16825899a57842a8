//! The interactive read-eval-print loop.
//!
//! Output and prompting adapt to whether stdin is a terminal: piped input
//! (scripted or test use) gets no banner and no prompt, so a session's
//! stdout is exactly the commands' own output.

use std::io::{self, BufRead, IsTerminal, Write};

use kvds_core::CommandError;

use crate::commands::{execute_line, CommandState};

/// Process exit codes, matching the original binary's contract.
pub const EXIT_CLEAN: i32 = 0;
pub const EXIT_COMMAND_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Runs commands from `input` until EOF or `quit`, writing command output to
/// `output` and prompts/banners to `prompt_output` only when `interactive`.
pub fn run(
    state: &mut CommandState,
    algorithm: &str,
    input: impl BufRead,
    mut output: impl Write,
    mut prompt_output: impl Write,
    interactive: bool,
) -> i32 {
    if interactive {
        let _ = writeln!(prompt_output, "Created a database with algorithm: {algorithm}");
        let _ = writeln!(prompt_output, "Use \"help\" for a list of commands.");
    }

    let mut saw_error = false;
    for line in input.lines() {
        let Ok(line) = line else {
            return EXIT_USAGE;
        };

        if interactive {
            let _ = write!(prompt_output, "> ");
            let _ = prompt_output.flush();
        }

        match execute_line(state, &line, &mut output) {
            Ok(()) => {}
            Err(CommandError::Quit) => return EXIT_CLEAN,
            Err(CommandError::Invalid) => {
                let _ = writeln!(prompt_output, "Error: Invalid command");
                saw_error = true;
            }
            Err(CommandError::Unimplemented) => {
                let _ = writeln!(prompt_output, "Error: Unimplemented command");
                saw_error = true;
            }
        }
    }

    if saw_error {
        EXIT_COMMAND_ERROR
    } else {
        EXIT_CLEAN
    }
}

/// Whether stdin should be treated as an interactive terminal.
pub fn stdin_is_interactive() -> bool {
    io::stdin().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piped_input_produces_no_banner_or_prompt() {
        let mut state = CommandState::new(kvds_list::create());
        let mut out = Vec::new();
        let mut prompts = Vec::new();
        let code = run(
            &mut state,
            "linkedlist",
            "s 1\nw hi\nr\n".as_bytes(),
            &mut out,
            &mut prompts,
            false,
        );
        assert_eq!(code, EXIT_CLEAN);
        assert_eq!(out, b"hi");
        assert!(prompts.is_empty());
    }

    #[test]
    fn quit_stops_the_loop_with_a_clean_exit() {
        let mut state = CommandState::new(kvds_list::create());
        let mut out = Vec::new();
        let mut prompts = Vec::new();
        let code = run(
            &mut state,
            "linkedlist",
            "s 1\nquit\nw unreached\n".as_bytes(),
            &mut out,
            &mut prompts,
            false,
        );
        assert_eq!(code, EXIT_CLEAN);
        assert_eq!(out, b"");
    }

    #[test]
    fn an_invalid_command_yields_exit_code_one_but_keeps_going() {
        let mut state = CommandState::new(kvds_list::create());
        let mut out = Vec::new();
        let mut prompts = Vec::new();
        let code = run(
            &mut state,
            "linkedlist",
            "bogus\ns 1\nw ok\nr\n".as_bytes(),
            &mut out,
            &mut prompts,
            false,
        );
        assert_eq!(code, EXIT_COMMAND_ERROR);
        assert_eq!(out, b"ok");
    }
}
