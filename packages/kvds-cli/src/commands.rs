//! The REPL's command dispatcher.
//!
//! Mirrors the original line-oriented protocol exactly, including its two
//! quirks: `write` takes the rest of the line as its payload (embedded
//! spaces included, since a line never contains a newline), and `read`
//! prints a found payload with no trailing newline while an absent one
//! prints `(nil)\n` to stdout specifically, regardless of where `output`
//! points.

use std::io::Write;

use kvds_core::{CommandError, CursorId, Database, SnapDirection, Unimplemented};

const HELP_TEXT: &str = "\
Available commands: \n\
  select, s [key] - Move the cursor to key\n\
  key, k - Print current key\n\
  exists, e - Print whether current key exists\n\
  write, w [data...] - Write data at cursor\n\
  read, r - Print data at cursor\n\
  delete, d - Delete data at cursor\n\
  prev, p, < - Move cursor left\n\
  next, n, > - Move cursor right\n\
  closest, c - Move cursor to closest\n\
  # - Comment\n\
  help, ? - Print this message\n";

/// The live engine plus the single cursor the REPL drives it through.
pub struct CommandState {
    db: Box<dyn Database>,
    cursor: CursorId,
}

impl CommandState {
    /// Opens a cursor at key 0, matching the original's start-up state.
    pub fn new(mut db: Box<dyn Database>) -> Self {
        let cursor = db.create_cursor(0);
        Self { db, cursor }
    }
}

impl Drop for CommandState {
    fn drop(&mut self) {
        self.db.destroy_cursor(self.cursor);
    }
}

fn unimplemented(_: Unimplemented) -> CommandError {
    CommandError::Unimplemented
}

/// Parses a leading, possibly-signed decimal integer the way `strtoll` does:
/// on no digits, returns 0 and leaves `input` untouched.
fn parse_leading_i64(input: &str) -> (i64, &str) {
    let bytes = input.as_bytes();
    let mut idx = 0;
    if idx < bytes.len() && (bytes[idx] == b'+' || bytes[idx] == b'-') {
        idx += 1;
    }
    let digits_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == digits_start {
        return (0, input);
    }
    let value: i64 = input[..idx].parse().unwrap_or(0);
    (value, &input[idx..])
}

/// Executes every command packed into one input line, writing command
/// output to `output`. Returns on the first error or `quit`; a clean line
/// with no errors returns `Ok(())`.
pub fn execute_line(
    state: &mut CommandState,
    mut command: &str,
    output: &mut impl Write,
) -> Result<(), CommandError> {
    loop {
        command = command.trim_start_matches([' ', '\n']);
        if command.is_empty() {
            return Ok(());
        }

        let command_len = command
            .find([' ', '\n'])
            .unwrap_or(command.len());
        let (token, rest) = command.split_at(command_len);
        let mut args = rest.trim_start_matches([' ', '\n']);

        match token {
            "select" | "s" => {
                let (key, end) = parse_leading_i64(args);
                args = end;
                if state.db.move_cursor(state.cursor, key).is_err() {
                    state.db.destroy_cursor(state.cursor);
                    state.cursor = state.db.create_cursor(key);
                }
            }
            "key" | "k" => {
                let key = state.db.key(state.cursor).map_err(unimplemented)?;
                let _ = writeln!(output, "{key}");
            }
            "exists" | "e" => {
                let exists = state.db.exists(state.cursor).map_err(unimplemented)?;
                let _ = writeln!(output, "{}", if exists { "yes" } else { "no" });
            }
            "read" | "r" => {
                let stored = state.db.read(state.cursor).map_err(unimplemented)?;
                match stored {
                    Some(data) => {
                        let _ = output.write_all(data);
                    }
                    None => println!("(nil)"),
                }
            }
            "write" | "w" => {
                let payload = args.as_bytes().to_vec();
                args = &args[args.len()..];
                state
                    .db
                    .write(state.cursor, payload)
                    .map_err(unimplemented)?;
            }
            "delete" | "d" => {
                state.db.remove(state.cursor).map_err(unimplemented)?;
            }
            "prev" | "p" | "<" => {
                state
                    .db
                    .snap(state.cursor, SnapDirection::Lower)
                    .map_err(unimplemented)?;
            }
            "next" | "n" | ">" => {
                state
                    .db
                    .snap(state.cursor, SnapDirection::Higher)
                    .map_err(unimplemented)?;
            }
            "closest" | "c" => {
                state
                    .db
                    .snap(state.cursor, SnapDirection::ClosestLow)
                    .map_err(unimplemented)?;
            }
            "#" => return Ok(()),
            "help" | "?" => {
                let _ = write!(output, "{HELP_TEXT}");
            }
            "quit" | "q" => return Err(CommandError::Quit),
            _ => return Err(CommandError::Invalid),
        }

        command = args;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(create: fn() -> Box<dyn Database>) -> CommandState {
        CommandState::new(create())
    }

    fn run(state: &mut CommandState, line: &str) -> (Result<(), CommandError>, String) {
        let mut out = Vec::new();
        let result = execute_line(state, line, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn scenario_a() {
        let mut state = state_with(kvds_scapegoat::create);
        assert_eq!(run(&mut state, "s 5").0, Ok(()));
        assert_eq!(run(&mut state, "w hello").0, Ok(()));
        let (result, out) = run(&mut state, "k");
        assert_eq!(result, Ok(()));
        assert_eq!(out, "5\n");
        let (_, out) = run(&mut state, "r");
        assert_eq!(out, "hello");
        let (_, out) = run(&mut state, "e");
        assert_eq!(out, "yes\n");
    }

    #[test]
    fn scenario_b() {
        let mut state = state_with(kvds_scapegoat::create);
        run(&mut state, "s 5");
        run(&mut state, "w hello");
        run(&mut state, "s 5");
        run(&mut state, "d");
        let (_, out) = run(&mut state, "e");
        assert_eq!(out, "no\n");
        // The not-found case is always printed to the process's real
        // stdout, independent of `output` — nothing lands in our sink.
        let (_, out) = run(&mut state, "r");
        assert_eq!(out, "");
    }

    #[test]
    fn write_payload_may_contain_embedded_spaces() {
        let mut state = state_with(kvds_list::create);
        run(&mut state, "s 1");
        run(&mut state, "w hello world");
        let (_, out) = run(&mut state, "r");
        assert_eq!(out, "hello world");
    }

    #[test]
    fn a_comment_short_circuits_the_rest_of_the_line() {
        let mut state = state_with(kvds_list::create);
        let (result, out) = run(&mut state, "# k e r");
        assert_eq!(result, Ok(()));
        assert_eq!(out, "");
    }

    #[test]
    fn unknown_command_is_invalid() {
        let mut state = state_with(kvds_list::create);
        assert_eq!(run(&mut state, "bogus").0, Err(CommandError::Invalid));
    }

    #[test]
    fn quit_is_reported_as_quit() {
        let mut state = state_with(kvds_list::create);
        assert_eq!(run(&mut state, "quit").0, Err(CommandError::Quit));
    }
}
