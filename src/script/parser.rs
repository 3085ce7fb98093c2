//! Line-oriented job script parser.

use std::io::BufRead;

use crate::error::Result;
use crate::store::Seat;

/// Usage text printed for `HELP`.
pub const HELP_TEXT: &str = "Available commands:\n  \
CREATE <event_id> <num_rows> <num_columns>\n  \
RESERVE <event_id> [(<x1>,<y1>) (<x2>,<y2>) ...]\n  \
SHOW <event_id>\n  \
LIST\n  \
WAIT <delay_ms>\n  \
HELP\n";

/// One parsed script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { event_id: u32, rows: usize, cols: usize },
    Reserve { event_id: u32, seats: Vec<Seat> },
    Show { event_id: u32 },
    List,
    Wait { delay_ms: u32, thread_id: Option<u32> },
    Quit,
    Help,
    /// Unknown keyword or malformed arguments
    Invalid,
    /// Blank line or `#` comment
    Empty,
    /// End of script
    End,
}

/// Parse a single line. `max_seats` bounds the coordinates in a RESERVE.
pub fn parse_line(line: &str, max_seats: usize) -> Command {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Command::Empty;
    }

    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    let parsed = match keyword {
        "CREATE" => parse_create(rest),
        "RESERVE" => parse_reserve(rest, max_seats),
        "SHOW" => parse_show(rest),
        "LIST" => rest.is_empty().then_some(Command::List),
        "WAIT" => parse_wait(rest),
        "QUIT" => rest.is_empty().then_some(Command::Quit),
        "HELP" => rest.is_empty().then_some(Command::Help),
        _ => None,
    };
    parsed.unwrap_or(Command::Invalid)
}

fn parse_create(args: &str) -> Option<Command> {
    let mut tokens = args.split_whitespace();
    let event_id = tokens.next()?.parse().ok()?;
    let rows = tokens.next()?.parse().ok()?;
    let cols = tokens.next()?.parse().ok()?;
    if tokens.next().is_some() {
        return None;
    }
    Some(Command::Create { event_id, rows, cols })
}

fn parse_show(args: &str) -> Option<Command> {
    let mut tokens = args.split_whitespace();
    let event_id = tokens.next()?.parse().ok()?;
    if tokens.next().is_some() {
        return None;
    }
    Some(Command::Show { event_id })
}

fn parse_wait(args: &str) -> Option<Command> {
    let mut tokens = args.split_whitespace();
    let delay_ms = tokens.next()?.parse().ok()?;
    let thread_id = match tokens.next() {
        Some(token) => Some(token.parse().ok()?),
        None => None,
    };
    if tokens.next().is_some() {
        return None;
    }
    Some(Command::Wait { delay_ms, thread_id })
}

fn parse_reserve(args: &str, max_seats: usize) -> Option<Command> {
    let (id, coords) = args.split_once(char::is_whitespace)?;
    let event_id = id.parse().ok()?;
    let inner = coords.trim().strip_prefix('[')?.strip_suffix(']')?;

    let mut seats = Vec::new();
    for token in inner.split_whitespace() {
        if seats.len() == max_seats {
            return None;
        }
        let (row, col) = token.strip_prefix('(')?.strip_suffix(')')?.split_once(',')?;
        seats.push(Seat::new(row.trim().parse().ok()?, col.trim().parse().ok()?));
    }

    if seats.is_empty() {
        return None;
    }
    Some(Command::Reserve { event_id, seats })
}

/// Reads commands from a job script one line at a time.
pub struct ScriptParser<R> {
    reader: R,
    max_seats: usize,
    line: String,
    line_no: usize,
}

impl<R: BufRead> ScriptParser<R> {
    pub fn new(reader: R, max_seats: usize) -> Self {
        Self {
            reader,
            max_seats,
            line: String::new(),
            line_no: 0,
        }
    }

    /// Number of lines consumed so far.
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    /// Next command; `End` once the script is exhausted.
    pub fn next_command(&mut self) -> Result<Command> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(Command::End);
        }
        self.line_no += 1;
        Ok(parse_line(&self.line, self.max_seats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MAX: usize = 256;

    #[test]
    fn test_parse_create() {
        assert_eq!(
            parse_line("CREATE 1 10 20", MAX),
            Command::Create {
                event_id: 1,
                rows: 10,
                cols: 20
            }
        );
        assert_eq!(parse_line("CREATE 1 10", MAX), Command::Invalid);
        assert_eq!(parse_line("CREATE 1 10 20 30", MAX), Command::Invalid);
        assert_eq!(parse_line("CREATE -1 10 20", MAX), Command::Invalid);
    }

    #[test]
    fn test_parse_reserve() {
        assert_eq!(
            parse_line("RESERVE 1 [(1,1) (1,2) (2,3)]", MAX),
            Command::Reserve {
                event_id: 1,
                seats: vec![Seat::new(1, 1), Seat::new(1, 2), Seat::new(2, 3)],
            }
        );
        assert_eq!(parse_line("RESERVE 1 []", MAX), Command::Invalid);
        assert_eq!(parse_line("RESERVE 1 (1,1)", MAX), Command::Invalid);
        assert_eq!(parse_line("RESERVE 1 [(1;1)]", MAX), Command::Invalid);
        assert_eq!(parse_line("RESERVE 1", MAX), Command::Invalid);
    }

    #[test]
    fn test_parse_reserve_respects_max() {
        assert!(matches!(parse_line("RESERVE 1 [(1,1) (1,2)]", 2), Command::Reserve { .. }));
        assert_eq!(parse_line("RESERVE 1 [(1,1) (1,2) (1,3)]", 2), Command::Invalid);
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_line("SHOW 4", MAX), Command::Show { event_id: 4 });
        assert_eq!(parse_line("LIST", MAX), Command::List);
        assert_eq!(parse_line("LIST extra", MAX), Command::Invalid);
        assert_eq!(parse_line("HELP", MAX), Command::Help);
        assert_eq!(parse_line("QUIT", MAX), Command::Quit);
        assert_eq!(parse_line("DANCE", MAX), Command::Invalid);
        assert_eq!(parse_line("show 4", MAX), Command::Invalid);
    }

    #[test]
    fn test_parse_wait() {
        assert_eq!(
            parse_line("WAIT 500", MAX),
            Command::Wait {
                delay_ms: 500,
                thread_id: None
            }
        );
        assert_eq!(
            parse_line("WAIT 500 2", MAX),
            Command::Wait {
                delay_ms: 500,
                thread_id: Some(2)
            }
        );
        assert_eq!(parse_line("WAIT", MAX), Command::Invalid);
        assert_eq!(parse_line("WAIT 1 2 3", MAX), Command::Invalid);
    }

    #[test]
    fn test_empty_and_comment_lines() {
        assert_eq!(parse_line("", MAX), Command::Empty);
        assert_eq!(parse_line("   \n", MAX), Command::Empty);
        assert_eq!(parse_line("# CREATE 1 1 1", MAX), Command::Empty);
    }

    #[test]
    fn test_script_parser_reads_until_end() {
        let script = "CREATE 1 2 2\n\nSHOW 1\nLIST";
        let mut parser = ScriptParser::new(Cursor::new(script), MAX);

        assert!(matches!(parser.next_command().unwrap(), Command::Create { .. }));
        assert_eq!(parser.next_command().unwrap(), Command::Empty);
        assert_eq!(parser.next_command().unwrap(), Command::Show { event_id: 1 });
        assert_eq!(parser.next_command().unwrap(), Command::List);
        assert_eq!(parser.next_command().unwrap(), Command::End);
        assert_eq!(parser.next_command().unwrap(), Command::End);
        assert_eq!(parser.line_no(), 4);
    }

    #[test]
    fn test_help_text() {
        assert!(HELP_TEXT.starts_with("Available commands:\n  CREATE <event_id>"));
        assert!(HELP_TEXT.ends_with("  WAIT <delay_ms>\n  HELP\n"));
    }
}
