//! Command line parser
//!
//! Simple split on whitespace, max 3 arguments. Values containing spaces
//! (enum names, text items) are read with [`ParsedCommand::rest`].

/// Parsed command with up to 3 arguments
#[derive(Debug, Clone)]
pub struct ParsedCommand<'a> {
    /// The command name (first token)
    pub command: &'a str,
    /// Up to 3 arguments
    pub args: [Option<&'a str>; 3],
    /// Byte offset of each argument in `line`
    offsets: [usize; 3],
    line: &'a str,
}

impl<'a> ParsedCommand<'a> {
    /// Create empty command
    pub const fn empty() -> Self {
        Self {
            command: "",
            args: [None, None, None],
            offsets: [0; 3],
            line: "",
        }
    }

    /// Get argument by index (0-based)
    pub fn arg(&self, idx: usize) -> Option<&'a str> {
        self.args.get(idx).copied().flatten()
    }

    /// Everything from argument `idx` to the end of the line, trimmed.
    pub fn rest(&self, idx: usize) -> Option<&'a str> {
        self.arg(idx)?;
        Some(self.line[self.offsets[idx]..].trim_end())
    }
}

/// Parse a command line into command and arguments
pub fn parse_line(line: &str) -> ParsedCommand<'_> {
    let mut tokens = line
        .split_whitespace()
        .map(|tok| (tok.as_ptr() as usize - line.as_ptr() as usize, tok));

    let command = tokens.next().map_or("", |(_, tok)| tok);

    let mut args = [None, None, None];
    let mut offsets = [0; 3];
    for (i, (offset, arg)) in tokens.take(3).enumerate() {
        args[i] = Some(arg);
        offsets[i] = offset;
    }

    ParsedCommand {
        command,
        args,
        offsets,
        line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_keeps_inner_spaces() {
        let cmd = parse_line("set Sound_State  Sound Level 1 Detected  ");
        assert_eq!(cmd.arg(0), Some("Sound_State"));
        assert_eq!(cmd.rest(1), Some("Sound Level 1 Detected"));
        assert_eq!(cmd.rest(2), Some("Level 1 Detected"));
    }

    #[test]
    fn test_rest_missing() {
        let cmd = parse_line("set name");
        assert_eq!(cmd.rest(1), None);
        assert_eq!(ParsedCommand::empty().rest(0), None);
    }
}
