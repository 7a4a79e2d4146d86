use std::fmt;

/// Quote an argument, escaping backslashes and double quotes
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// A single protocol command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Wrap an already-formatted command line (user supplied)
    pub fn raw(line: impl Into<String>) -> Self {
        Self::new(line.into().trim_end_matches(['\n', '\r']).to_string())
    }

    /// Append an unquoted argument (numbers, keywords, ranges)
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Append a quoted argument
    pub fn quoted(mut self, value: &str) -> Self {
        self.args.push(quote(value));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when any part would span more than one protocol line
    pub fn has_line_break(&self) -> bool {
        let breaks = |s: &str| s.contains(['\n', '\r']);
        breaks(&self.name) || self.args.iter().any(|arg| breaks(arg))
    }

    /// Command line without the trailing newline
    pub fn line(&self) -> String {
        let mut line = self.name.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line())
    }
}

/// A batch of commands sent as one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandList {
    commands: Vec<Command>,
    /// Separate each command's output with `list_OK`
    ok_separated: bool,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list_ok() -> Self {
        Self {
            commands: Vec::new(),
            ok_separated: true,
        }
    }

    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn render(&self) -> String {
        let mut out = String::from(if self.ok_separated {
            "command_list_ok_begin\n"
        } else {
            "command_list_begin\n"
        });
        for command in &self.commands {
            out.push_str(&command.line());
            out.push('\n');
        }
        out.push_str("command_list_end");
        out
    }
}

impl Extend<Command> for CommandList {
    fn extend<T: IntoIterator<Item = Command>>(&mut self, iter: T) {
        self.commands.extend(iter);
    }
}

/// Anything that can be written to the server as one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Single(Command),
    List(CommandList),
}

impl Request {
    /// Wire text including the terminating newline
    pub fn to_wire(&self) -> String {
        let mut text = match self {
            Request::Single(cmd) => cmd.line(),
            Request::List(list) => list.render(),
        };
        text.push('\n');
        text
    }

    /// The first command that would not fit on one line
    pub fn multiline_command(&self) -> Option<&Command> {
        match self {
            Request::Single(cmd) => Some(cmd).filter(|cmd| cmd.has_line_break()),
            Request::List(list) => list.commands.iter().find(|cmd| cmd.has_line_break()),
        }
    }

    /// Short label for logs and timeout messages
    pub fn label(&self) -> String {
        match self {
            Request::Single(cmd) => cmd.line(),
            Request::List(list) => list.render(),
        }
    }
}

impl From<Command> for Request {
    fn from(cmd: Command) -> Self {
        Request::Single(cmd)
    }
}

impl From<CommandList> for Request {
    fn from(list: CommandList) -> Self {
        Request::List(list)
    }
}

/// Build a filter expression clause `(tag == "value")`
pub fn filter_eq(tag: &str, value: &str) -> String {
    format!("({} == {})", tag, quote(value))
}

/// Join clauses with AND into one filter expression
pub fn filter_and(clauses: &[String]) -> String {
    format!("({})", clauses.join(" AND "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote("back\\slash"), "\"back\\\\slash\"");
    }

    #[test]
    fn test_command_line() {
        let cmd = Command::new("find")
            .arg("album")
            .quoted("Blue Train")
            .arg("artist")
            .quoted("John Coltrane");
        assert_eq!(cmd.line(), "find album \"Blue Train\" artist \"John Coltrane\"");
        assert_eq!(Request::from(cmd).to_wire().chars().last(), Some('\n'));
    }

    #[test]
    fn test_command_list_render() {
        let mut list = CommandList::new();
        list.push(Command::new("clear"))
            .push(Command::new("add").quoted("a.mp3"))
            .push(Command::new("play"));
        assert_eq!(
            list.render(),
            "command_list_begin\nclear\nadd \"a.mp3\"\nplay\ncommand_list_end"
        );

        let mut ok_list = CommandList::with_list_ok();
        ok_list.push(Command::new("status"));
        assert!(ok_list.render().starts_with("command_list_ok_begin\n"));
    }

    #[test]
    fn test_nested_filter_expression() {
        let expr = filter_and(&[filter_eq("Artist", "The \"B\" Band"), filter_eq("album", "")]);
        assert_eq!(expr, "((Artist == \"The \\\"B\\\" Band\") AND (album == \"\"))");

        let cmd = Command::new("count").quoted(&expr);
        assert_eq!(
            cmd.line(),
            "count \"((Artist == \\\"The \\\\\\\"B\\\\\\\" Band\\\") AND (album == \\\"\\\"))\""
        );
    }

    #[test]
    fn test_raw_strips_newline() {
        assert_eq!(Command::raw("status\n").line(), "status");
    }

    #[test]
    fn test_line_breaks_are_detected() {
        assert!(Request::from(Command::new("search").arg("any").quoted("a\nb"))
            .multiline_command()
            .is_some());
        assert!(Request::from(Command::raw("status\r\nclear")).multiline_command().is_some());
        assert!(Request::from(Command::new("search").quoted("a b"))
            .multiline_command()
            .is_none());

        let mut list = CommandList::new();
        list.push(Command::new("clear")).push(Command::new("add").quoted("x\ry"));
        assert_eq!(
            Request::from(list).multiline_command().map(Command::name),
            Some("add")
        );
    }
}
