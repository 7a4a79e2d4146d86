use std::fmt;

/// Well-known ACK error codes
pub mod codes {
    pub const NOT_LIST: u32 = 1;
    pub const ARG: u32 = 2;
    pub const PASSWORD: u32 = 3;
    pub const PERMISSION: u32 = 4;
    pub const UNKNOWN: u32 = 5;
    pub const NO_EXIST: u32 = 50;
    pub const PLAYLIST_MAX: u32 = 51;
    pub const SYSTEM: u32 = 52;
    pub const PLAYLIST_LOAD: u32 = 53;
    pub const UPDATE_ALREADY: u32 = 54;
    pub const PLAYER_SYNC: u32 = 55;
    pub const EXIST: u32 = 56;
}

/// An `ACK [code@index] {command} message` error line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckError {
    pub code: u32,
    /// Position of the failing command inside a command list
    pub list_index: u32,
    pub command: String,
    pub message: String,
}

impl AckError {
    /// Parse an ACK line. Lines that do not follow the usual layout keep
    /// their text as the message.
    pub fn parse(line: &str) -> Self {
        let rest = line.trim().strip_prefix("ACK").unwrap_or(line).trim_start();

        let parsed = (|| {
            let rest = rest.strip_prefix('[')?;
            let close = rest.find(']')?;
            let (code, index) = rest[..close].split_once('@')?;
            let code = code.trim().parse().ok()?;
            let list_index = index.trim().parse().ok()?;

            let rest = rest[close + 1..].trim_start();
            let rest = rest.strip_prefix('{')?;
            let close = rest.find('}')?;
            let command = rest[..close].to_string();
            let message = rest[close + 1..].trim().to_string();

            Some(AckError {
                code,
                list_index,
                command,
                message,
            })
        })();

        parsed.unwrap_or_else(|| AckError {
            code: 0,
            list_index: 0,
            command: String::new(),
            message: rest.to_string(),
        })
    }
}

impl fmt::Display for AckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ACK [{}@{}] {{{}}} {}",
            self.code, self.list_index, self.command, self.message
        )
    }
}

impl std::error::Error for AckError {}
