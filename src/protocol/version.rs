use std::fmt;

/// Server protocol version from the `OK MPD x.y.z` greeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

pub const GREETING_PREFIX: &str = "OK MPD ";

impl ProtocolVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse either a bare version string or a full greeting line
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let text = text.strip_prefix(GREETING_PREFIX).unwrap_or(text);
        let mut parts = text.split('.').map(|p| p.trim().parse::<u32>());
        let major = parts.next()?.ok()?;
        let minor = parts.next()?.ok()?;
        let patch = match parts.next() {
            Some(p) => p.ok()?,
            None => 0,
        };
        Some(Self { major, minor, patch })
    }

    /// `search ... window start:end`
    pub fn supports_search_window(&self) -> bool {
        self.minor > 19
    }

    /// Random playlist built from single-song window searches
    pub fn supports_windowed_random(&self) -> bool {
        self.minor >= 20
    }

    /// Filter expressions in `find`/`count`
    pub fn supports_filter_expressions(&self) -> bool {
        self.minor >= 21
    }

    pub fn supports_album_art(&self) -> bool {
        self.minor >= 21
    }

    /// `readpicture` and `binarylimit`
    pub fn supports_read_picture(&self) -> bool {
        self.minor > 21
    }

    /// Servers before 0.21 print the grouped tag after the listed tag,
    /// on every patch release
    pub fn legacy_grouping(&self) -> bool {
        self.minor < 21
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_greeting() {
        let v = ProtocolVersion::parse("OK MPD 0.23.5\n").unwrap();
        assert_eq!(v, ProtocolVersion::new(0, 23, 5));
        assert_eq!(v.to_string(), "0.23.5");
    }

    #[test]
    fn test_parse_without_patch() {
        let v = ProtocolVersion::parse("0.19").unwrap();
        assert_eq!(v, ProtocolVersion::new(0, 19, 0));
        assert!(ProtocolVersion::parse("OK MPD banana").is_none());
    }

    #[test]
    fn test_feature_gates() {
        let old = ProtocolVersion::new(0, 19, 2);
        assert!(!old.supports_search_window());
        assert!(!old.supports_windowed_random());
        assert!(!old.supports_album_art());
        assert!(old.legacy_grouping());
        assert!(ProtocolVersion::new(0, 20, 3).legacy_grouping());

        let v21 = ProtocolVersion::new(0, 21, 0);
        assert!(v21.supports_search_window());
        assert!(v21.supports_album_art());
        assert!(v21.supports_filter_expressions());
        assert!(!v21.supports_read_picture());
        assert!(!v21.legacy_grouping());

        let v22 = ProtocolVersion::new(0, 22, 0);
        assert!(v22.supports_read_picture());
    }
}
