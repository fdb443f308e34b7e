use std::fmt;

/// Well-known mail folders the server reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WellKnownFolder {
    #[default]
    Inbox,
    Drafts,
    SentItems,
}

impl WellKnownFolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            WellKnownFolder::Inbox => "inbox",
            WellKnownFolder::Drafts => "drafts",
            WellKnownFolder::SentItems => "sentitems",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "inbox" => Some(WellKnownFolder::Inbox),
            "drafts" => Some(WellKnownFolder::Drafts),
            "sentitems" => Some(WellKnownFolder::SentItems),
            _ => None,
        }
    }
}

impl fmt::Display for WellKnownFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_names_are_case_insensitive() {
        assert_eq!(WellKnownFolder::parse("Drafts"), Some(WellKnownFolder::Drafts));
        assert_eq!(
            WellKnownFolder::parse(" SENTITEMS "),
            Some(WellKnownFolder::SentItems)
        );
        assert_eq!(WellKnownFolder::parse("INBOX"), Some(WellKnownFolder::Inbox));
    }

    #[test]
    fn test_parse_rejects_unknown_folder() {
        assert_eq!(WellKnownFolder::parse("archive"), None);
        assert_eq!(WellKnownFolder::parse(""), None);
    }
}
