//! Status icons for CLI output

use crate::domain::reconcile::ChangeKind;

/// Status icons for different states
pub struct StatusIcon;

impl StatusIcon {
    pub const SUCCESS: &'static str = "✓";

    pub const WARNING: &'static str = "⚠";

    pub const ERROR: &'static str = "✗";

    /// Live session running
    pub const LIVE: &'static str = "↻";

    pub fn change_text(kind: ChangeKind) -> &'static str {
        match kind {
            ChangeKind::Added => "Added",
            ChangeKind::Removed => "Removed",
            ChangeKind::Modified => "Modified",
        }
    }

    pub fn outcome_icon(ok: bool) -> &'static str {
        if ok {
            Self::SUCCESS
        } else {
            Self::ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_text() {
        assert_eq!(StatusIcon::change_text(ChangeKind::Added), "Added");
        assert_eq!(StatusIcon::change_text(ChangeKind::Removed), "Removed");
        assert_eq!(StatusIcon::change_text(ChangeKind::Modified), "Modified");
    }

    #[test]
    fn test_outcome_icon() {
        assert_eq!(StatusIcon::outcome_icon(true), StatusIcon::SUCCESS);
        assert_eq!(StatusIcon::outcome_icon(false), StatusIcon::ERROR);
    }
}
