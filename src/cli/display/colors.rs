//! Color theme for CLI output

use crate::domain::reconcile::ChangeKind;
use comfy_table::Color as TableColor;

/// Color theme for terminal output
#[derive(Debug, Clone)]
pub struct ColorTheme {
    pub success: TableColor,
    pub warning: TableColor,
    pub error: TableColor,
    pub info: TableColor,
    pub muted: TableColor,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            success: TableColor::Green,
            warning: TableColor::Yellow,
            error: TableColor::Red,
            info: TableColor::Cyan,
            muted: TableColor::DarkGrey,
        }
    }
}

impl ColorTheme {
    pub fn change_color(&self, kind: ChangeKind) -> TableColor {
        match kind {
            ChangeKind::Added => self.success,
            ChangeKind::Removed => self.error,
            ChangeKind::Modified => self.warning,
        }
    }

    pub fn outcome_color(&self, ok: bool) -> TableColor {
        if ok {
            self.success
        } else {
            self.error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_theme() {
        let theme = ColorTheme::default();
        assert_eq!(theme.success, TableColor::Green);
        assert_eq!(theme.warning, TableColor::Yellow);
        assert_eq!(theme.error, TableColor::Red);
    }

    #[test]
    fn test_change_color() {
        let theme = ColorTheme::default();
        assert_eq!(theme.change_color(ChangeKind::Added), TableColor::Green);
        assert_eq!(theme.change_color(ChangeKind::Modified), TableColor::Yellow);
        assert_eq!(theme.change_color(ChangeKind::Removed), TableColor::Red);
        assert_eq!(theme.outcome_color(false), TableColor::Red);
    }
}
