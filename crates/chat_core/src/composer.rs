//! Composition buffer and focus state for the reply input.

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Composer {
    text: String,
    focused: bool,
}

impl Composer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    /// Returns true when focus was actually lost.
    pub fn blur(&mut self) -> bool {
        std::mem::replace(&mut self.focused, false)
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_keeps_focus() {
        let mut composer = Composer::default();
        composer.set_text("  Bonjour ");
        composer.focus();

        composer.clear();

        assert_eq!(composer.text(), "");
        assert!(composer.is_focused());
    }

    #[test]
    fn blur_reports_whether_focus_was_held() {
        let mut composer = Composer::default();
        assert!(!composer.blur());

        composer.focus();
        assert!(composer.is_focused());
        assert!(composer.blur());
        assert!(!composer.is_focused());
    }
}
