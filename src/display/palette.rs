//! ANSI colour codes, switched on or off as a whole.

/// Colour escape codes for one output stream.
///
/// A plain palette has every code empty, so format strings stay identical
/// whether or not the output is a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Palette {
    pub red: &'static str,
    pub green: &'static str,
    pub yellow: &'static str,
    pub blue: &'static str,
    pub magenta: &'static str,
    pub cyan: &'static str,
    pub bold: &'static str,
    pub dim: &'static str,
    pub reset: &'static str,
}

impl Palette {
    /// Full ANSI colours.
    pub const ANSI: Self = Self {
        red: "\x1b[91m",
        green: "\x1b[92m",
        yellow: "\x1b[93m",
        blue: "\x1b[94m",
        magenta: "\x1b[95m",
        cyan: "\x1b[96m",
        bold: "\x1b[1m",
        dim: "\x1b[2m",
        reset: "\x1b[0m",
    };

    /// No escape codes at all.
    pub const PLAIN: Self = Self {
        red: "",
        green: "",
        yellow: "",
        blue: "",
        magenta: "",
        cyan: "",
        bold: "",
        dim: "",
        reset: "",
    };

    /// [`Palette::ANSI`] when `colored`, otherwise [`Palette::PLAIN`].
    #[must_use]
    pub fn new(colored: bool) -> Self {
        if colored { Self::ANSI } else { Self::PLAIN }
    }

    /// Whether this palette emits escape codes.
    #[must_use]
    pub fn is_colored(&self) -> bool {
        !self.reset.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_palette_is_empty() {
        let p = Palette::new(false);
        assert!(!p.is_colored());
        assert_eq!(format!("{}x{}", p.green, p.reset), "x");
    }

    #[test]
    fn test_ansi_palette_has_codes() {
        let p = Palette::new(true);
        assert!(p.is_colored());
        assert!(p.cyan.starts_with("\x1b["));
    }
}
