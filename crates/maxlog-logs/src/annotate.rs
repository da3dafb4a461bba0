use std::borrow::Cow;
use std::fmt;

/// ANSI escape sequences used by the annotator
pub mod ansi {
    pub const RESET: &str = "\x1b[0m";

    // Foreground colors
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const MAGENTA: &str = "\x1b[35m";
    pub const CYAN: &str = "\x1b[36m";
    pub const DARK_GRAY: &str = "\x1b[90m";
    pub const LIGHT_BLUE: &str = "\x1b[94m";
    pub const WHITE: &str = "\x1b[97m";

    // Background colors
    pub const BG_RED: &str = "\x1b[41m";
    pub const BG_GREEN: &str = "\x1b[42m";
    pub const BG_YELLOW: &str = "\x1b[43m";
    pub const BG_BLUE: &str = "\x1b[44m";
    pub const BG_MAGENTA: &str = "\x1b[45m";
    pub const BG_CYAN: &str = "\x1b[46m";
    pub const BG_LIGHT_BLUE: &str = "\x1b[104m";
}

/// Markers that push a whole line into the background
const NOISE_SENTINELS: [&str; 2] = ["CID-CRON", " BMXAA6372I"];

/// Where downplay/highlight coloring starts
const BRACKET_MARKER: &str = " [";

/// Kind of label a rule produces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LabelKind {
    Info,
    Warn,
    Error,
    Server,
    Ui,
    Maximo,
    Debug,
    Script,
    Ready,
    Tag,
}

impl LabelKind {
    /// Foreground and background escape pair
    pub fn colors(&self) -> (&'static str, &'static str) {
        match self {
            Self::Info => (ansi::BLUE, ansi::BG_BLUE),
            Self::Warn => (ansi::YELLOW, ansi::BG_YELLOW),
            Self::Error => (ansi::RED, ansi::BG_RED),
            Self::Server | Self::Ui => (ansi::MAGENTA, ansi::BG_MAGENTA),
            Self::Maximo | Self::Debug => (ansi::CYAN, ansi::BG_CYAN),
            Self::Script => (ansi::LIGHT_BLUE, ansi::BG_LIGHT_BLUE),
            Self::Ready | Self::Tag => (ansi::GREEN, ansi::BG_GREEN),
        }
    }
}

/// Diagnostic glyphs printed in front of user-facing messages
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symbol {
    Error,
    Warn,
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "{}\u{ebfb}{}", ansi::RED, ansi::RESET),
            Self::Warn => write!(f, "{}\u{f071}{}", ansi::YELLOW, ansi::RESET),
        }
    }
}

/// Glyphs used around a label
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CapStyle {
    /// Rounded Nerd Font caps
    #[default]
    NerdFont,
    /// Plain spaces, for terminals without the font
    Plain,
}

impl CapStyle {
    fn caps(&self) -> (&'static str, &'static str) {
        match self {
            Self::NerdFont => ("\u{e0b6}", "\u{e0b4}"),
            Self::Plain => (" ", " "),
        }
    }
}

/// Text a rule looks for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    Literal(&'static str),
    /// `[maximo.script.<tag>]`, built from the caller's tag
    ScriptTag,
}

impl Pattern {
    fn resolve<'a>(&self, tag: &str) -> Cow<'a, str> {
        match self {
            Self::Literal(text) => Cow::Borrowed(*text),
            Self::ScriptTag => Cow::Owned(format!("[maximo.script.{}]", tag)),
        }
    }
}

/// One entry of the rule table
#[derive(Clone, Copy, Debug)]
pub struct AnnotationRule {
    pub pattern: Pattern,
    pub label: &'static str,
    pub kind: LabelKind,
}

const fn rule(pattern: &'static str, label: &'static str, kind: LabelKind) -> AnnotationRule {
    AnnotationRule {
        pattern: Pattern::Literal(pattern),
        label,
        kind,
    }
}

const READY_MESSAGE: &str = "Maximo is ready for client connections.";

/// Rules applied to every line, in order
pub static RULES: &[AnnotationRule] = &[
    rule("[INFO]", "INFO", LabelKind::Info),
    rule("[INFO ]", "INFO", LabelKind::Info),
    rule("[AUDIT   ]", "AUDIT", LabelKind::Info),
    rule("[WARN]", "WARN", LabelKind::Warn),
    rule("[WARN ]", "WARN", LabelKind::Warn),
    rule("[WARNING ]", "WARN", LabelKind::Warn),
    rule("[ERROR]", "ERROR", LabelKind::Error),
    rule("[ERROR   ]", "ERROR", LabelKind::Error),
    rule("[err]", "ERROR", LabelKind::Error),
    rule("[MXServer]", "MX", LabelKind::Server),
    rule("[MAXIMO_UI]", "UI", LabelKind::Ui),
    rule("[maximo]", "MAX", LabelKind::Maximo),
    rule("[DEBUG]", "DEBUG", LabelKind::Debug),
    AnnotationRule {
        pattern: Pattern::ScriptTag,
        label: "Script",
        kind: LabelKind::Script,
    },
    rule(READY_MESSAGE, READY_MESSAGE, LabelKind::Ready),
];

/// Applies the rule table and the downplay/highlight passes to log lines
#[derive(Clone, Copy, Debug)]
pub struct Annotator {
    rules: &'static [AnnotationRule],
    caps: CapStyle,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(CapStyle::default())
    }
}

impl Annotator {
    pub fn new(caps: CapStyle) -> Self {
        Self { rules: RULES, caps }
    }

    /// Annotate one line. An empty tag disables tag-specific highlighting.
    pub fn annotate(&self, line: &str, tag: &str) -> String {
        let mut text = line.to_string();

        for rule in self.rules {
            let pattern = rule.pattern.resolve(tag);
            text = self.label(text, &pattern, rule.label, rule.kind);
        }

        if NOISE_SENTINELS.iter().any(|s| text.contains(s)) {
            text = tint(text, ansi::DARK_GRAY);
        }

        // Tab-prefixed lines are continuations (stack traces)
        if !tag.is_empty() && text.contains(tag) && !text.starts_with('\t') {
            text = tint(text, ansi::WHITE);
            text = self.label(text, tag, tag, LabelKind::Tag);
        }

        text
    }

    /// Replace the first occurrence of `pattern` with a decorated label
    fn label(&self, text: String, pattern: &str, label: &str, kind: LabelKind) -> String {
        if pattern.is_empty() || !text.contains(pattern) {
            return text;
        }
        let (fg, bg) = kind.colors();
        let (left, right) = self.caps.caps();
        let decorated = format!(
            "{fg}{left}{reset}{bg}{label}{reset}{fg}{right}{reset}",
            reset = ansi::RESET
        );
        text.replacen(pattern, &decorated, 1)
    }
}

/// Color everything from the first `" ["` on; unchanged when there is none
fn tint(text: String, color: &str) -> String {
    if !text.contains(BRACKET_MARKER) {
        return text;
    }
    let mut tinted = text.replacen(BRACKET_MARKER, &format!("{}{}", color, BRACKET_MARKER), 1);
    tinted.push_str(ansi::RESET);
    tinted
}

/// Annotate with the default rule table and Nerd Font caps
pub fn annotate(line: &str, tag: &str) -> String {
    Annotator::default().annotate(line, tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nerd_label(kind: LabelKind, label: &str) -> String {
        let (fg, bg) = kind.colors();
        format!(
            "{fg}\u{e0b6}{r}{bg}{label}{r}{fg}\u{e0b4}{r}",
            r = ansi::RESET
        )
    }

    #[test]
    fn test_error_label() {
        let out = annotate("[ERROR] boom", "");
        assert_eq!(out, format!("{} boom", nerd_label(LabelKind::Error, "ERROR")));
        assert!(!out.contains(ansi::WHITE));
    }

    #[test]
    fn test_plain_line_is_idempotent() {
        let line = "nothing to see here";
        let once = annotate(line, "");
        assert_eq!(once, line);
        assert_eq!(annotate(&once, ""), once);
        assert_eq!(annotate(line, "tag"), line);
    }

    #[test]
    fn test_only_first_occurrence_is_labelled() {
        let out = annotate("[INFO] a [INFO] b", "");
        assert_eq!(
            out,
            format!("{} a [INFO] b", nerd_label(LabelKind::Info, "INFO"))
        );
    }

    #[test]
    fn test_distinct_rules_label_one_line() {
        let out = annotate("[MXServer] [WARN] disk low", "");
        assert_eq!(
            out,
            format!(
                "{} {} disk low",
                nerd_label(LabelKind::Server, "MX"),
                nerd_label(LabelKind::Warn, "WARN")
            )
        );
    }

    #[test]
    fn test_sentinel_without_bracket_is_unchanged() {
        assert_eq!(annotate("x CID-CRON y", ""), "x CID-CRON y");
    }

    #[test]
    fn test_sentinel_downplays_line() {
        let out = annotate("12:00 CID-CRON [task] ran", "");
        assert_eq!(
            out,
            format!("12:00 CID-CRON{} [task] ran{}", ansi::DARK_GRAY, ansi::RESET)
        );

        let out = annotate("12:00 BMXAA6372I [x]", "");
        assert!(out.starts_with("12:00 BMXAA6372I"));
        assert!(out.contains(ansi::DARK_GRAY));
    }

    #[test]
    fn test_tab_prefixed_line_is_not_highlighted() {
        let out = annotate("\t[INFO] nested", "INFO");
        assert_eq!(
            out,
            format!("\t{} nested", nerd_label(LabelKind::Info, "INFO"))
        );
        assert!(!out.contains(ansi::GREEN));
    }

    #[test]
    fn test_tag_highlight() {
        let out = annotate("12:00 [app] order-42 shipped", "order-42");
        assert_eq!(
            out,
            format!(
                "12:00{} [app] {} shipped{}",
                ansi::WHITE,
                nerd_label(LabelKind::Tag, "order-42"),
                ansi::RESET
            )
        );
    }

    #[test]
    fn test_tag_without_bracket_only_wraps_tag() {
        let out = annotate("order-42 shipped", "order-42");
        assert_eq!(
            out,
            format!("{} shipped", nerd_label(LabelKind::Tag, "order-42"))
        );
    }

    #[test]
    fn test_script_rule_uses_tag() {
        let out = annotate("[maximo.script.INVOICE] run", "INVOICE");
        assert!(out.starts_with(&nerd_label(LabelKind::Script, "Script")));

        let untagged = annotate("[maximo.script.INVOICE] run", "");
        assert_eq!(untagged, "[maximo.script.INVOICE] run");
    }

    #[test]
    fn test_ready_message() {
        let out = annotate("Maximo is ready for client connections.", "");
        assert_eq!(out, nerd_label(LabelKind::Ready, READY_MESSAGE));
    }

    #[test]
    fn test_plain_caps() {
        let out = Annotator::new(CapStyle::Plain).annotate("[DEBUG] x", "");
        let (fg, bg) = LabelKind::Debug.colors();
        assert_eq!(
            out,
            format!("{fg} {r}{bg}DEBUG{r}{fg} {r} x", r = ansi::RESET)
        );
    }

    #[test]
    fn test_symbol_display() {
        assert_eq!(
            Symbol::Error.to_string(),
            format!("{}\u{ebfb}{}", ansi::RED, ansi::RESET)
        );
    }
}
