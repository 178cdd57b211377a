/// One meaningful line of a `plugins.txt` style load order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOrderLine {
    pub filename: String,
    pub enabled: bool,
    pub is_comment: bool,
}

impl LoadOrderLine {
    /// Parse a single line. Blank lines yield `None`.
    ///
    /// Surrounding whitespace (including the trailing carriage return) is trimmed, `#`
    /// starts a comment and a leading `*` marks the plugin enabled.
    pub fn parse(raw: &str) -> Option<Self> {
        let line = raw.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(comment) = line.strip_prefix('#') {
            return Some(Self {
                filename: comment.to_string(),
                enabled: false,
                is_comment: true,
            });
        }

        let (enabled, filename) = match line.strip_prefix('*') {
            Some(rest) => (true, rest),
            None => (false, line),
        };

        Some(Self {
            filename: filename.to_string(),
            enabled,
            is_comment: false,
        })
    }
}

/// Parse a whole load order text into its non-blank lines, in file order.
pub fn parse_load_order(text: &str) -> Vec<LoadOrderLine> {
    text.split('\n').filter_map(LoadOrderLine::parse).collect()
}
