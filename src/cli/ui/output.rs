use console::style;

/// Styled terminal output for command results
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Labelled value on one line
    pub fn field(&self, label: &str, value: &str) {
        println!("  {} {}", style(format!("{}:", label)).dim(), value);
    }

    /// Indented bullet list
    pub fn bullets<S: AsRef<str>>(&self, items: &[S]) {
        for item in items {
            println!("  • {}", item.as_ref());
        }
    }

    /// Multi-line paragraph, indented
    pub fn paragraph(&self, text: &str) {
        for line in text.lines() {
            println!("  {}", line);
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
