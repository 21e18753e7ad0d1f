use clap::ValueEnum;
use eyre::Result as EyreResult;
use serde::Serialize;

/// Live progress output for a conformance run: run sections, numbered step
/// banners with their JSON spec inline, and phase markers within a step.
#[derive(Clone, Copy, Debug)]
pub struct OutputWriter {
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    Markdown,
    #[default]
    PlainText,
}

impl OutputWriter {
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn write_str(self, line: &str) {
        match self.format {
            OutputFormat::Markdown => println!("{line}  "),
            OutputFormat::PlainText => println!("{line}"),
        }
    }

    /// Banner for a run stage outside the numbered step sequence
    /// (authentication, reporting).
    pub fn write_section(self, title: &str) {
        println!("{}", self.render_section(title));
    }

    /// Banner for one numbered scenario step, spec included so a failure in
    /// the log can be replayed from its exact configuration.
    pub fn write_step<T>(self, index: usize, name: &str, spec: &T) -> EyreResult<()>
    where
        T: ?Sized + Serialize,
    {
        println!("{}", self.render_step(index, name, spec)?);

        Ok(())
    }

    /// Marker for one numbered phase inside a step.
    pub fn write_phase(self, number: usize, description: &str) {
        self.write_str(&format!("Phase {number}: {description}"));
    }

    fn render_section(self, title: &str) -> String {
        match self.format {
            OutputFormat::Markdown => format!("## {title}  "),
            OutputFormat::PlainText => format!("====== {title} ======"),
        }
    }

    fn render_step<T>(self, index: usize, name: &str, spec: &T) -> EyreResult<String>
    where
        T: ?Sized + Serialize,
    {
        Ok(match self.format {
            OutputFormat::Markdown => format!(
                "### Step {index}: {name}  \n```json\n{}\n```",
                serde_json::to_string_pretty(spec)?,
            ),
            OutputFormat::PlainText => format!(
                "--- Step {index}: {name} --- {}",
                serde_json::to_string(spec)?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_banners_follow_the_selected_format() {
        let markdown = OutputWriter::new(OutputFormat::Markdown);
        let plain = OutputWriter::new(OutputFormat::PlainText);

        assert_eq!(markdown.render_section("Authenticating"), "## Authenticating  ");
        assert_eq!(
            plain.render_section("Authenticating"),
            "====== Authenticating ======"
        );
    }

    #[test]
    fn step_banners_carry_the_spec_json() {
        let spec = serde_json::json!({"iterations": 128});

        let markdown = OutputWriter::new(OutputFormat::Markdown)
            .render_step(1, "document lifecycle", &spec)
            .expect("render");
        assert!(markdown.starts_with("### Step 1: document lifecycle"));
        assert!(markdown.contains("```json"));
        assert!(markdown.contains("\"iterations\": 128"));

        let plain = OutputWriter::new(OutputFormat::PlainText)
            .render_step(1, "document lifecycle", &spec)
            .expect("render");
        assert_eq!(
            plain,
            "--- Step 1: document lifecycle --- {\"iterations\":128}"
        );
    }
}
