//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use webcheck_e2e::probe::ServiceCheck;
use webcheck_e2e::{StepRecord, Summary};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;

    /// Whether the row should be highlighted as a failure
    fn failed(&self) -> bool {
        false
    }
}

impl TableDisplay for StepRecord {
    fn headers() -> Vec<&'static str> {
        vec!["Step", "Result", "Details", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.test.clone(),
            if self.success { "✓ pass" } else { "✗ fail" }.to_string(),
            self.details.clone(),
            format!("{} ms", self.duration_ms),
        ]
    }

    fn failed(&self) -> bool {
        !self.success
    }
}

impl TableDisplay for ServiceCheck {
    fn headers() -> Vec<&'static str> {
        vec!["Service", "URL", "Status", "Time"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.url.clone(),
            self.status.to_string(),
            format!("{} ms", self.elapsed_ms),
        ]
    }

    fn failed(&self) -> bool {
        !self.is_ok()
    }
}

/// Render `items` as a table. Failed rows are coloured red.
pub fn render_table<T: TableDisplay>(items: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for item in items {
        let color = if item.failed() { Color::Red } else { Color::Green };
        table.add_row(item.row().into_iter().map(|value| Cell::new(value).fg(color)));
    }
    table
}

/// Print a single serializable value
pub fn print_value<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No items found.");
            } else {
                println!("{}", render_table(items));
            }
        }
        OutputFormat::Json | OutputFormat::Yaml => print_value(items, format)?,
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                for (header, value) in T::headers().iter().zip(item.row()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
    Ok(())
}

/// One-line summary, coloured by outcome
pub fn summary_line(label: &str, summary: &Summary) -> String {
    let line = format!(
        "{}: {} total, {} passed, {} failed ({:.2}% in {:.3}s)",
        label,
        summary.total_tests,
        summary.successful_tests,
        summary.failed_tests,
        summary.success_rate,
        summary.duration
    );
    if summary.all_passed() {
        format!("{} {}", "✓".green(), line)
    } else {
        format!("{} {}", "✗".red(), line.bold())
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("{}  {}", "⚠".yellow(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(test: &str, success: bool) -> StepRecord {
        StepRecord {
            test: test.into(),
            success,
            details: if success { "completed" } else { "Element not found: #email" }.into(),
            timestamp: Utc::now(),
            error_kind: None,
            screenshot: None,
            duration_ms: 12,
            page_errors: Vec::new(),
        }
    }

    #[test]
    fn step_rows_show_outcome() {
        assert_eq!(record("Login page loads", true).row()[1], "✓ pass");
        assert_eq!(record("Credentials accepted", false).row()[1], "✗ fail");
        assert_eq!(record("x", true).row()[3], "12 ms");
    }

    #[test]
    fn table_contains_every_step() {
        let rendered = render_table(&[record("first", true), record("second", false)]).to_string();
        assert!(rendered.contains("first"));
        assert!(rendered.contains("second"));
        assert!(rendered.contains("Element not found"));
    }

    #[test]
    fn summary_line_reports_rate() {
        colored::control::set_override(false);
        let summary = Summary {
            total_tests: 2,
            successful_tests: 1,
            failed_tests: 1,
            success_rate: 50.0,
            duration: 1.5,
        };
        assert_eq!(
            summary_line("login", &summary),
            "✗ login: 2 total, 1 passed, 1 failed (50.00% in 1.500s)"
        );
    }
}
