//! Output formatting for CLI

use artifactor_common::Value;
use clap::ValueEnum;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// `key: value` lines
    #[default]
    Plain,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Render a value returned by the master
pub fn render_value(value: &Value, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(value).unwrap_or_default(),
        OutputFormat::Plain => match value {
            Value::Map(map) => map
                .iter()
                .map(|(key, value)| format!("{}: {}", key, value))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.render(),
        },
    }
}

/// Print a value returned by the master
pub fn print_value(value: &Value, format: OutputFormat) {
    println!("{}", render_value(value, format));
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}
