//! Prometheus text exposition format (version 0.0.4).

use std::collections::BTreeMap;
use std::io::Write;

use crate::mapping::MetricSample;
use crate::metrics;

/// Content type of the rendered output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Sanitize a metric name to be Prometheus-compatible.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
/// This function:
/// - Replaces invalid characters with underscores
/// - Ensures the name starts with a letter or underscore
/// - Collapses multiple underscores into one
pub fn sanitize_metric_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    let mut last_was_underscore = false;
    let mut chars = name.chars().peekable();

    if let Some(&first) = chars.peek()
        && first.is_ascii_digit()
    {
        result.push('_');
        last_was_underscore = true;
    }

    for c in chars {
        if c.is_ascii_alphanumeric() || c == ':' {
            result.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    result
}

/// Sanitize a label name to be Prometheus-compatible.
///
/// Prometheus label names must match `[a-zA-Z_][a-zA-Z0-9_]*`.
/// Labels starting with `__` are reserved for internal use.
pub fn sanitize_label_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for (i, c) in name.chars().enumerate() {
        let valid = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };

        if valid {
            result.push(c);
            last_was_underscore = c == '_';
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    if result.is_empty() {
        return "label".to_string();
    }

    if result.starts_with("__") {
        result.insert(0, 'z');
    }

    result
}

/// Build a full metric name: `{prefix}_{name}`, or `name` without a prefix.
pub fn build_metric_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", prefix, name)
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape help text (backslash and newline only).
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}

/// Renders samples with a fixed prefix and constant labels.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    prefix: String,
    default_labels: Vec<(String, String)>,
}

impl Renderer {
    /// Default labels are sanitized and appended after each sample's own labels.
    pub fn new(prefix: &str, default_labels: &BTreeMap<String, String>) -> Self {
        Self {
            prefix: prefix.to_string(),
            default_labels: default_labels
                .iter()
                .map(|(k, v)| (sanitize_label_name(k), v.clone()))
                .collect(),
        }
    }

    /// Render samples grouped per metric, in catalog order.
    ///
    /// Metrics without samples are left out entirely.
    pub fn render(&self, samples: &[MetricSample]) -> String {
        let mut output = Vec::with_capacity(samples.len() * 96);

        for descriptor in metrics::catalog() {
            let mut series = samples
                .iter()
                .filter(|s| std::ptr::eq(s.descriptor, descriptor))
                .peekable();
            if series.peek().is_none() {
                continue;
            }

            let name = build_metric_name(&self.prefix, descriptor.name);
            writeln!(output, "# HELP {} {}", name, escape_help(descriptor.help)).ok();
            writeln!(output, "# TYPE {} {}", name, descriptor.kind.as_str()).ok();

            for sample in series {
                let mut labels: Vec<(&str, &str)> = descriptor
                    .labels
                    .iter()
                    .copied()
                    .zip(sample.labels.iter().map(String::as_str))
                    .collect();
                for (k, v) in &self.default_labels {
                    if !labels.iter().any(|(existing, _)| *existing == k.as_str()) {
                        labels.push((k.as_str(), v.as_str()));
                    }
                }

                writeln!(
                    output,
                    "{}{} {}",
                    name,
                    format_labels(&labels),
                    format_value(sample.value)
                )
                .ok();
            }
        }

        String::from_utf8(output).unwrap_or_default()
    }
}
