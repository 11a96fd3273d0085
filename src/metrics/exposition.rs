//! Prometheus text exposition format (0.0.4).

use std::collections::BTreeMap;
use std::fmt::Write;

use super::{MetricFamily, MetricType};

/// Content type of the rendered text.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render families in iteration order.
///
/// Labels are written sorted by name; when a name repeats, the last value
/// wins.
pub fn render(families: impl IntoIterator<Item = MetricFamily>) -> String {
    let mut out = String::new();
    for family in families {
        render_family(&mut out, &family);
    }
    out
}

fn render_family(out: &mut String, family: &MetricFamily) {
    let (name, kind) = match family.kind {
        MetricType::Gauge => (family.name.to_string(), "gauge"),
        MetricType::Summary => (family.name.to_string(), "summary"),
        MetricType::Info => (format!("{}_info", family.name), "gauge"),
    };

    // Writing to a String cannot fail.
    let _ = writeln!(out, "# HELP {name} {}", escape_help(family.help));
    let _ = writeln!(out, "# TYPE {name} {kind}");

    for sample in &family.samples {
        out.push_str(&sample.name);

        let labels: BTreeMap<&str, &str> = sample
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        if !labels.is_empty() {
            out.push('{');
            for (i, (key, value)) in labels.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{key}=\"{}\"", escape_label_value(value));
            }
            out.push('}');
        }

        out.push(' ');
        out.push_str(&format_value(sample.value));
        out.push('\n');
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', r"\\").replace('\n', r"\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('\n', r"\n")
        .replace('"', "\\\"")
}

/// Make an arbitrary string usable as a label name.
///
/// Characters outside `[A-Za-z0-9_]` become `_`, and a leading digit gets a
/// `_` prefix. Leading underscores collapse to one, since names starting with
/// `__` are reserved.
pub fn sanitize_label_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if name.starts_with("__") {
        let rest = name.trim_start_matches('_');
        name = format!("_{rest}");
    }

    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }

    name
}

/// Format a sample value.
///
/// Integral values keep a trailing `.0`, and values whose integer part has
/// more than six digits switch to exponent notation (`1234567` renders as
/// `1.234567e+06`), matching the Python client's output. Like that client,
/// the exponent is written as `e+0` followed by its digits, so a two-digit
/// exponent keeps a leading zero (`1.2345678901e+010`).
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    let repr = shortest_repr(value);

    if value > 0.0 {
        if let Some(dot) = repr.find('.') {
            if dot > 6 {
                let digits = format!("{}{}", &repr[1..dot], &repr[dot + 1..]);
                let mantissa = format!("{}.{}", &repr[..1], digits);
                let mantissa = mantissa.trim_end_matches(['0', '.']);
                return format!("{mantissa}e+0{}", dot - 1);
            }
        }
    }

    repr
}

/// Shortest round-trip representation using positional notation for
/// `1e-4 <= |v| < 1e16` and exponent notation otherwise.
fn shortest_repr(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let sci = format!("{value:e}");
        return match sci.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exp),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => sci,
        };
    }

    let plain = format!("{value}");
    if plain.contains('.') {
        plain
    } else {
        format!("{plain}.0")
    }
}
