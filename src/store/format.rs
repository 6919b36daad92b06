//! Archival rendering of artist records.
//!
//! The record files live in a git history where one new `stats` entry is
//! added every few days. To keep those commits to a one-line diff, the
//! document is rendered indented but every entry of the `stats` and
//! `generations` collections is rendered compact on a single line. Keys are
//! always alphabetical, so a re-render of unchanged data is byte-identical.

use serde_json::Value as JsonValue;

/// Top-level collections whose entries are kept on one line each.
const COMPACT_COLLECTIONS: &[&str] = &["generations", "stats"];

const INDENT: &str = "  ";

/// Render a record document with the hybrid formatting policy.
///
/// The input is expected to be a JSON object; anything else falls back to a
/// plain indented rendering.
pub fn render_record(root: &JsonValue) -> String {
    let Some(map) = root.as_object() else {
        let mut out = String::new();
        write_pretty(&mut out, root, 0);
        return out;
    };

    if map.is_empty() {
        return "{}".to_string();
    }

    let mut out = String::new();
    out.push_str("{\n");
    let mut first = true;
    for (key, value) in map {
        if !first {
            out.push_str(",\n");
        }
        first = false;
        out.push_str(INDENT);
        write_json_string(&mut out, key);
        out.push_str(": ");
        if COMPACT_COLLECTIONS.contains(&key.as_str()) {
            write_compact_entries(&mut out, value, 1);
        } else {
            write_pretty(&mut out, value, 1);
        }
    }
    out.push_str("\n}");
    out
}

/// Collection whose direct children are each rendered on one compact line.
fn write_compact_entries(out: &mut String, value: &JsonValue, depth: usize) {
    match value {
        JsonValue::Object(map) if !map.is_empty() => {
            out.push_str("{\n");
            let mut first = true;
            for (key, child) in map {
                if !first {
                    out.push_str(",\n");
                }
                first = false;
                push_indent(out, depth + 1);
                write_json_string(out, key);
                out.push_str(": ");
                write_compact(out, child);
            }
            out.push('\n');
            push_indent(out, depth);
            out.push('}');
        }
        JsonValue::Array(items) if !items.is_empty() => {
            out.push_str("[\n");
            let mut first = true;
            for item in items {
                if !first {
                    out.push_str(",\n");
                }
                first = false;
                push_indent(out, depth + 1);
                write_compact(out, item);
            }
            out.push('\n');
            push_indent(out, depth);
            out.push(']');
        }
        other => write_pretty(out, other, depth),
    }
}

fn write_pretty(out: &mut String, value: &JsonValue, depth: usize) {
    match value {
        JsonValue::Object(map) if !map.is_empty() => {
            out.push_str("{\n");
            let mut first = true;
            for (key, child) in map {
                if !first {
                    out.push_str(",\n");
                }
                first = false;
                push_indent(out, depth + 1);
                write_json_string(out, key);
                out.push_str(": ");
                write_pretty(out, child, depth + 1);
            }
            out.push('\n');
            push_indent(out, depth);
            out.push('}');
        }
        JsonValue::Array(items) if !items.is_empty() => {
            out.push_str("[\n");
            let mut first = true;
            for item in items {
                if !first {
                    out.push_str(",\n");
                }
                first = false;
                push_indent(out, depth + 1);
                write_pretty(out, item, depth + 1);
            }
            out.push('\n');
            push_indent(out, depth);
            out.push(']');
        }
        other => write_leaf(out, other),
    }
}

/// Single-line rendering with `", "` and `": "` separators, the same shape
/// the archive has always contained.
fn write_compact(out: &mut String, value: &JsonValue) {
    match value {
        JsonValue::Object(map) => {
            out.push('{');
            let mut first = true;
            for (key, child) in map {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                write_json_string(out, key);
                out.push_str(": ");
                write_compact(out, child);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            let mut first = true;
            for item in items {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                write_compact(out, item);
            }
            out.push(']');
        }
        other => write_leaf(out, other),
    }
}

fn write_leaf(out: &mut String, value: &JsonValue) {
    match value {
        JsonValue::String(s) => write_json_string(out, s),
        // Null, booleans and numbers render identically in any mode.
        other => out.push_str(&other.to_string()),
    }
}

fn write_json_string(out: &mut String, s: &str) {
    // serde_json owns the escaping rules.
    out.push_str(&JsonValue::String(s.to_string()).to_string());
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}
