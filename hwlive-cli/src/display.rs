//! Terminal rendering of plans and outcomes

use std::collections::HashMap;

use colored::Colorize;
use similar::{ChangeTag, TextDiff};

use hwlive_core::effect::Effect;
use hwlive_core::plan::Plan;
use hwlive_core::resource::Value;
use hwlive_core::schema::ResourceSchema;

const SENSITIVE: &str = "(sensitive)";

pub fn print_plan(plan: &Plan, schemas: &HashMap<String, ResourceSchema>) {
    if !plan.has_changes() {
        println!("{}", "No changes. Channels are up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let schema = schemas.get(&effect.resource_id().resource_type);
        print_effect(effect, schema);
        println!();
    }

    let summary = plan.summary();
    println!(
        "Plan: {} to add, {} to change, {} to replace, {} to destroy.",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.replace.to_string().magenta(),
        summary.delete.to_string().red()
    );
}

fn print_effect(effect: &Effect, schema: Option<&ResourceSchema>) {
    let attr_prefix = "      ";
    match effect {
        Effect::Read(r) => {
            println!("  {} {}", "<=".cyan().bold(), r.id.to_string().bold());
        }
        Effect::Create(r) => {
            println!("  {} {}", "+".green().bold(), r.id.to_string().bold());
            for key in sorted_keys(&r.attributes) {
                let value = &r.attributes[key];
                println!(
                    "{}{}: {}",
                    attr_prefix,
                    key,
                    display_value(key, value, schema).green()
                );
            }
        }
        Effect::Update {
            id,
            from,
            to,
            changed_attributes,
        } => {
            println!("  {} {}", "~".yellow().bold(), id.to_string().bold());
            print_changes(attr_prefix, changed_attributes, &from.attributes, &to.attributes, schema);
        }
        Effect::Replace {
            id,
            from,
            to,
            forced_by,
        } => {
            println!(
                "  {} {} {}",
                "-/+".magenta().bold(),
                id.to_string().bold(),
                format!("(forced by {})", forced_by.join(", ")).magenta()
            );
            let roots: Vec<String> = forced_by.iter().map(|path| root_attribute(path)).collect();
            print_changes(attr_prefix, &roots, &from.attributes, &to.attributes, schema);
        }
        Effect::Delete { id, from } => {
            println!("  {} {}", "-".red().bold(), id.to_string().bold());
            if let Some(identifier) = &from.identifier {
                println!("{}{}: {}", attr_prefix, "id", identifier.red());
            }
        }
    }
}

fn print_changes(
    prefix: &str,
    changed: &[String],
    from: &HashMap<String, Value>,
    to: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) {
    let mut keys: Vec<&String> = changed.iter().collect();
    keys.sort();
    keys.dedup();
    for key in keys {
        let old = from.get(key.as_str());
        let new = to.get(key.as_str());
        if is_sensitive(key, schema) {
            println!("{}{}: {} → {}", prefix, key, SENSITIVE.red(), SENSITIVE.green());
            continue;
        }
        match (old, new) {
            (Some(old), Some(new)) if is_structured(old) || is_structured(new) => {
                println!("{}{}:", prefix, key);
                print_value_diff(&format!("{}  ", prefix), old, new);
            }
            _ => {
                let old_str = old.map(format_value).unwrap_or_else(|| "(none)".to_string());
                let new_str = new.map(format_value).unwrap_or_else(|| "(none)".to_string());
                println!("{}{}: {} → {}", prefix, key, old_str.red(), new_str.green());
            }
        }
    }
}

/// Top-level attribute of a dotted path such as `input.0.input_protocol`
fn root_attribute(path: &str) -> String {
    path.split('.').next().unwrap_or(path).to_string()
}

fn is_structured(value: &Value) -> bool {
    matches!(value, Value::List(_) | Value::Map(_))
}

/// Line diff of two block values rendered as pretty JSON
fn print_value_diff(prefix: &str, old: &Value, new: &Value) {
    let old_text = pretty(old);
    let new_text = pretty(new);
    for line in diff_lines(&old_text, &new_text) {
        println!("{}{}", prefix, line);
    }
}

fn diff_lines(old: &str, new: &str) -> Vec<String> {
    let diff = TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .map(|change| {
            let text = change.to_string_lossy();
            let text = text.trim_end_matches('\n');
            match change.tag() {
                ChangeTag::Delete => format!("- {}", text).red().to_string(),
                ChangeTag::Insert => format!("+ {}", text).green().to_string(),
                ChangeTag::Equal => format!("  {}", text),
            }
        })
        .collect()
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(&value.to_json()).unwrap_or_default();
    text.push('\n');
    text
}

fn sorted_keys(attributes: &HashMap<String, Value>) -> Vec<&String> {
    let mut keys: Vec<_> = attributes.keys().collect();
    keys.sort_by(|a, b| match (a.as_str(), b.as_str()) {
        ("name", _) => std::cmp::Ordering::Less,
        (_, "name") => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    });
    keys
}

fn is_sensitive(key: &str, schema: Option<&ResourceSchema>) -> bool {
    schema
        .and_then(|s| s.get(key))
        .is_some_and(|attr| attr.sensitive)
}

fn display_value(key: &str, value: &Value, schema: Option<&ResourceSchema>) -> String {
    if is_sensitive(key, schema) {
        SENSITIVE.to_string()
    } else {
        format_value(value)
    }
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let strs: Vec<_> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
    }
}

pub fn format_effect(effect: &Effect) -> String {
    match effect {
        Effect::Read(r) => format!("Read {}", r.id),
        Effect::Create(r) => format!("Create {}", r.id),
        Effect::Update { id, .. } => format!("Update {}", id),
        Effect::Replace { id, .. } => format!("Replace {}", id),
        Effect::Delete { id, .. } => format!("Delete {}", id),
    }
}
