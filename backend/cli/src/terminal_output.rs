//! Terminal output: status notes, tables and descriptor rendering.

use runbridge_core::CapabilityDescriptor;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";

/// Color only when the terminal can show it and `NO_COLOR` is unset.
fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
        && std::env::var("TERM").map(|t| t != "dumb").unwrap_or(false)
}

fn paint(style: &str, text: &str) -> String {
    if color_enabled() {
        format!("{style}{text}{RESET}")
    } else {
        text.to_string()
    }
}

pub fn note_success(msg: &str) {
    println!("{} {msg}", paint(&format!("{GREEN}{BOLD}"), "OK"));
}

pub fn note_warn(msg: &str) {
    eprintln!("{} {msg}", paint(&format!("{YELLOW}{BOLD}"), "WARN"));
}

pub fn note_error(msg: &str) {
    eprintln!("{} {msg}", paint(&format!("{RED}{BOLD}"), "ERROR"));
}

/// Left-aligned table with a header row and a dashed separator.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&paint(BOLD, &line(headers.to_vec())));
    out.push('\n');
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&line(separator.iter().map(String::as_str).collect()));
    out.push('\n');
    for row in rows {
        let cells = (0..headers.len())
            .map(|i| row.get(i).map(String::as_str).unwrap_or(""))
            .collect();
        out.push_str(&line(cells));
        out.push('\n');
    }
    out
}

/// Multi-line human view of a plugin's `Info`.
pub fn render_descriptor(d: &CapabilityDescriptor) -> String {
    let mut out = format!(
        "{} {} ({}) by {}\n",
        paint(BOLD, &d.name),
        d.version,
        d.kind,
        d.author
    );
    out.push_str(&format!(
        "action   {} [{}] plugin={} icon={}\n",
        d.action.name, d.action.category, d.action.plugin, d.action.icon
    ));
    if !d.action.description.is_empty() {
        out.push_str(&format!("         {}\n", paint(DIM, &d.action.description)));
    }
    if !d.action.params.is_empty() {
        let rows: Vec<Vec<String>> = d
            .action
            .params
            .iter()
            .map(|p| {
                vec![
                    p.key.clone(),
                    p.kind.clone(),
                    if p.required { "yes" } else { "no" }.to_string(),
                    p.default.clone(),
                    p.description.clone(),
                ]
            })
            .collect();
        out.push_str(&render_table(
            &["PARAM", "TYPE", "REQUIRED", "DEFAULT", "DESCRIPTION"],
            &rows,
        ));
    }
    if d.handles_payloads() {
        for e in &d.endpoints.endpoints {
            out.push_str(&format!("endpoint {} {} -> {}\n", e.id, e.name, e.path));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbridge_core::{ActionDescriptor, ParamDeclaration, PayloadEndpoints, PluginKind};

    #[test]
    fn renders_table_columns_aligned() {
        std::env::set_var("NO_COLOR", "1");
        let table = render_table(
            &["ID", "NAME"],
            &[
                vec!["template".into(), "plugin".into()],
                vec!["x".into(), "other".into()],
            ],
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "ID        NAME");
        assert_eq!(lines[1], "--------  ------");
        assert_eq!(lines[2], "template  plugin");
        assert_eq!(lines[3], "x         other");
    }

    #[test]
    fn renders_descriptor_params() {
        std::env::set_var("NO_COLOR", "1");
        let d = CapabilityDescriptor {
            name: "Template".into(),
            kind: PluginKind::Action,
            version: "1.1.0".into(),
            author: "JustNZ".into(),
            action: ActionDescriptor {
                name: "Template".into(),
                description: "Template description".into(),
                plugin: "template".into(),
                icon: "solar:clipboard-list-broken".into(),
                category: "Template".into(),
                params: vec![ParamDeclaration {
                    key: "Param1".into(),
                    kind: "text".into(),
                    default: String::new(),
                    required: false,
                    description: "Param1 description".into(),
                }],
            },
            endpoints: PayloadEndpoints::default(),
        };
        let out = render_descriptor(&d);
        assert!(out.starts_with("Template 1.1.0 (action) by JustNZ"));
        assert!(out.contains("Param1"));
        assert!(!out.contains("endpoint"));
    }
}
