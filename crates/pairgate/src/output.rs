//! Output formatting for the remote subcommands.
//!
//! Tables use `tabled`, JSON goes through serde. Color follows `--color`.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::api::StatusResponse;
use crate::cli::{ColorMode, OutputFormat};

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Print rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

#[derive(Tabled)]
struct Field {
    #[tabled(rename = "Field")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn paint_status(status: &str, color: bool) -> String {
    if !color {
        return status.to_string();
    }
    match status {
        "connected" => status.green().to_string(),
        "connecting" | "waiting_pairing" => status.yellow().to_string(),
        _ => status.red().to_string(),
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes".into() } else { "no".into() }
}

pub fn render_status(status: &StatusResponse, format: OutputFormat, color: bool) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(status).unwrap_or_default(),
        OutputFormat::Table => {
            let rows = vec![
                Field {
                    name: "Status",
                    value: paint_status(&status.status, color),
                },
                Field {
                    name: "Pairing code",
                    value: status.code.clone().unwrap_or_else(|| "-".into()),
                },
                Field {
                    name: "Code valid",
                    value: yes_no(status.code_valid),
                },
                Field {
                    name: "Can request",
                    value: yes_no(status.can_request),
                },
                Field {
                    name: "Wait",
                    value: format!("{}s", status.wait_time),
                },
            ];
            Table::new(rows).with(Style::rounded()).to_string()
        }
    }
}

/// The pairing code, grouped like the platform displays it (`ABCD-1234`).
pub fn render_code(code: &str, expires_in: u64, color: bool) -> String {
    let grouped = if code.len() == 8 && code.is_ascii() {
        format!("{}-{}", &code[..4], &code[4..])
    } else {
        code.to_string()
    };
    let shown = if color {
        grouped.bold().cyan().to_string()
    } else {
        grouped
    };
    format!(
        "Pairing code: {shown}\nExpires in {expires_in}s. Enter it under Linked devices > Link with phone number."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StatusResponse {
        StatusResponse {
            status: "waiting_pairing".into(),
            code: Some("ABCD1234".into()),
            code_valid: true,
            can_request: false,
            wait_time: 97,
        }
    }

    #[test]
    fn table_lists_every_field() {
        let table = render_status(&sample(), OutputFormat::Table, false);
        for needle in ["waiting_pairing", "ABCD1234", "97s", "Can request"] {
            assert!(table.contains(needle), "{needle} missing:\n{table}");
        }
    }

    #[test]
    fn json_uses_api_field_names() {
        let json = render_status(&sample(), OutputFormat::Json, false);
        assert!(json.contains("\"codeValid\": true"));
        assert!(json.contains("\"waitTime\": 97"));
    }

    #[test]
    fn codes_are_grouped() {
        assert!(render_code("ABCD1234", 60, false).contains("ABCD-1234"));
        assert!(render_code("XYZ", 60, false).contains("XYZ"));
    }
}
