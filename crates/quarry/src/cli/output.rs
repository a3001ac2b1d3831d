//! Output formatting utilities for CLI commands

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use quarry_protocol::SessionState;

/// Print a table with custom column colors
pub fn print_table_colored(headers: &[&str], rows: Vec<Vec<(String, Option<Color>)>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        let cells: Vec<Cell> = row
            .into_iter()
            .map(|(text, color)| {
                let cell = Cell::new(text);
                if let Some(c) = color {
                    cell.fg(c)
                } else {
                    cell
                }
            })
            .collect();
        table.add_row(cells);
    }

    println!("{}", table);
}

/// Display color for a session state
pub fn state_color(state: SessionState) -> Color {
    match state {
        SessionState::NotStarted => Color::Grey,
        SessionState::Submitting | SessionState::Submitted => Color::Yellow,
        SessionState::Monitoring => Color::Cyan,
        SessionState::Completed | SessionState::Downloading | SessionState::Downloaded => {
            Color::Blue
        }
        SessionState::Copying => Color::Magenta,
        SessionState::Finished => Color::Green,
        SessionState::Failed => Color::Red,
    }
}

/// Format a UTC timestamp for table display
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Truncate a string for display
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut cut = max_len.saturating_sub(3);
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &s[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 40), "short");
        let long = "a".repeat(50);
        let truncated = truncate_string(&long, 20);
        assert_eq!(truncated.len(), 20);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_state_color_terminal_states() {
        assert_eq!(state_color(SessionState::Finished), Color::Green);
        assert_eq!(state_color(SessionState::Failed), Color::Red);
    }

    #[test]
    fn test_format_datetime() {
        let dt = DateTime::parse_from_rfc3339("2025-06-01T12:30:45Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_datetime(&dt), "2025-06-01 12:30:45");
    }
}
