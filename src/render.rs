//! Plain-text rendering of seat grids and event lists.

use std::fmt::Write;

use crate::store::EventSnapshot;

/// One line per row, seats separated by a single space.
///
/// `seats` is row-major and must hold `rows * cols` markers.
pub fn render_grid(rows: usize, cols: usize, seats: &[u32]) -> String {
    let mut out = String::with_capacity(seats.len() * 2);
    if cols == 0 {
        return out;
    }
    for row in seats.chunks(cols).take(rows) {
        for (i, seat) in row.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{}", seat);
        }
        out.push('\n');
    }
    out
}

/// `Event: <id>` per line, or `No events` when empty.
pub fn render_event_list(ids: &[u32]) -> String {
    if ids.is_empty() {
        return "No events\n".to_string();
    }
    let mut out = String::new();
    for id in ids {
        let _ = writeln!(out, "Event: {}", id);
    }
    out
}

/// Every event header followed by its grid, in insertion order.
pub fn render_dump(events: &[EventSnapshot]) -> String {
    if events.is_empty() {
        return "No events\n".to_string();
    }
    let mut out = String::new();
    for event in events {
        let _ = writeln!(out, "Event: {}", event.id);
        out.push_str(&render_grid(event.rows, event.cols, &event.seats));
    }
    out
}
