//! Console progress rendering.

use std::io::{self, Write};

const BAR_WIDTH: usize = 20;

/// `[=====               ]  25%`
pub fn bar(position: usize, total: usize) -> String {
    let total = total.max(1);
    let position = position.min(total);
    let filled = position * BAR_WIDTH / total;
    format!(
        "[{}{}] {:3}%",
        "=".repeat(filled),
        " ".repeat(BAR_WIDTH - filled),
        position * 100 / total
    )
}

pub fn position(position: usize) -> String {
    format!("Reading from {position:8}")
}

/// Progress sink for uploads.
pub fn update_progress(pos: usize, total: usize) {
    redraw(&bar(pos, total));
}

/// Progress sink for downloads, whose size is only known at the end.
pub fn dump_progress(pos: usize, _total: usize) {
    redraw(&position(pos));
}

fn redraw(line: &str) {
    let mut stdout = io::stdout().lock();
    let _ = write!(stdout, "{line}\r");
    let _ = stdout.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar() {
        assert_eq!(bar(0, 100), "[                    ]   0%");
        assert_eq!(bar(25, 100), "[=====               ]  25%");
        assert_eq!(bar(100, 100), "[====================] 100%");
    }

    #[test]
    fn test_bar_clamps() {
        assert_eq!(bar(0, 0), "[                    ]   0%");
        assert_eq!(bar(7, 5), bar(5, 5));
    }

    #[test]
    fn test_position() {
        assert_eq!(position(4096), "Reading from     4096");
    }
}
