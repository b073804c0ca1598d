//! Console output for matrix runs.

use std::io::{self, Write};

use shield_core::MatrixEvent;

/// Percentage of `position` in `total`, with an empty transfer counted as done.
pub fn percent(position: usize, total: usize) -> usize {
    if total == 0 {
        100
    } else {
        position.min(total) * 100 / total
    }
}

fn redraw(line: &str) {
    let mut stdout = io::stdout().lock();
    let _ = write!(stdout, "{line}\r");
    let _ = stdout.flush();
}

pub fn update_progress(position: usize, total: usize) {
    redraw(&format!("  Writing {:3}%", percent(position, total)));
}

pub fn dump_progress(position: usize, _total: usize) {
    redraw(&format!("  Reading from {position:8}"));
}

/// Print one matrix event.
pub fn print_event(event: MatrixEvent) {
    match event {
        MatrixEvent::CaseStarted {
            index,
            total,
            name,
            expect_accept,
        } => {
            println!("----------------------");
            println!("Running test \"{name}\" ({}/{total})", index + 1);
            if expect_accept {
                println!("  Expecting update to succeed");
            } else {
                println!("  Expecting update to detect an error");
            }
        }
        MatrixEvent::UpdateProgress { position, total } => update_progress(position, total),
        MatrixEvent::DumpProgress { position, total } => dump_progress(position, total),
        MatrixEvent::CaseFinished(outcome) => {
            println!();
            if outcome.accepted {
                println!("  No problems detected during update");
            } else {
                println!("  Error detected during update");
            }
            match outcome.readback_matches {
                Some(true) => println!("  Data matches"),
                Some(false) => println!("  **Data does not match**"),
                None => {}
            }
            println!(
                "Test {}",
                if outcome.passed() { "passed" } else { "failed" }
            );
        }
    }
}
