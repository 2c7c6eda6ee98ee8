use colored::Colorize;
use converge::RunSummary;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Counts line for a finished run, e.g. "2 changed, 5 up to date"
pub fn summary_line(summary: &RunSummary) -> String {
    let mut parts = vec![format!("{} changed", summary.ran)];
    parts.push(format!("{} up to date", summary.up_to_date));
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped));
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    parts.join(", ")
}

/// Print the end-of-run report
pub fn summary(name: &str, summary: &RunSummary) {
    header(&format!("{name}: {}", summary_line(summary)));
    for change in &summary.changes {
        println!("  {} {}", "~".yellow(), change);
    }
    if summary.is_success() {
        success("converged");
    } else {
        warn(&format!("{} resource(s) failed", summary.failed));
    }
}
