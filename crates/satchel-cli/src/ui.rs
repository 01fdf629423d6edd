//! Build report formatting.

use std::time::Duration;

use satchel_bundler::{BuildReport, Result as BundlerResult};

/// Format bytes as a human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let size = bytes as f64;
    if size >= MB {
        format!("{:.2} MB", size / MB)
    } else if size >= KB {
        format!("{:.2} KB", size / KB)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis >= 1000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", millis)
    }
}

/// One line per bundle, names aligned, unchanged bundles marked.
pub fn render_report(report: &BuildReport) -> String {
    let width = report
        .bundles
        .iter()
        .map(|bundle| bundle.name.len())
        .max()
        .unwrap_or(0);

    let mut out = format!(
        "Built {} bundle(s) in {}\n",
        report.bundles.len(),
        format_duration(report.duration)
    );
    for bundle in &report.bundles {
        let line = format!("  {:<width$}  {:>10}", bundle.name, format_size(bundle.size));
        out.push_str(line.trim_end());
        if !bundle.packaged {
            out.push_str("  (unchanged)");
        }
        out.push('\n');
    }
    out
}

pub fn print_report(report: &BuildReport) {
    print!("{}", render_report(report));
}

/// Watch callback: print successful passes. Failures are already logged by
/// the session.
pub fn print_pass(result: &BundlerResult<BuildReport>) {
    if let Ok(report) = result {
        print_report(report);
    }
}
