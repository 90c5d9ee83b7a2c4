// src/utils/render.rs

//! Plain-text rendering for the batch binary. Stateless: every function
//! takes what it shows and returns the text.

use crate::report::SummaryReport;
use indicatif::HumanDuration;
use std::fmt::Write as _;
use std::path::Path;

const RULE_WIDTH: usize = 60;

fn rule(ch: char) -> String {
    std::iter::repeat(ch).take(RULE_WIDTH).collect()
}

pub fn banner() -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule('='));
    let _ = writeln!(out, "  Watermark Remover - Batch Processor");
    let _ = writeln!(out, "{}", rule('='));
    out
}

pub fn config_table(input_dir: &Path, output_dir: &Path, pattern: &str, found: usize) -> String {
    let rows = [
        ("Input folder:", input_dir.display().to_string()),
        ("Output folder:", output_dir.display().to_string()),
        ("Pattern:", pattern.to_string()),
        ("Videos found:", found.to_string()),
    ];
    let mut out = String::new();
    for (label, value) in rows {
        let _ = writeln!(out, "  {:<16}{}", label, value);
    }
    out
}

pub fn no_files_found(pattern: &str, input_dir: &Path) -> String {
    format!("No files matching '{}' found in {}", pattern, input_dir.display())
}

pub fn item_header(index: usize, total: usize, file_name: &str) -> String {
    format!("[{}/{}] {}", index + 1, total, file_name)
}

pub fn item_completed(output_path: &Path) -> String {
    let name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| output_path.display().to_string());
    format!("  Completed: {}", name)
}

pub fn item_failed(error: &str) -> String {
    format!("  Error: {}", error)
}

pub fn overall_message(index: usize, total: usize) -> String {
    format!("Overall Progress ({}/{})", index, total)
}

/// Statistics block, the numbered success and failure tables, and the final
/// verdict line.
pub fn summary(report: &SummaryReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", rule('='));
    let _ = writeln!(out, "  BATCH PROCESSING SUMMARY");
    let _ = writeln!(out, "{}", rule('-'));
    let _ = writeln!(out, "  {:<16}{}", "Total Time", HumanDuration(report.duration));
    let _ = writeln!(out, "  {:<16}{}", "Successful", report.success_count());
    let _ = writeln!(out, "  {:<16}{}", "Failed", report.failure_count());
    let _ = writeln!(out, "  {:<16}{}", "Total", report.total_attempted());
    let _ = writeln!(out, "  {:<16}{:.1}%", "Success Rate", report.success_rate);
    let _ = writeln!(out, "{}", rule('='));

    if !report.successful.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Successfully Processed");
        let _ = writeln!(out, "  {:<4} Filename", "#");
        for (idx, name) in report.successful.iter().enumerate() {
            let _ = writeln!(out, "  {:<4} {}", idx + 1, name);
        }
    }

    if !report.failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failed to Process");
        let name_width = report
            .failed
            .iter()
            .map(|f| f.file_name.chars().count())
            .max()
            .unwrap_or(0)
            .max("Filename".len());
        let _ = writeln!(out, "  {:<4} {:<w$}  Error", "#", "Filename", w = name_width);
        for (idx, failed) in report.failed.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {:<4} {:<w$}  {}",
                idx + 1,
                failed.file_name,
                failed.display_error(),
                w = name_width
            );
        }
    }

    let _ = writeln!(out);
    if report.all_succeeded() {
        let _ = writeln!(out, "All videos processed successfully!");
    } else {
        let _ = writeln!(out, "Some videos failed to process. Check errors above.");
    }
    out
}
