// src/output/report.rs
use std::fs;
use std::path::Path;
use chrono::Local;
use serde::Serialize;

use crate::scanner::ScanResult;

#[derive(Serialize)]
struct Report<'a> {
    timestamp: String,
    summary: Summary,
    results: &'a [ScanResult],
}

#[derive(Serialize)]
struct Summary {
    targets: usize,
    web_matches: usize,
    tcp_matches: usize,
}

fn summarize(results: &[ScanResult]) -> Summary {
    Summary {
        targets: results.len(),
        web_matches: results.iter().map(|r| r.web_results.len()).sum(),
        tcp_matches: results.iter().map(|r| r.tcp_results.len()).sum(),
    }
}

// 报告一次性落盘，目录不存在时先创建
fn write_report(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

/// 生成JSON报告
pub fn generate_json(
    output_path: &Path,
    results: &[ScanResult],
) -> Result<(), Box<dyn std::error::Error>> {
    let report = Report {
        timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        summary: summarize(results),
        results,
    };

    let json = serde_json::to_string_pretty(&report)?;
    write_report(output_path, &json)?;
    Ok(())
}

/// 生成纯文本报告
pub fn generate_text(
    output_path: &Path,
    results: &[ScanResult],
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = summarize(results);
    let mut content = String::new();

    content.push_str("# FINGERSCAN-RS SCAN REPORT\n");
    content.push_str(&format!(
        "Date: {}\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    content.push_str("## SUMMARY\n");
    content.push_str(&format!("Targets: {}\n", summary.targets));
    content.push_str(&format!("Web Matches: {}\n", summary.web_matches));
    content.push_str(&format!("TCP Matches: {}\n\n", summary.tcp_matches));

    for result in results {
        content.push_str(&format!("## TARGET {}\n", result.target));

        if !result.web_results.is_empty() {
            content.push_str("### WEB\n");
            for matched in &result.web_results {
                content.push_str(&format!(
                    "- {} ({}) confidence: {:.2}\n",
                    matched.name, matched.id, matched.confidence
                ));
                for (key, value) in &matched.details {
                    content.push_str(&format!("  {}: {}\n", key, value));
                }
                if !matched.tags.is_empty() {
                    content.push_str(&format!("  tags: {}\n", matched.tags.join(", ")));
                }
            }
        }

        if !result.tcp_results.is_empty() {
            content.push_str("### TCP\n");
            for matched in &result.tcp_results {
                content.push_str(&format!(
                    "- {} ({}) confidence: {:.2}\n",
                    matched.name, matched.id, matched.confidence
                ));
                for (key, value) in &matched.details {
                    content.push_str(&format!("  {}: {}\n", key, value));
                }
            }
        }

        content.push('\n');
    }

    write_report(output_path, &content)?;
    Ok(())
}
