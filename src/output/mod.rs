// src/output/mod.rs
pub mod html;
pub mod report;

use std::collections::BTreeMap;
use colored::*;

use crate::matcher::MatchResult;
use crate::scanner::ScanResult;

/// 终端输出单个目标的扫描结果，由唯一的消费者串行调用
pub fn print_result(result: &ScanResult) {
    if result.web_results.is_empty() && result.tcp_results.is_empty() {
        return;
    }

    println!();
    println!("{} {}", "[+]".bright_green(), result.target.bright_cyan().bold());

    print_web_results(&result.web_results);
    print_tcp_results(&result.tcp_results);
}

// 置信度转百分比，上限100
fn confidence_percent(confidence: f64) -> u32 {
    let percent = (confidence * 100.0).round() as i64;
    percent.clamp(0, 100) as u32
}

// 指纹名称列表渲染为 "Name (NN%) • Name (NN%)"
fn format_names(results: &[&MatchResult]) -> String {
    results
        .iter()
        .map(|r| format!("{} ({}%)", r.name, confidence_percent(r.confidence)))
        .collect::<Vec<_>>()
        .join(" \u{2022} ")
}

// 按状态码类别选色：5xx紫，4xx红，其余绿
fn colorize_status(status: &str) -> ColoredString {
    match status.chars().next() {
        Some('5') => status.bright_magenta(),
        Some('4') => status.bright_red(),
        _ => status.bright_green(),
    }
}

// 结果按某个detail键分组，分组键保持首次出现顺序
fn group_by_detail<'a>(
    results: &'a [MatchResult],
    key: &str,
) -> Vec<(String, Vec<&'a MatchResult>)> {
    let refs: Vec<&MatchResult> = results.iter().collect();
    group_refs_by_detail(&refs, key)
}

fn group_refs_by_detail<'a>(
    results: &[&'a MatchResult],
    key: &str,
) -> Vec<(String, Vec<&'a MatchResult>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, Vec<&'a MatchResult>> = BTreeMap::new();

    for &result in results {
        let group_key = result
            .details
            .get(key)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        if !groups.contains_key(&group_key) {
            order.push(group_key.clone());
        }
        groups.entry(group_key).or_default().push(result);
    }

    order
        .into_iter()
        .map(|k| {
            let members = groups.remove(&k).unwrap_or_default();
            (k, members)
        })
        .collect()
}

fn print_web_results(results: &[MatchResult]) {
    if results.is_empty() {
        return;
    }

    let groups = group_by_detail(results, "url");
    let mut first_line = true;

    for (url, members) in &groups {
        let names = format_names(members);
        let connector = if first_line { "\u{250c}\u{2500}" } else { "\u{2502} " };
        first_line = false;

        println!(
            "  {}[ {} ] [{}] {}",
            connector.bright_cyan(),
            "WEB-FINGERPRINTS".bright_cyan(),
            names.bright_green(),
            url.bright_white()
        );

        // 状态码和标题行
        let status = members
            .first()
            .and_then(|r| r.details.get("status_code"))
            .cloned()
            .unwrap_or_default();
        let title = members
            .first()
            .and_then(|r| r.details.get("title"))
            .cloned()
            .unwrap_or_default();

        let mut tail = format!("  {} ", "\u{2514}\u{2500}".bright_cyan());
        if !status.is_empty() {
            tail.push_str(&format!("{} \u{2502} ", colorize_status(&status)));
        }
        if !title.is_empty() {
            tail.push_str(&format!("{}", title.bright_white()));
        }
        println!("{}", tail);

        print_extra_details(members, &["url", "status_code", "title"], true);
    }
}

fn print_tcp_results(results: &[MatchResult]) {
    if results.is_empty() {
        return;
    }

    // 按host分组，再按端口展示
    let host_groups = group_by_detail(results, "host");
    let mut first_line = true;

    for (host, members) in &host_groups {
        let port_groups = group_refs_by_detail(members, "port");

        for (port, port_members) in &port_groups {
            let names = format_names(port_members);
            let connector = if first_line { "\u{250c}\u{2500}" } else { "\u{2502} " };
            first_line = false;

            println!(
                "  {}[ {} ] [{}] {}",
                connector.bright_red(),
                "SERVICES-FINGERPRINTS".bright_red(),
                names.bright_green(),
                host.bright_white()
            );
            println!(
                "  {} {}",
                "\u{2514}\u{2500}".bright_red(),
                port.bright_red()
            );

            print_extra_details(port_members, &["host", "port"], false);
        }
    }
}

// 除公共字段外的详情行，favicon细节在web侧不重复展示
fn print_extra_details(members: &[&MatchResult], skip: &[&str], skip_favicon: bool) {
    let mut shown = false;

    for member in members {
        if skip_favicon && member.details.contains_key("favicon_hash") {
            continue;
        }
        for (key, value) in &member.details {
            if skip.contains(&key.as_str()) || (skip_favicon && key.contains("favicon")) {
                continue;
            }
            if !shown {
                print!("     {} ", "details:".bright_yellow());
                shown = true;
            }
            print!("{}.{}={} ", member.name, key, value);
        }
    }

    if shown {
        println!();
    }
}

pub fn print_no_results() {
    println!("{}", "[!] No fingerprints matched for any target".yellow());
}
