// src/main.rs
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};
use clap::Parser;
use log::{debug, error, info};
use tokio::sync::{mpsc, Semaphore};

use fingerscan_rs::cli::Args;
use fingerscan_rs::common::{banner, logger, utils};
use fingerscan_rs::detector::load_or_generate_feature_map;
use fingerscan_rs::fingerprint::load_fingerprints;
use fingerscan_rs::output::{self, html::HtmlReport, report};
use fingerscan_rs::scanner::{ScanResult, Scanner, ScannerConfig};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    logger::init(args.debug, args.silent);

    if !args.silent {
        banner::show();
    }

    // 检查必要参数
    if args.target.is_none() && args.target_file.is_none() {
        eprintln!("Error: a target (-u) or a target file (-f) is required");
        process::exit(1);
    }

    // 加载指纹库，失败对启动是致命的
    let web_fingerprints = match load_fingerprints(&args.web_db) {
        Ok(fingerprints) => fingerprints,
        Err(e) => {
            error!("Failed to load web fingerprint database: {}", e);
            process::exit(1);
        }
    };

    let service_fingerprints = match load_fingerprints(&args.service_db) {
        Ok(fingerprints) => fingerprints,
        Err(e) => {
            error!("Failed to load service fingerprint database: {}", e);
            process::exit(1);
        }
    };

    // 特征映射尽力而为：缺失或损坏时现场重建
    let feature_map =
        load_or_generate_feature_map(&args.feature_map, &web_fingerprints, &service_fingerprints);

    // 收集目标
    let mut targets = Vec::new();
    if let Some(target) = &args.target {
        targets.push(target.clone());
    }
    if let Some(file_path) = &args.target_file {
        match utils::read_lines_from_file(file_path) {
            Ok(lines) => targets.extend(lines),
            Err(e) => {
                error!("Failed to read target file {}: {}", file_path.display(), e);
                process::exit(1);
            }
        }
    }
    let targets = utils::unique_strings(targets);

    if !args.silent {
        info!("Web fingerprints: {}", web_fingerprints.len());
        info!("Service fingerprints: {}", service_fingerprints.len());
        info!("Feature map entries: {}", feature_map.len());
        info!("Targets: {}", targets.len());
    }

    let config = ScannerConfig {
        timeout: Duration::from_secs(args.timeout),
        concurrency: args.concurrency.max(1),
        enable_favicon: !args.no_favicon,
        bp_stat: args.bp_stat,
        ..Default::default()
    };

    let scanner = Arc::new(Scanner::new(
        web_fingerprints,
        service_fingerprints,
        feature_map,
        config,
    ));

    let start_time = Instant::now();

    // 目标级并发：信号量限流的工作池，结果经通道交给唯一的消费者
    let concurrency = args.concurrency.max(1);
    let (tx, mut rx) = mpsc::channel::<ScanResult>(concurrency);
    let semaphore = Arc::new(Semaphore::new(concurrency));

    for target in targets {
        let scanner = scanner.clone();
        let tx = tx.clone();
        let semaphore = semaphore.clone();
        let mode = args.mode.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let result = match scanner.scan(&target, &mode).await {
                Ok(result) => result,
                Err(e) => {
                    debug!("Scan of {} failed: {}", target, e);
                    return;
                }
            };
            let _ = tx.send(result).await;
        });
    }
    drop(tx);

    // 唯一消费者：终端输出和HTML增量写入都在这里串行进行
    let is_html = args
        .output
        .as_ref()
        .map(|p| {
            p.to_string_lossy()
                .to_lowercase()
                .ends_with(".html")
        })
        .unwrap_or(false);

    let mut html_report = if is_html {
        match HtmlReport::create(args.output.as_ref().unwrap()) {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Failed to create HTML report: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut all_results: Vec<ScanResult> = Vec::new();
    while let Some(result) = rx.recv().await {
        if result.web_results.is_empty() && result.tcp_results.is_empty() {
            continue;
        }

        output::print_result(&result);

        if let Some(report) = html_report.as_mut() {
            if let Err(e) = report.append(&result) {
                error!("Failed to write HTML report: {}", e);
            }
        }

        all_results.push(result);
    }

    if let Some(report) = html_report {
        match report.finalize() {
            Ok(count) if count > 0 && !args.silent => {
                info!("HTML report written to {}", args.output.as_ref().unwrap().display());
            }
            Ok(_) => {}
            Err(e) => error!("Failed to finalize HTML report: {}", e),
        }
    } else if let Some(output_path) = &args.output {
        let written = if args.json {
            report::generate_json(output_path, &all_results)
        } else {
            report::generate_text(output_path, &all_results)
        };
        match written {
            Ok(()) => {
                if !args.silent {
                    info!("Report written to {}", output_path.display());
                }
            }
            Err(e) => error!("Failed to write report: {}", e),
        }
    }

    if all_results.is_empty() && !args.silent {
        output::print_no_results();
    }

    if !args.silent {
        info!(
            "Scan finished in {:.2}s, {} target(s) with results",
            start_time.elapsed().as_secs_f64(),
            all_results.len()
        );
    }
}
