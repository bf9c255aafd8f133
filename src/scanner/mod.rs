// src/scanner/mod.rs
pub mod config;
pub mod confidence;
pub mod http;
pub mod tcp;

use log::{debug, warn};
use serde::Serialize;
use url::Url;

use crate::cluster::{cluster_fingerprints, ClusterPartition};
use crate::detector::{FeatureDetector, FeatureMap};
use crate::fingerprint::Fingerprint;
use crate::matcher::MatchResult;
pub use config::{ConfidenceConfig, ScannerConfig, TcpPortConfig};

const WEIGHTS_CONFIG_PATH: &str = "configs/fingerprint_weights.json";
const TCP_PORTS_CONFIG_PATH: &str = "configs/tcp_ports.json";

/// 单个目标的扫描结果
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub target: String,
    pub web_results: Vec<MatchResult>,
    pub tcp_results: Vec<MatchResult>,
}

/// 扫描器：持有只读的指纹库、聚类结果、特征探测器与配置
pub struct Scanner {
    pub web_fingerprints: Vec<Fingerprint>,
    pub service_fingerprints: Vec<Fingerprint>,
    pub clusters: ClusterPartition,
    pub detector: FeatureDetector,
    pub config: ScannerConfig,
    pub confidence: ConfidenceConfig,
}

impl Scanner {
    pub fn new(
        web_fingerprints: Vec<Fingerprint>,
        service_fingerprints: Vec<Fingerprint>,
        feature_map: FeatureMap,
        mut config: ScannerConfig,
    ) -> Scanner {
        let clusters = cluster_fingerprints(&web_fingerprints, &service_fingerprints);

        let confidence = config::load_confidence_config_or_default(WEIGHTS_CONFIG_PATH);

        // TCP端口配置缺失时告警并用兜底端口
        match config::load_tcp_port_config(TCP_PORTS_CONFIG_PATH) {
            Ok(port_config) => {
                config.default_tcp_ports = port_config.default_ports;
                if port_config.scan_options.max_port_count > 0 {
                    config.max_ports_per_service = port_config.scan_options.max_port_count;
                }
            }
            Err(e) => {
                warn!(
                    "Failed to load TCP port config {}: {}, using defaults",
                    TCP_PORTS_CONFIG_PATH, e
                );
            }
        }

        Scanner {
            web_fingerprints,
            service_fingerprints,
            clusters,
            detector: FeatureDetector::new(feature_map),
            config,
            confidence,
        }
    }

    /// 扫描目标。无协议头时由mode决定：web同时尝试HTTP/HTTPS，
    /// service走TCP，all两者都做
    pub async fn scan(
        &self,
        target: &str,
        mode: &str,
    ) -> Result<ScanResult, Box<dyn std::error::Error>> {
        let mut result = ScanResult {
            target: target.to_string(),
            web_results: Vec::new(),
            tcp_results: Vec::new(),
        };

        let has_scheme = target.starts_with("http://")
            || target.starts_with("https://")
            || target.starts_with("tcp://");

        if !has_scheme {
            match mode {
                "web" => {
                    let mut all_results = Vec::new();
                    for scheme in ["http", "https"] {
                        let url_str = format!("{}://{}", scheme, target);
                        let parsed = match Url::parse(&url_str) {
                            Ok(parsed) => parsed,
                            Err(e) => {
                                debug!("Cannot parse {}: {}", url_str, e);
                                continue;
                            }
                        };
                        match self.http_scan(&parsed).await {
                            Ok(results) if !results.is_empty() => {
                                all_results.extend(results);
                                all_results = drop_status_only(all_results);
                            }
                            Ok(_) => {}
                            Err(e) => debug!("{} scan of {} failed: {}", scheme, target, e),
                        }
                    }
                    result.web_results = unique_results(all_results);
                }
                "service" => {
                    let tcp_target = format!("tcp://{}", target);
                    result.tcp_results = self.tcp_scan(&tcp_target).await?;
                }
                // 默认为all
                _ => {
                    let url_str = format!("http://{}", target);
                    if let Ok(parsed) = Url::parse(&url_str) {
                        // HTTP失败也继续TCP扫描
                        if let Ok(results) = self.http_scan(&parsed).await {
                            result.web_results = unique_results(drop_status_only(results));
                        }
                    }

                    let tcp_target = format!("tcp://{}", target);
                    if let Ok(results) = self.tcp_scan(&tcp_target).await {
                        result.tcp_results = results;
                    }
                }
            }
        } else {
            let parsed = Url::parse(target)?;
            match parsed.scheme() {
                "http" | "https" => {
                    let results = self.http_scan(&parsed).await?;
                    result.web_results = unique_results(drop_status_only(results));
                }
                "tcp" => {
                    result.tcp_results = self.tcp_scan(target).await?;
                }
                other => {
                    return Err(format!("Unsupported scheme: {}", other).into());
                }
            }
        }

        Ok(result)
    }

    async fn http_scan(&self, parsed: &Url) -> Result<Vec<MatchResult>, Box<dyn std::error::Error>> {
        // 快速探测的候选集只做观测输出，精确匹配不会据此排除规则
        let candidates = if log::log_enabled!(log::Level::Debug) {
            self.quick_scan(parsed).await
        } else {
            Vec::new()
        };

        self.precise_http_match(parsed, &candidates).await
    }

    async fn tcp_scan(&self, target: &str) -> Result<Vec<MatchResult>, Box<dyn std::error::Error>> {
        self.precise_tcp_match(target, &[]).await
    }

    // 第一阶段：快速探测收集特征并给候选指纹排序
    async fn quick_scan(&self, parsed: &Url) -> Vec<String> {
        let mut features = match self.quick_http_probe(parsed).await {
            Ok(features) => features,
            Err(e) => {
                debug!("Quick HTTP probe of {} failed: {}", parsed, e);
                Vec::new()
            }
        };

        if self.config.enable_tcp {
            if let Some(host) = parsed.host_str() {
                features.extend(self.quick_tcp_probe(host).await);
            }
        }

        let counts = self.detector.potential_fingerprints(&features);
        self.detector.top_fingerprints(
            &counts,
            self.config.max_candidates,
            self.config.feature_threshold,
        )
    }
}

/// 按指纹ID去重，保留首次出现的结果
pub fn unique_results(results: Vec<MatchResult>) -> Vec<MatchResult> {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::with_capacity(results.len());

    for result in results {
        if seen.insert(result.id.clone()) {
            unique.push(result);
        }
    }

    unique
}

/// 存在真实指纹结果时去掉http-status-code伪结果
pub fn drop_status_only(results: Vec<MatchResult>) -> Vec<MatchResult> {
    let has_real = results.iter().any(|r| r.id != "http-status-code");
    if !has_real {
        return results;
    }

    results
        .into_iter()
        .filter(|r| r.id != "http-status-code")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{Info, Matcher, Metadata, TcpProbe};
    use crate::matcher::TcpResponse;
    use std::collections::BTreeMap;

    fn result(id: &str) -> MatchResult {
        MatchResult {
            id: id.to_string(),
            name: id.to_string(),
            confidence: 0.5,
            details: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_unique_results_preserves_first_occurrence() {
        let results = vec![result("nginx"), result("apache"), result("nginx")];
        let unique = unique_results(results);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, "nginx");
        assert_eq!(unique[1].id, "apache");
    }

    #[test]
    fn test_unique_results_idempotent_on_doubled_input() {
        let xs = vec![result("a"), result("b")];
        let mut doubled = xs.clone();
        doubled.extend(xs.clone());

        let from_doubled: Vec<String> = unique_results(doubled).into_iter().map(|r| r.id).collect();
        let from_single: Vec<String> = unique_results(xs).into_iter().map(|r| r.id).collect();
        assert_eq!(from_doubled, from_single);
    }

    #[test]
    fn test_drop_status_only_with_real_match() {
        let results = vec![result("http-status-code"), result("apache")];
        let cleaned = drop_status_only(results);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].id, "apache");
    }

    #[test]
    fn test_drop_status_only_keeps_lone_pseudo_result() {
        let results = vec![result("http-status-code")];
        let cleaned = drop_status_only(results);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].id, "http-status-code");
    }

    fn ssh_scanner() -> Scanner {
        let ssh_rule = Fingerprint {
            id: "openssh".to_string(),
            info: Info {
                name: "OpenSSH".to_string(),
                tags: "ssh,service".to_string(),
                metadata: Metadata {
                    rarity: 1,
                    ..Default::default()
                },
                ..Default::default()
            },
            http: Vec::new(),
            tcp: vec![TcpProbe {
                name: "ssh".to_string(),
                port: "22".to_string(),
                inputs: Vec::new(),
                matchers: vec![Matcher {
                    matcher_type: "word".to_string(),
                    words: vec!["openssh".to_string()],
                    case_insensitive: true,
                    ..Default::default()
                }],
                extractors: vec![crate::fingerprint::Extractor {
                    name: "version".to_string(),
                    extractor_type: "regex".to_string(),
                    regex: vec!["SSH-2.0-OpenSSH[_-]([\\d.]+)".to_string()],
                }],
            }],
        };

        let service = vec![ssh_rule];
        let clusters = cluster_fingerprints(&[], &service);
        Scanner {
            web_fingerprints: Vec::new(),
            service_fingerprints: service,
            clusters,
            detector: FeatureDetector::new(FeatureMap::new()),
            config: ScannerConfig::default(),
            confidence: ConfidenceConfig::default(),
        }
    }

    #[test]
    fn test_ssh_banner_match_with_version_extraction() {
        let scanner = ssh_scanner();
        let resp = TcpResponse {
            host: "host".to_string(),
            port: 22,
            response: "SSH-2.0-OpenSSH_8.9\r\n".to_string(),
        };

        let results = scanner.match_tcp_response(&resp);
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.id, "openssh");
        assert_eq!(result.details["host"], "host");
        assert_eq!(result.details["port"], "22");
        assert_eq!(result.details["version"], "8.9");
        assert!(result.confidence >= scanner.confidence.min_confidence);
        assert!(result.confidence <= scanner.confidence.max_confidence);
        assert_eq!(result.tags, vec!["ssh", "service"]);
    }

    #[test]
    fn test_common_ports_capped_and_sorted() {
        let scanner = ssh_scanner();
        let ports = scanner.common_ports_from_clusters();
        assert!(ports.contains(&22));
        assert!(ports.len() <= 15);
        let mut sorted = ports.clone();
        sorted.sort_unstable();
        assert_eq!(ports, sorted);
    }

    #[test]
    fn test_tcp_port_gate_and_null_fallback() {
        let scanner = ssh_scanner();
        // 端口不在ssh聚类的端口集内，也没有空名聚类兜底
        let resp = TcpResponse {
            host: "host".to_string(),
            port: 8080,
            response: "SSH-2.0-OpenSSH_8.9".to_string(),
        };
        assert!(scanner.match_tcp_response(&resp).is_empty());
    }
}
