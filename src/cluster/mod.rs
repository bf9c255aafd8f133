// src/cluster/mod.rs
pub mod ports;

use std::collections::HashMap;
use log::debug;

use crate::fingerprint::{Extractor, Fingerprint, Info, Matcher};
pub use ports::PortSet;

// 被聚类的指纹：只保留匹配需要的字段
#[derive(Debug, Clone)]
pub struct ClusteredFingerprint {
    pub id: String,
    pub info: Info,
    pub matchers: Vec<Matcher>,
    pub extractors: Vec<Extractor>,
}

// 一组具有相同请求特征的Web指纹
#[derive(Debug, Clone)]
pub struct WebCluster {
    pub method: String,
    pub path: String,
    pub operators: Vec<ClusteredFingerprint>,
}

// 一组按服务聚合的TCP指纹，端口表达式已合并
#[derive(Debug, Clone)]
pub struct TcpCluster {
    pub service: String,
    pub rarity: i32,
    pub ports: PortSet,
    pub operators: Vec<ClusteredFingerprint>,
}

/// 聚类结果：Web按请求形状分桶，TCP按服务名/空名分组
#[derive(Debug, Clone, Default)]
pub struct ClusterPartition {
    pub web_default: Vec<WebCluster>,
    pub web_favicon: Vec<WebCluster>,
    pub web_other: Vec<WebCluster>,
    pub tcp_service: Vec<TcpCluster>,
    pub tcp_null: Vec<TcpCluster>,
}

/// 标准化路径：去掉{{BaseURL}}占位符，保证以/开头，去掉非根路径的尾部/
pub fn normalize_path(path: &str) -> String {
    let mut path = path.replace("{{BaseURL}}", "");
    path = path.trim().to_string();

    if !path.starts_with('/') {
        path.insert(0, '/');
    }

    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }

    path
}

fn is_get_or_head(method: &str) -> bool {
    method == "GET" || method == "HEAD"
}

// 保持插入顺序的分组辅助
struct GroupedClusters {
    index: HashMap<String, usize>,
    clusters: Vec<WebCluster>,
}

impl GroupedClusters {
    fn new() -> Self {
        GroupedClusters {
            index: HashMap::new(),
            clusters: Vec::new(),
        }
    }

    fn push(&mut self, method: &str, path: &str, fp: ClusteredFingerprint) {
        let key = format!("{}:{}", method, path);
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.clusters.push(WebCluster {
                    method: method.to_string(),
                    path: path.to_string(),
                    operators: Vec::new(),
                });
                let idx = self.clusters.len() - 1;
                self.index.insert(key, idx);
                idx
            }
        };
        self.clusters[idx].operators.push(fp);
    }
}

/// 将指纹按请求特征聚类
pub fn cluster_fingerprints(
    web_fingerprints: &[Fingerprint],
    service_fingerprints: &[Fingerprint],
) -> ClusterPartition {
    let mut result = ClusterPartition::default();

    let mut default_groups = GroupedClusters::new();
    let mut favicon_groups = GroupedClusters::new();
    let mut other_groups = GroupedClusters::new();

    for fp in web_fingerprints {
        for probe in &fp.http {
            for path in &probe.path {
                let normalized = normalize_path(path);
                let clustered = ClusteredFingerprint {
                    id: fp.id.clone(),
                    info: fp.info.clone(),
                    matchers: probe.matchers.clone(),
                    extractors: probe.extractors.clone(),
                };

                // favicon桶是附加的：图标只要可用就单独尝试匹配
                if normalized == "/favicon.ico" || probe.matchers.iter().any(|m| m.is_favicon()) {
                    favicon_groups.push(&probe.method, &normalized, clustered.clone());
                }

                if normalized == "/" && is_get_or_head(&probe.method) {
                    default_groups.push(&probe.method, &normalized, clustered);
                } else {
                    other_groups.push(&probe.method, &normalized, clustered);
                }
            }
        }
    }

    result.web_default = default_groups.clusters;
    result.web_favicon = favicon_groups.clusters;
    result.web_other = other_groups.clusters;

    let (tcp_service, tcp_null) = cluster_tcp_fingerprints(service_fingerprints);
    result.tcp_service = tcp_service;
    result.tcp_null = tcp_null;

    debug!(
        "Clustered fingerprints: web default={} favicon={} other={}, tcp service={} null={}",
        result.web_default.len(),
        result.web_favicon.len(),
        result.web_other.len(),
        result.tcp_service.len(),
        result.tcp_null.len()
    );

    result
}

fn cluster_tcp_fingerprints(fingerprints: &[Fingerprint]) -> (Vec<TcpCluster>, Vec<TcpCluster>) {
    let mut service_index: HashMap<String, usize> = HashMap::new();
    let mut service_clusters: Vec<TcpCluster> = Vec::new();
    let mut null_index: HashMap<String, usize> = HashMap::new();
    let mut null_clusters: Vec<TcpCluster> = Vec::new();

    for fp in fingerprints {
        for probe in &fp.tcp {
            let clustered = ClusteredFingerprint {
                id: fp.id.clone(),
                info: fp.info.clone(),
                matchers: probe.matchers.clone(),
                extractors: probe.extractors.clone(),
            };

            let ports = PortSet::parse(&probe.port).unwrap_or_else(|e| {
                debug!("Skipping port expression '{}' of {}: {}", probe.port, fp.id, e);
                PortSet::default()
            });

            if probe.name == "null" {
                // 空名指纹按端口表达式分组
                let idx = match null_index.get(&probe.port) {
                    Some(&idx) => idx,
                    None => {
                        null_clusters.push(TcpCluster {
                            service: "null".to_string(),
                            rarity: fp.info.metadata.rarity,
                            ports: ports.clone(),
                            operators: Vec::new(),
                        });
                        let idx = null_clusters.len() - 1;
                        null_index.insert(probe.port.clone(), idx);
                        idx
                    }
                };
                null_clusters[idx].operators.push(clustered);
            } else {
                // 同名服务合并端口范围
                let idx = match service_index.get(&probe.name) {
                    Some(&idx) => idx,
                    None => {
                        service_clusters.push(TcpCluster {
                            service: probe.name.clone(),
                            rarity: fp.info.metadata.rarity,
                            ports: PortSet::default(),
                            operators: Vec::new(),
                        });
                        let idx = service_clusters.len() - 1;
                        service_index.insert(probe.name.clone(), idx);
                        idx
                    }
                };
                service_clusters[idx].ports.merge(&ports);
                service_clusters[idx].operators.push(clustered);
            }
        }
    }

    // 常见服务优先探测
    service_clusters.sort_by_key(|c| c.rarity);
    null_clusters.sort_by_key(|c| c.rarity);

    (service_clusters, null_clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{HttpProbe, TcpProbe};

    fn web_fp(id: &str, method: &str, paths: &[&str], matchers: Vec<Matcher>) -> Fingerprint {
        Fingerprint {
            id: id.to_string(),
            info: Info {
                name: id.to_string(),
                ..Default::default()
            },
            http: vec![HttpProbe {
                method: method.to_string(),
                path: paths.iter().map(|p| p.to_string()).collect(),
                matchers,
                extractors: Vec::new(),
            }],
            tcp: Vec::new(),
        }
    }

    fn tcp_fp(id: &str, service: &str, port: &str, rarity: i32) -> Fingerprint {
        Fingerprint {
            id: id.to_string(),
            info: Info {
                name: id.to_string(),
                metadata: crate::fingerprint::Metadata {
                    rarity,
                    ..Default::default()
                },
                ..Default::default()
            },
            http: Vec::new(),
            tcp: vec![TcpProbe {
                name: service.to_string(),
                port: port.to_string(),
                inputs: Vec::new(),
                matchers: Vec::new(),
                extractors: Vec::new(),
            }],
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("{{BaseURL}}/"), "/");
        assert_eq!(normalize_path("{{BaseURL}}/admin/"), "/admin");
        assert_eq!(normalize_path("login.php"), "/login.php");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_normalize_path_idempotent() {
        for path in ["{{BaseURL}}/console/", "/a/b/", "x", "/"] {
            let once = normalize_path(path);
            assert_eq!(normalize_path(&once), once);
        }
    }

    #[test]
    fn test_root_get_goes_to_default() {
        let fps = vec![web_fp("nginx", "GET", &["{{BaseURL}}/"], Vec::new())];
        let partition = cluster_fingerprints(&fps, &[]);
        assert_eq!(partition.web_default.len(), 1);
        assert!(partition.web_other.is_empty());
        assert_eq!(partition.web_default[0].operators[0].id, "nginx");
    }

    #[test]
    fn test_non_root_path_goes_to_other() {
        let fps = vec![web_fp("tomcat", "GET", &["{{BaseURL}}/manager/html"], Vec::new())];
        let partition = cluster_fingerprints(&fps, &[]);
        assert!(partition.web_default.is_empty());
        assert_eq!(partition.web_other.len(), 1);
        assert_eq!(partition.web_other[0].path, "/manager/html");
    }

    #[test]
    fn test_favicon_matcher_lands_in_both_buckets() {
        let matcher = Matcher {
            matcher_type: "favicon".to_string(),
            favicon_hash: vec!["abc".to_string()],
            ..Default::default()
        };
        let fps = vec![web_fp("app", "GET", &["{{BaseURL}}/"], vec![matcher])];
        let partition = cluster_fingerprints(&fps, &[]);
        assert_eq!(partition.web_default.len(), 1);
        assert_eq!(partition.web_favicon.len(), 1);
    }

    #[test]
    fn test_tcp_service_ports_merged_and_sorted_by_rarity() {
        let fps = vec![
            tcp_fp("rare-db", "oracle", "1521", 7),
            tcp_fp("openssh", "ssh", "22", 1),
            tcp_fp("dropbear", "ssh", "2222", 1),
        ];
        let partition = cluster_fingerprints(&[], &fps);

        assert_eq!(partition.tcp_service.len(), 2);
        assert_eq!(partition.tcp_service[0].service, "ssh");
        assert!(partition.tcp_service[0].ports.contains(22));
        assert!(partition.tcp_service[0].ports.contains(2222));
        assert_eq!(partition.tcp_service[0].operators.len(), 2);
        assert_eq!(partition.tcp_service[1].service, "oracle");
    }

    #[test]
    fn test_null_name_goes_to_tcp_null() {
        let fps = vec![tcp_fp("mystery", "null", "9999", 3)];
        let partition = cluster_fingerprints(&[], &fps);
        assert!(partition.tcp_service.is_empty());
        assert_eq!(partition.tcp_null.len(), 1);
        assert!(partition.tcp_null[0].ports.contains(9999));
    }
}
