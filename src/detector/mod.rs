// src/detector/mod.rs
pub mod favicon;
pub mod feature_map;

use std::collections::HashMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::matcher::{HttpResponse, TcpResponse};
pub use favicon::fetch_favicon;
pub use feature_map::{build_feature_map, load_or_generate_feature_map, FeatureMap};

lazy_static! {
    static ref TITLE_RE: Regex = Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").unwrap();
}

// TCP banner中能指示服务类型的关键词
const BANNER_KEYWORDS: [&str; 8] = [
    "ssh", "ftp", "http", "smtp", "openssh", "server", "mysql", "postgresql",
];

/// 特征探测器：从响应提取特征，再经反向映射筛出候选指纹。
/// 候选集只用于观测，精确匹配阶段从不据此排除规则。
pub struct FeatureDetector {
    pub feature_map: FeatureMap,
}

impl FeatureDetector {
    pub fn new(feature_map: FeatureMap) -> Self {
        FeatureDetector { feature_map }
    }

    /// 从HTTP响应中提取特征
    pub fn extract_http_features(&self, resp: &HttpResponse) -> Vec<String> {
        let mut features = Vec::new();

        features.push(format!("path:{}", resp.path));
        features.push(format!("status:{}", resp.status_code));

        // 关键header
        for (name, value) in &resp.headers {
            let lower_name = name.to_lowercase();
            if lower_name == "server" || lower_name == "x-powered-by" || lower_name == "set-cookie" {
                features.push(format!(
                    "header_word:header:{}: {}",
                    lower_name,
                    value.to_lowercase()
                ));
            }
        }

        // 页面标题
        if let Some(caps) = TITLE_RE.captures(&resp.body) {
            if let Some(title) = caps.get(1) {
                features.push(format!(
                    "body_word:{}",
                    title.as_str().trim().to_lowercase()
                ));
            }
        }

        if !resp.favicon_hash.is_empty() {
            features.push(format!("favicon:{}", resp.favicon_hash));
        }

        features
    }

    /// 从TCP响应中提取特征
    pub fn extract_tcp_features(&self, resp: &TcpResponse) -> Vec<String> {
        let mut features = Vec::new();

        features.push(format!("port:{}", resp.port));

        let lower = resp.response.to_lowercase();
        for keyword in BANNER_KEYWORDS {
            if lower.contains(keyword) {
                features.push(format!("service_banner_word:{}:{}", resp.port, keyword));
            }
        }

        features
    }

    /// 统计每个候选指纹命中的特征数
    pub fn potential_fingerprints(&self, features: &[String]) -> HashMap<String, usize> {
        let mut counts = HashMap::new();

        for feature in features {
            if let Some(ids) = self.feature_map.get(feature) {
                for id in ids {
                    *counts.entry(id.clone()).or_insert(0) += 1;
                }
            }
        }

        counts
    }

    /// 取命中特征数最多的前N个指纹ID
    pub fn top_fingerprints(
        &self,
        counts: &HashMap<String, usize>,
        limit: usize,
        threshold: usize,
    ) -> Vec<String> {
        let mut list: Vec<(&String, usize)> = counts
            .iter()
            .filter(|(_, &count)| count >= threshold)
            .map(|(id, &count)| (id, count))
            .collect();

        // 计数降序，同计数按ID排序保证结果可复现
        list.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        if limit > 0 && list.len() > limit {
            list.truncate(limit);
        }

        list.into_iter().map(|(id, _)| id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> FeatureDetector {
        let mut map = FeatureMap::new();
        map.insert("status:200".to_string(), vec!["nginx".to_string(), "apache".to_string()]);
        map.insert(
            "header_word:header:server: nginx".to_string(),
            vec!["nginx".to_string()],
        );
        map.insert("port:22".to_string(), vec!["openssh".to_string()]);
        map.insert(
            "service_banner_word:22:openssh".to_string(),
            vec!["openssh".to_string()],
        );
        FeatureDetector::new(map)
    }

    fn http_resp() -> HttpResponse {
        HttpResponse {
            url: "http://example.test/".to_string(),
            path: "/".to_string(),
            status_code: 200,
            headers: vec![("Server".to_string(), "nginx".to_string())],
            body: "<html><title> Welcome </title></html>".to_string(),
            favicon_hash: String::new(),
        }
    }

    #[test]
    fn test_extract_http_features() {
        let features = detector().extract_http_features(&http_resp());
        assert!(features.contains(&"path:/".to_string()));
        assert!(features.contains(&"status:200".to_string()));
        assert!(features.contains(&"header_word:header:server: nginx".to_string()));
        assert!(features.contains(&"body_word:welcome".to_string()));
    }

    #[test]
    fn test_extract_tcp_features() {
        let resp = TcpResponse {
            host: "host".to_string(),
            port: 22,
            response: "SSH-2.0-OpenSSH_8.9\r\n".to_string(),
        };
        let features = detector().extract_tcp_features(&resp);
        assert!(features.contains(&"port:22".to_string()));
        assert!(features.contains(&"service_banner_word:22:ssh".to_string()));
        assert!(features.contains(&"service_banner_word:22:openssh".to_string()));
    }

    #[test]
    fn test_candidate_ranking() {
        let d = detector();
        let features = vec![
            "status:200".to_string(),
            "header_word:header:server: nginx".to_string(),
        ];
        let counts = d.potential_fingerprints(&features);
        assert_eq!(counts.get("nginx"), Some(&2));
        assert_eq!(counts.get("apache"), Some(&1));

        let top = d.top_fingerprints(&counts, 10, 1);
        assert_eq!(top[0], "nginx");

        // 阈值过滤
        let top = d.top_fingerprints(&counts, 10, 2);
        assert_eq!(top, vec!["nginx".to_string()]);
    }
}
