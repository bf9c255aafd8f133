// src/scanner/http.rs
use std::collections::HashSet;
use std::time::Duration;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use url::Url;

use crate::detector::favicon::fetch_favicon;
use crate::matcher::{self, HttpResponse, MatchResult};
use crate::scanner::confidence;
use crate::scanner::config::HttpConfig;
use crate::scanner::Scanner;

lazy_static! {
    static ref TITLE_RE: Regex = Regex::new(r"(?i)<title[^>]*>(.*?)</title>").unwrap();
}

/// 按HTTP配置构建客户端：证书校验、重定向策略、Cookie、UA和默认请求头
pub fn build_http_client(
    config: &HttpConfig,
    timeout: Duration,
) -> Result<reqwest::Client, Box<dyn std::error::Error>> {
    let redirect = match config.redirect_policy.as_str() {
        "none" => reqwest::redirect::Policy::none(),
        _ => reqwest::redirect::Policy::limited(config.max_redirects.max(1)),
    };

    let mut default_headers = reqwest::header::HeaderMap::new();
    for (name, value) in &config.default_headers {
        let name = match reqwest::header::HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => name,
            Err(_) => continue,
        };
        let value = match reqwest::header::HeaderValue::from_str(value) {
            Ok(value) => value,
            Err(_) => continue,
        };
        default_headers.insert(name, value);
    }

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(config.insecure_skip_verify)
        .redirect(redirect)
        .cookie_store(config.enable_cookie_jar)
        .user_agent(config.user_agent.clone())
        .default_headers(default_headers)
        .build()?;
    Ok(client)
}

/// 从原始响应体提取网页标题（保留原始大小写）
pub fn extract_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn is_default_port(scheme: &str, port: u16) -> bool {
    (scheme == "http" && port == 80) || (scheme == "https" && port == 443)
}

impl Scanner {
    /// 快速HTTP探测：请求首页一次，提取特征用于候选指纹筛选
    pub async fn quick_http_probe(
        &self,
        parsed_url: &Url,
    ) -> Result<Vec<String>, Box<dyn std::error::Error>> {
        let client = build_http_client(&self.config.http, self.config.timeout)?;

        let resp = client.get(parsed_url.as_str()).send().await?;

        let status = resp.status().as_u16();
        let headers = collect_headers(&resp);
        let body = resp.text().await.unwrap_or_default();

        let mut http_resp = HttpResponse {
            url: parsed_url.to_string(),
            path: parsed_url.path().to_string(),
            status_code: status,
            headers,
            body,
            favicon_hash: String::new(),
        };

        if self.config.enable_favicon {
            if let Ok(hash) = fetch_favicon(&client, parsed_url.as_str()).await {
                http_resp.favicon_hash = hash;
            }
        }

        Ok(self.detector.extract_http_features(&http_resp))
    }

    /// 精确HTTP匹配：按路径全集逐一请求，响应同时对default和other两组指纹求值
    pub async fn precise_http_match(
        &self,
        parsed_url: &Url,
        candidates: &[String],
    ) -> Result<Vec<MatchResult>, Box<dyn std::error::Error>> {
        if !candidates.is_empty() {
            debug!("HTTP candidates for {}: {:?}", parsed_url, candidates);
        }

        let client = build_http_client(&self.config.http, self.config.timeout)?;
        let scheme = parsed_url.scheme().to_string();
        let host = parsed_url
            .host_str()
            .ok_or_else(|| format!("Target URL has no host: {}", parsed_url))?
            .to_string();

        let target_ports: Vec<u16> = match parsed_url.port() {
            Some(port) => vec![port],
            None => match scheme.as_str() {
                "https" => vec![443],
                _ => vec![80],
            },
        };

        // 路径全集：default优先，再other，最后favicon路径，按(method, path)去重
        let mut seen = HashSet::new();
        let mut path_universe: Vec<(String, String)> = Vec::new();
        for cluster in self
            .clusters
            .web_default
            .iter()
            .chain(self.clusters.web_other.iter())
            .chain(self.clusters.web_favicon.iter())
        {
            let key = (cluster.method.clone(), cluster.path.clone());
            if seen.insert(key.clone()) {
                path_universe.push(key);
            }
        }

        // favicon哈希每个目标只取一次
        let favicon_hash = if self.config.enable_favicon {
            match fetch_favicon(&client, parsed_url.as_str()).await {
                Ok(hash) => {
                    debug!("Favicon hash for {}: {}", parsed_url, hash);
                    hash
                }
                Err(e) => {
                    debug!("Favicon fetch for {} failed: {}", parsed_url, e);
                    String::new()
                }
            }
        } else {
            String::new()
        };

        let mut all_results: Vec<MatchResult> = Vec::new();

        for &port in &target_ports {
            for (method, path) in &path_universe {
                let authority = if is_default_port(&scheme, port) {
                    host.clone()
                } else {
                    format!("{}:{}", host, port)
                };
                let req_url = format!("{}://{}{}", scheme, authority, path);

                let http_method = reqwest::Method::from_bytes(method.as_bytes())
                    .unwrap_or(reqwest::Method::GET);

                let resp = match client.request(http_method, &req_url).send().await {
                    Ok(resp) => resp,
                    Err(e) => {
                        debug!("Request {} failed: {}", req_url, e);
                        continue;
                    }
                };

                let status = resp.status().as_u16();
                let headers = collect_headers(&resp);
                let raw_body = resp.text().await.unwrap_or_default();
                // 标题从原始响应体提取，匹配用的body统一转小写
                let title = extract_title(&raw_body);

                let http_resp = HttpResponse {
                    url: req_url,
                    path: path.clone(),
                    status_code: status,
                    headers,
                    body: raw_body.to_lowercase(),
                    favicon_hash: favicon_hash.clone(),
                };

                for cluster in self
                    .clusters
                    .web_default
                    .iter()
                    .chain(self.clusters.web_other.iter())
                {
                    for fp in &cluster.operators {
                        let matched = matcher::matching_matchers_http(&fp.matchers, &http_resp);
                        if matched.is_empty() {
                            continue;
                        }

                        let mut result = MatchResult {
                            id: fp.id.clone(),
                            name: fp.info.name.clone(),
                            confidence: confidence::score(&matched, &self.confidence),
                            details: Default::default(),
                            tags: split_tags(&fp.info.tags),
                        };
                        result.details.insert("url".to_string(), http_resp.url.clone());
                        result
                            .details
                            .insert("status_code".to_string(), status.to_string());
                        if let Some(title) = &title {
                            result.details.insert("title".to_string(), title.clone());
                        }
                        for extractor in &fp.extractors {
                            if let Some(value) = matcher::extract_http(extractor, &http_resp) {
                                result.details.insert(extractor.name.clone(), value);
                            }
                        }

                        all_results.push(result);
                    }
                }

                // 还没有任何指纹命中时合成状态码伪结果，BP-stat开启则跳过
                if all_results.is_empty() && status != 0 {
                    if self.config.bp_stat {
                        continue;
                    }

                    let mut result = MatchResult {
                        id: "http-status-code".to_string(),
                        name: "http-status-code".to_string(),
                        confidence: self.confidence.matcher_weights.favicon,
                        details: Default::default(),
                        tags: Vec::new(),
                    };
                    result.details.insert("url".to_string(), http_resp.url.clone());
                    result
                        .details
                        .insert("status_code".to_string(), status.to_string());
                    if let Some(title) = &title {
                        result.details.insert("title".to_string(), title.clone());
                    }
                    all_results.push(result);
                }
            }
        }

        // favicon聚类独立匹配
        if self.config.enable_favicon && !favicon_hash.is_empty() {
            let favicon_resp = HttpResponse {
                url: parsed_url.to_string(),
                favicon_hash: favicon_hash.clone(),
                ..Default::default()
            };

            for cluster in &self.clusters.web_favicon {
                for fp in &cluster.operators {
                    let matched = matcher::matching_matchers_http(&fp.matchers, &favicon_resp);
                    if matched.is_empty() {
                        continue;
                    }

                    let mut result = MatchResult {
                        id: fp.id.clone(),
                        name: fp.info.name.clone(),
                        confidence: confidence::score(&matched, &self.confidence),
                        details: Default::default(),
                        tags: split_tags(&fp.info.tags),
                    };
                    result
                        .details
                        .insert("favicon_match".to_string(), "true".to_string());
                    result
                        .details
                        .insert("favicon_hash".to_string(), favicon_hash.clone());
                    all_results.push(result);
                }
            }
        }

        Ok(all_results)
    }
}

fn collect_headers(resp: &reqwest::Response) -> Vec<(String, String)> {
    resp.headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

pub(crate) fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<html><title>Welcome to nginx!</title></html>"),
            Some("Welcome to nginx!".to_string())
        );
        assert_eq!(
            extract_title(r#"<TITLE lang="en"> spaced </TITLE>"#),
            Some("spaced".to_string())
        );
        assert_eq!(extract_title("<html></html>"), None);
    }

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags("web,nginx, server"), vec!["web", "nginx", "server"]);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn test_is_default_port() {
        assert!(is_default_port("http", 80));
        assert!(is_default_port("https", 443));
        assert!(!is_default_port("http", 8080));
    }
}
