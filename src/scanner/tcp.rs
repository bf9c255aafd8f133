// src/scanner/tcp.rs
use std::sync::Arc;
use std::time::Duration;
use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use url::Url;

use crate::matcher::{self, MatchResult, TcpResponse};
use crate::scanner::confidence;
use crate::scanner::http::split_tags;
use crate::scanner::Scanner;

// banner读取上限与读超时
const MAX_BANNER_BYTES: usize = 2048;
const READ_DEADLINE: Duration = Duration::from_secs(3);

// 配置缺失时的兜底端口序列
const FALLBACK_PORTS: [u16; 13] = [
    21, 22, 25, 80, 443, 1521, 3306, 5432, 6379, 8080, 8443, 9200, 27017,
];

/// 连接端口并读取banner，先发一个通用HTTP GET诱导对端吐出数据。
/// 读超时后保留已收到的部分，完全没有数据时返回None
pub async fn probe_banner(host: &str, port: u16, dial_timeout: Duration) -> Option<TcpResponse> {
    let address = format!("{}:{}", host, port);

    let mut stream = match timeout(dial_timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!("Connect {} failed: {}", address, e);
            return None;
        }
        Err(_) => {
            debug!("Connect {} timed out", address);
            return None;
        }
    };

    // 通用探测：HTTP服务返回响应头，其他服务通常回错误banner
    let request = format!(
        "GET / HTTP/1.1\r\nHost: {}\r\nUser-Agent: Mozilla/5.0\r\nConnection: close\r\n\r\n",
        host
    );
    if let Err(e) = stream.write_all(request.as_bytes()).await {
        debug!("Send probe to {} failed: {}", address, e);
    }

    let mut banner: Vec<u8> = Vec::new();
    let read_result = timeout(READ_DEADLINE, async {
        let mut buffer = [0u8; MAX_BANNER_BYTES];
        loop {
            match stream.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    banner.extend_from_slice(&buffer[..n]);
                    if banner.len() >= MAX_BANNER_BYTES {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Read {} failed: {}", address, e);
                    break;
                }
            }
        }
    })
    .await;

    if read_result.is_err() {
        debug!("Read {} timed out with {} bytes buffered", address, banner.len());
    }

    if banner.is_empty() {
        return None;
    }

    Some(TcpResponse {
        host: host.to_string(),
        port,
        response: String::from_utf8_lossy(&banner).to_string(),
    })
}

impl Scanner {
    fn tcp_target_ports(&self, parsed_port: Option<u16>) -> Vec<u16> {
        if let Some(port) = parsed_port {
            return vec![port];
        }
        if !self.config.default_tcp_ports.is_empty() {
            return self.config.default_tcp_ports.clone();
        }
        FALLBACK_PORTS.to_vec()
    }

    /// 精确TCP匹配：逐端口取banner，先按服务聚类匹配，再回退空名聚类
    pub async fn precise_tcp_match(
        &self,
        target: &str,
        candidates: &[String],
    ) -> Result<Vec<MatchResult>, Box<dyn std::error::Error>> {
        if !candidates.is_empty() {
            debug!("TCP candidates for {}: {:?}", target, candidates);
        }

        let parsed = Url::parse(target)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| format!("Target URL has no host: {}", target))?
            .to_string();
        let target_ports = self.tcp_target_ports(parsed.port());

        let mut results = Vec::new();
        for &port in &target_ports {
            if let Some(resp) = probe_banner(&host, port, self.config.timeout).await {
                let port_results = self.match_tcp_response(&resp);
                if !port_results.is_empty() {
                    debug!("Port {} matched {} result(s)", port, port_results.len());
                    results.extend(port_results);
                }
            }
        }

        Ok(crate::scanner::unique_results(results))
    }

    // 同一banner依次尝试：端口命中的服务聚类（稀有度升序）、空名聚类
    pub(crate) fn match_tcp_response(&self, resp: &TcpResponse) -> Vec<MatchResult> {
        for cluster in &self.clusters.tcp_service {
            // 空端口集视为通配
            if !cluster.ports.is_empty() && !cluster.ports.contains(resp.port) {
                continue;
            }
            for fp in &cluster.operators {
                let matched = matcher::matching_matchers_tcp(&fp.matchers, resp);
                if !matched.is_empty() {
                    return vec![self.build_tcp_result(fp, &matched, resp)];
                }
            }
        }

        for cluster in &self.clusters.tcp_null {
            for fp in &cluster.operators {
                let matched = matcher::matching_matchers_tcp(&fp.matchers, resp);
                if !matched.is_empty() {
                    return vec![self.build_tcp_result(fp, &matched, resp)];
                }
            }
        }

        Vec::new()
    }

    fn build_tcp_result(
        &self,
        fp: &crate::cluster::ClusteredFingerprint,
        matched: &[&crate::fingerprint::Matcher],
        resp: &TcpResponse,
    ) -> MatchResult {
        let mut result = MatchResult {
            id: fp.id.clone(),
            name: fp.info.name.clone(),
            confidence: confidence::score(matched, &self.confidence),
            details: Default::default(),
            tags: split_tags(&fp.info.tags),
        };

        result.details.insert("host".to_string(), resp.host.clone());
        result.details.insert("port".to_string(), resp.port.to_string());

        for extractor in &fp.extractors {
            if let Some(value) = matcher::extract_tcp(extractor, resp) {
                result.details.insert(extractor.name.clone(), value);
            }
        }

        result
    }

    // 从服务聚类的端口集收集常见端口，补上兜底列表，限量避免连接过多
    pub(crate) fn common_ports_from_clusters(&self) -> Vec<u16> {
        let mut set = std::collections::BTreeSet::new();

        for cluster in &self.clusters.tcp_service {
            for port in cluster.ports.enumerate(self.config.max_ports_per_service) {
                set.insert(port);
            }
        }
        for port in FALLBACK_PORTS {
            set.insert(port);
        }

        let mut ports: Vec<u16> = set.into_iter().collect();
        if ports.len() > 15 {
            ports.truncate(15);
        }
        ports
    }

    /// 快速TCP探测：端口并发受concurrency上限约束，收集特征用于候选筛选
    pub async fn quick_tcp_probe(&self, host: &str) -> Vec<String> {
        let ports: Vec<u16> = if !self.config.custom_ports.is_empty() {
            let mut ports = Vec::new();
            for expr in &self.config.custom_ports {
                match crate::cluster::PortSet::parse(expr) {
                    Ok(set) => ports.extend(set.enumerate(self.config.max_ports_per_service)),
                    Err(e) => debug!("Skipping custom port expression '{}': {}", expr, e),
                }
            }
            ports
        } else {
            self.common_ports_from_clusters()
        };

        if ports.is_empty() {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel(ports.len());
        let dial_timeout = self.config.timeout;

        for port in ports {
            let tx = tx.clone();
            let semaphore = semaphore.clone();
            let host = host.to_string();

            tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                if let Some(resp) = probe_banner(&host, port, dial_timeout).await {
                    let _ = tx.send(resp).await;
                }
            });
        }
        drop(tx);

        let mut features = Vec::new();
        while let Some(resp) = rx.recv().await {
            features.extend(self.detector.extract_tcp_features(&resp));
        }

        features
    }
}
