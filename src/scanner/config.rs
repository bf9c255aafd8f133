// src/scanner/config.rs
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use log::warn;
use serde::{Deserialize, Serialize};

/// 扫描器配置
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// 单个请求/连接的超时时间
    pub timeout: Duration,
    /// 候选指纹的特征匹配阈值
    pub feature_threshold: usize,
    /// 最大候选指纹数
    pub max_candidates: usize,
    pub concurrency: usize,
    pub enable_favicon: bool,
    pub enable_tcp: bool,
    /// 自定义TCP扫描端口表达式
    pub custom_ports: Vec<String>,
    /// 每个服务枚举端口数上限
    pub max_ports_per_service: usize,
    /// 默认TCP端口列表，从配置文件加载
    pub default_tcp_ports: Vec<u16>,
    /// 只输出有指纹匹配的结果，不合成状态码伪指纹
    pub bp_stat: bool,
    /// HTTP客户端配置
    pub http: HttpConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            timeout: Duration::from_secs(10),
            feature_threshold: 1,
            max_candidates: 10,
            concurrency: 5,
            enable_favicon: true,
            enable_tcp: true,
            custom_ports: Vec::new(),
            max_ports_per_service: 5,
            default_tcp_ports: Vec::new(),
            bp_stat: false,
            http: HttpConfig::default(),
        }
    }
}

/// HTTP客户端配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// 跳过TLS证书验证
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// 重定向策略：none、follow
    #[serde(default)]
    pub redirect_policy: String,
    #[serde(default)]
    pub max_redirects: usize,
    #[serde(default)]
    pub enable_cookie_jar: bool,
    #[serde(default)]
    pub user_agent: String,
    /// 每个请求附带的默认请求头
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let mut default_headers = HashMap::new();
        default_headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                .to_string(),
        );
        default_headers.insert(
            "Accept-Language".to_string(),
            "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
        );

        HttpConfig {
            insecure_skip_verify: true,
            redirect_policy: "follow".to_string(),
            max_redirects: 5,
            enable_cookie_jar: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            default_headers,
        }
    }
}

/// TCP端口配置文件结构
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TcpPortConfig {
    #[serde(default)]
    pub default_ports: Vec<u16>,
    #[serde(default)]
    pub service_ports: HashMap<String, Vec<u16>>,
    #[serde(default)]
    pub scan_options: ScanOptions,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScanOptions {
    #[serde(default)]
    pub max_port_count: usize,
    #[serde(default)]
    pub timeout_seconds: u64,
}

pub fn load_tcp_port_config(path: impl AsRef<Path>) -> Result<TcpPortConfig, Box<dyn std::error::Error>> {
    let data = fs::read_to_string(path.as_ref())?;
    let config: TcpPortConfig = serde_json::from_str(&data)?;
    Ok(config)
}

/// 置信度计算配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfidenceConfig {
    pub matcher_weights: MatcherWeights,
    pub combo_weights: ComboWeights,
    pub min_confidence: f64,
    pub max_confidence: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatcherWeights {
    pub favicon: f64,
    pub regex: HashMap<String, f64>,
    pub word: HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComboWeights {
    pub multiple_matchers: f64,
    pub favicon_with_others: f64,
    pub server_regex_with_title: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        let mut regex = HashMap::new();
        regex.insert("default".to_string(), 0.6);
        regex.insert("server".to_string(), 0.8);
        regex.insert("title".to_string(), 0.7);

        let mut word = HashMap::new();
        word.insert("default".to_string(), 0.4);
        word.insert("server".to_string(), 0.65);
        word.insert("title".to_string(), 0.55);

        ConfidenceConfig {
            matcher_weights: MatcherWeights {
                favicon: 0.9,
                regex,
                word,
            },
            combo_weights: ComboWeights {
                multiple_matchers: 0.1,
                favicon_with_others: 0.15,
                server_regex_with_title: 0.2,
            },
            min_confidence: 0.1,
            max_confidence: 1.0,
        }
    }
}

pub fn load_confidence_config(path: impl AsRef<Path>) -> Result<ConfidenceConfig, Box<dyn std::error::Error>> {
    let data = fs::read_to_string(path.as_ref())?;
    let config: ConfidenceConfig = serde_json::from_str(&data)?;
    Ok(config)
}

/// 加载置信度配置，失败时告警并使用默认值
pub fn load_confidence_config_or_default(path: impl AsRef<Path>) -> ConfidenceConfig {
    match load_confidence_config(path.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            warn!(
                "Failed to load confidence config {}: {}, using defaults",
                path.as_ref().display(),
                e
            );
            ConfidenceConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_confidence_config() {
        let config = ConfidenceConfig::default();
        assert_eq!(config.matcher_weights.favicon, 0.9);
        assert_eq!(config.matcher_weights.regex["server"], 0.8);
        assert_eq!(config.matcher_weights.word["title"], 0.55);
        assert!(config.min_confidence < config.max_confidence);
    }

    #[test]
    fn test_parse_tcp_port_config() {
        let data = r#"{
            "default_ports": [21, 22, 80, 443],
            "service_ports": {"ssh": [22, 2222]},
            "scan_options": {"max_port_count": 5, "timeout_seconds": 3}
        }"#;
        let config: TcpPortConfig = serde_json::from_str(data).unwrap();
        assert_eq!(config.default_ports, vec![21, 22, 80, 443]);
        assert_eq!(config.service_ports["ssh"], vec![22, 2222]);
        assert_eq!(config.scan_options.max_port_count, 5);
    }

    #[test]
    fn test_default_http_config() {
        let config = HttpConfig::default();
        assert!(config.insecure_skip_verify);
        assert_eq!(config.redirect_policy, "follow");
        assert_eq!(config.max_redirects, 5);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
        assert!(config.default_headers.contains_key("Accept"));
    }

    #[test]
    fn test_parse_confidence_config() {
        let data = r#"{
            "matcher_weights": {
                "favicon": 0.95,
                "regex": {"default": 0.5, "server": 0.9, "title": 0.6},
                "word": {"default": 0.3, "server": 0.7, "title": 0.5}
            },
            "combo_weights": {
                "multiple_matchers": 0.05,
                "favicon_with_others": 0.1,
                "server_regex_with_title": 0.15
            },
            "min_confidence": 0.2,
            "max_confidence": 0.99
        }"#;
        let config: ConfidenceConfig = serde_json::from_str(data).unwrap();
        assert_eq!(config.matcher_weights.favicon, 0.95);
        assert_eq!(config.combo_weights.multiple_matchers, 0.05);
        assert_eq!(config.max_confidence, 0.99);
    }
}
