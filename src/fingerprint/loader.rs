// src/fingerprint/loader.rs
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use log::{debug, info, warn};

use crate::fingerprint::Fingerprint;

/// 从JSON文件加载指纹库，加载失败对启动是致命的
pub fn load_fingerprints(path: impl AsRef<Path>) -> Result<Vec<Fingerprint>, Box<dyn std::error::Error>> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read fingerprint file {}: {}", path.display(), e))?;

    let fingerprints: Vec<Fingerprint> = serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse fingerprint file {}: {}", path.display(), e))?;

    // 检查ID唯一性
    let mut seen = HashSet::new();
    for fp in &fingerprints {
        if !seen.insert(fp.id.as_str()) {
            warn!("Duplicate fingerprint id '{}' in {}", fp.id, path.display());
        }
    }

    info!("Loaded {} fingerprints from {}", fingerprints.len(), path.display());
    Ok(preprocess_fingerprints(fingerprints))
}

/// 预处理指纹：case-insensitive的word匹配器在加载期统一转小写，
/// 匹配热路径只需要处理响应内容的大小写
pub fn preprocess_fingerprints(mut fingerprints: Vec<Fingerprint>) -> Vec<Fingerprint> {
    let mut lowered = 0usize;

    for fp in &mut fingerprints {
        for probe in &mut fp.http {
            for matcher in &mut probe.matchers {
                if matcher.matcher_type == "word" && matcher.case_insensitive {
                    for word in &mut matcher.words {
                        *word = word.to_lowercase();
                    }
                    lowered += 1;
                }
            }
        }
        for probe in &mut fp.tcp {
            for matcher in &mut probe.matchers {
                if matcher.matcher_type == "word" && matcher.case_insensitive {
                    for word in &mut matcher.words {
                        *word = word.to_lowercase();
                    }
                    lowered += 1;
                }
            }
        }
    }

    if lowered > 0 {
        debug!("Pre-lowered words of {} case-insensitive matchers", lowered);
    }

    fingerprints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_fingerprint() {
        let data = r#"[{
            "id": "nginx",
            "info": {"name": "Nginx", "author": "t", "tags": "server", "severity": "info",
                     "metadata": {"rarity": 1}},
            "http": [{"method": "GET", "path": ["{{BaseURL}}/"],
                      "matchers": [{"type": "word", "part": "header",
                                    "words": ["Server: nginx"], "case-insensitive": true}]}]
        }]"#;

        let fps: Vec<Fingerprint> = serde_json::from_str(data).unwrap();
        assert_eq!(fps.len(), 1);
        assert_eq!(fps[0].id, "nginx");
        assert_eq!(fps[0].info.metadata.rarity, 1);
        assert_eq!(fps[0].http[0].matchers[0].words, vec!["Server: nginx"]);
        assert!(fps[0].http[0].matchers[0].case_insensitive);
    }

    #[test]
    fn test_preprocess_lowers_case_insensitive_words() {
        let data = r#"[{
            "id": "a",
            "info": {"name": "A"},
            "http": [{"path": ["/"],
                      "matchers": [
                        {"type": "word", "words": ["Apache HTTPD"], "case-insensitive": true},
                        {"type": "word", "words": ["KeepCase"]}
                      ]}]
        }]"#;

        let fps = preprocess_fingerprints(serde_json::from_str(data).unwrap());
        assert_eq!(fps[0].http[0].matchers[0].words, vec!["apache httpd"]);
        // 非case-insensitive的保持原样
        assert_eq!(fps[0].http[0].matchers[1].words, vec!["KeepCase"]);
    }

    #[test]
    fn test_parse_tcp_probe() {
        let data = r#"[{
            "id": "openssh",
            "info": {"name": "OpenSSH", "metadata": {"rarity": 1}},
            "tcp": [{"name": "ssh", "port": "22,2222",
                     "inputs": [{"read": 1024}],
                     "matchers": [{"type": "word", "words": ["SSH-2.0-OpenSSH"]}],
                     "extractors": [{"name": "version", "type": "regex",
                                     "regex": ["SSH-2.0-OpenSSH[_-]([\\d.]+)"]}]}]
        }]"#;

        let fps: Vec<Fingerprint> = serde_json::from_str(data).unwrap();
        let tcp = &fps[0].tcp[0];
        assert_eq!(tcp.name, "ssh");
        assert_eq!(tcp.port, "22,2222");
        assert_eq!(tcp.inputs[0].read, 1024);
        assert_eq!(tcp.extractors[0].name, "version");
    }

    #[test]
    fn test_favicon_matcher_detection() {
        let m = crate::fingerprint::Matcher {
            matcher_type: "favicon".to_string(),
            ..Default::default()
        };
        assert!(m.is_favicon());

        let m2 = crate::fingerprint::Matcher {
            matcher_type: "word".to_string(),
            favicon_hash: vec!["d41d8cd98f00b204e9800998ecf8427e".to_string()],
            ..Default::default()
        };
        assert!(m2.is_favicon());
    }
}
