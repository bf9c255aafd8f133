// src/detector/feature_map.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use log::{info, warn};

use crate::fingerprint::Fingerprint;

/// 特征到指纹ID列表的反向映射，BTreeMap保证序列化键序稳定
pub type FeatureMap = BTreeMap<String, Vec<String>>;

fn append_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|s| s == id) {
        list.push(id.to_string());
    }
}

fn insert(map: &mut FeatureMap, key: String, id: &str) {
    append_unique(map.entry(key).or_default(), id);
}

// 端口表达式拆分为单个token，如 "22, 80,1000-2000" -> ["22","80","1000-2000"]
fn port_tokens(port: &str) -> Vec<String> {
    port.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// 从指纹库提取特征并构建特征-指纹关联映射
pub fn build_feature_map(
    web_fingerprints: &[Fingerprint],
    service_fingerprints: &[Fingerprint],
) -> FeatureMap {
    let mut map = FeatureMap::new();

    // Web指纹
    for fp in web_fingerprints {
        for probe in &fp.http {
            // 路径特征
            for path in &probe.path {
                let mut normalized = path.trim().to_lowercase();
                if normalized == "{{baseurl}}/" {
                    normalized = "/".to_string();
                }
                if !normalized.is_empty() && !normalized.starts_with("{{") {
                    insert(&mut map, format!("path:{}", normalized), &fp.id);
                }
            }

            // 匹配器特征
            for matcher in &probe.matchers {
                let part = matcher.part.trim().to_lowercase();
                let matcher_type = matcher.matcher_type.trim().to_lowercase();

                match matcher_type.as_str() {
                    "status" => {
                        if part == "status" || part == "all" || part.is_empty() {
                            for status in &matcher.status {
                                insert(&mut map, format!("status:{}", status), &fp.id);
                            }
                        }
                    }
                    "word" => {
                        if part == "header" || part == "body" || part == "all" || part.is_empty() {
                            for word in &matcher.words {
                                let word = word.trim().to_lowercase();
                                if word.is_empty() {
                                    continue;
                                }
                                if part == "header"
                                    && (word.contains("server:")
                                        || word.contains("x-powered-by:")
                                        || word.contains("set-cookie:"))
                                {
                                    insert(&mut map, format!("header_word:{}:{}", part, word), &fp.id);
                                } else if part == "body"
                                    && (word.contains("<title")
                                        || word.contains("<h1")
                                        || word.contains("welcome")
                                        || word.contains("test page"))
                                {
                                    insert(&mut map, format!("body_word:{}", word), &fp.id);
                                } else if part == "all" {
                                    insert(&mut map, format!("word_all:{}", word), &fp.id);
                                }
                            }
                        }
                    }
                    "regex" => {
                        if part == "header" || part == "body" || part == "all" || part.is_empty() {
                            for regex in &matcher.regex {
                                let regex = regex.trim().to_lowercase();
                                if regex.is_empty() {
                                    continue;
                                }
                                if part == "header"
                                    && (regex.contains("server:")
                                        || regex.contains("x-powered-by:")
                                        || regex.contains("set-cookie:"))
                                {
                                    insert(&mut map, format!("header_regex:{}:{}", part, regex), &fp.id);
                                } else if part == "body"
                                    && (regex.contains("<title") || regex.contains("<h1"))
                                {
                                    insert(&mut map, format!("body_regex:{}", regex), &fp.id);
                                } else if part == "all" {
                                    insert(&mut map, format!("regex_all:{}", regex), &fp.id);
                                }
                            }
                        }
                    }
                    "favicon" => {
                        if part == "favicon" || part == "all" || part.is_empty() {
                            for hash in &matcher.favicon_hash {
                                let hash = hash.trim().to_lowercase();
                                if !hash.is_empty() {
                                    insert(&mut map, format!("favicon:{}", hash), &fp.id);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    // Service指纹
    for fp in service_fingerprints {
        if fp.tcp.is_empty() {
            continue;
        }
        for probe in &fp.tcp {
            let tokens = port_tokens(&probe.port);
            for token in &tokens {
                insert(&mut map, format!("port:{}", token), &fp.id);
            }

            for matcher in &probe.matchers {
                let mut part = matcher.part.trim().to_lowercase();
                if part.is_empty() {
                    part = "response".to_string();
                }
                let matcher_type = matcher.matcher_type.trim().to_lowercase();

                match matcher_type.as_str() {
                    "word" => {
                        if part == "response" || part == "all" {
                            for word in &matcher.words {
                                let word = word.trim().to_lowercase();
                                if word.is_empty() {
                                    continue;
                                }
                                let is_banner_word = word.contains("openssh")
                                    || word.contains("vsftpd")
                                    || word.contains("ftp")
                                    || word.contains("ssh")
                                    || word.contains("server")
                                    || word.contains("protocol");
                                if is_banner_word {
                                    for token in &tokens {
                                        insert(
                                            &mut map,
                                            format!("service_banner_word:{}:{}", token, word),
                                            &fp.id,
                                        );
                                    }
                                }
                            }
                        }
                    }
                    "regex" => {
                        if part == "response" || part == "all" {
                            for regex in &matcher.regex {
                                let regex = regex.trim().to_lowercase();
                                if regex.is_empty() {
                                    continue;
                                }
                                let is_banner_regex = regex.contains("version")
                                    || regex.contains("protocol")
                                    || regex.contains("service");
                                if is_banner_regex {
                                    for token in &tokens {
                                        insert(
                                            &mut map,
                                            format!("service_banner_regex:{}:{}", token, regex),
                                            &fp.id,
                                        );
                                    }
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }

            for extractor in &probe.extractors {
                if extractor.extractor_type.trim().to_lowercase() == "regex" {
                    for regex in &extractor.regex {
                        if !regex.is_empty() {
                            for token in &tokens {
                                insert(
                                    &mut map,
                                    format!("service_extractor_regex:{}:{}", token, regex),
                                    &fp.id,
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    // ID列表排序，保证同一指纹库重建后的映射完全一致
    for ids in map.values_mut() {
        ids.sort();
        ids.dedup();
    }

    map
}

/// 加载特征映射，不存在或损坏时重建并尽力保存
pub fn load_or_generate_feature_map(
    path: impl AsRef<Path>,
    web_fingerprints: &[Fingerprint],
    service_fingerprints: &[Fingerprint],
) -> FeatureMap {
    let path = path.as_ref();

    if let Ok(data) = fs::read_to_string(path) {
        if let Ok(map) = serde_json::from_str::<FeatureMap>(&data) {
            info!("Loaded feature map with {} entries from {}", map.len(), path.display());
            return map;
        }
        warn!("Feature map file {} is corrupt, rebuilding", path.display());
    }

    let map = build_feature_map(web_fingerprints, service_fingerprints);
    info!("Generated feature map with {} entries", map.len());

    match serde_json::to_string_pretty(&map) {
        Ok(json) => {
            if let Err(e) = fs::write(path, json) {
                warn!("Failed to save feature map to {}: {}", path.display(), e);
            }
        }
        Err(e) => warn!("Failed to serialize feature map: {}", e),
    }

    map
}
