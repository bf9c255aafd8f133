// src/scanner/confidence.rs
use crate::fingerprint::Matcher;
use crate::scanner::config::ConfidenceConfig;

// 匹配器的权重档位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WeightKind {
    Default,
    Server,
    Title,
}

fn needle_kind(needles: &[String]) -> WeightKind {
    for needle in needles {
        let lower = needle.to_lowercase();
        if lower.contains("server:") {
            return WeightKind::Server;
        }
        if lower.contains("<title") || lower.contains("title>") {
            return WeightKind::Title;
        }
    }
    WeightKind::Default
}

fn lookup(table: &std::collections::HashMap<String, f64>, kind: WeightKind, fallback: f64) -> f64 {
    let key = match kind {
        WeightKind::Default => "default",
        WeightKind::Server => "server",
        WeightKind::Title => "title",
    };
    table.get(key).copied().unwrap_or(fallback)
}

/// 单个匹配器的基础置信度
pub fn matcher_weight(matcher: &Matcher, config: &ConfidenceConfig) -> f64 {
    match matcher.matcher_type.as_str() {
        "favicon" => config.matcher_weights.favicon,
        "regex" => lookup(
            &config.matcher_weights.regex,
            needle_kind(&matcher.regex),
            config.min_confidence,
        ),
        "word" => lookup(
            &config.matcher_weights.word,
            needle_kind(&matcher.words),
            config.min_confidence,
        ),
        // 其他类型（如status）取最低置信度
        _ => config.min_confidence,
    }
}

/// 根据命中的匹配器集合计算规则置信度：
/// 基础分取最高权重，多匹配器组合再加成，最终截断到[min, max]
pub fn score(matched: &[&Matcher], config: &ConfidenceConfig) -> f64 {
    let mut confidence: f64 = matched
        .iter()
        .map(|m| matcher_weight(m, config))
        .fold(0.0, f64::max);

    if matched.len() >= 2 {
        confidence += config.combo_weights.multiple_matchers;
    }

    let has_favicon = matched.iter().any(|m| m.matcher_type == "favicon");
    if has_favicon && matched.iter().any(|m| m.matcher_type != "favicon") {
        confidence += config.combo_weights.favicon_with_others;
    }

    let has_server_regex = matched
        .iter()
        .any(|m| m.matcher_type == "regex" && needle_kind(&m.regex) == WeightKind::Server);
    let has_title = matched.iter().any(|m| {
        (m.matcher_type == "word" && needle_kind(&m.words) == WeightKind::Title)
            || (m.matcher_type == "regex" && needle_kind(&m.regex) == WeightKind::Title)
    });
    if has_server_regex && has_title {
        confidence += config.combo_weights.server_regex_with_title;
    }

    confidence.clamp(config.min_confidence, config.max_confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConfidenceConfig {
        ConfidenceConfig::default()
    }

    fn word_matcher(words: &[&str]) -> Matcher {
        Matcher {
            matcher_type: "word".to_string(),
            words: words.iter().map(|w| w.to_string()).collect(),
            ..Default::default()
        }
    }

    fn regex_matcher(patterns: &[&str]) -> Matcher {
        Matcher {
            matcher_type: "regex".to_string(),
            regex: patterns.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_word_weight_kinds() {
        let config = config();
        assert_eq!(matcher_weight(&word_matcher(&["Server: nginx"]), &config), 0.65);
        assert_eq!(
            matcher_weight(&word_matcher(&["<title>welcome</title>"]), &config),
            0.55
        );
        assert_eq!(matcher_weight(&word_matcher(&["wp-content"]), &config), 0.4);
    }

    #[test]
    fn test_regex_weight_kinds() {
        let config = config();
        assert_eq!(
            matcher_weight(&regex_matcher(&["server: nginx/([\\d.]+)"]), &config),
            0.8
        );
        assert_eq!(
            matcher_weight(&regex_matcher(&["<title>(.*?)</title>"]), &config),
            0.7
        );
        assert_eq!(matcher_weight(&regex_matcher(&["jquery-[\\d.]+"]), &config), 0.6);
    }

    #[test]
    fn test_favicon_weight() {
        let config = config();
        let m = Matcher {
            matcher_type: "favicon".to_string(),
            favicon_hash: vec!["abc".to_string()],
            ..Default::default()
        };
        assert_eq!(matcher_weight(&m, &config), 0.9);
    }

    #[test]
    fn test_multiple_matchers_bump() {
        let config = config();
        let server = word_matcher(&["Server: nginx"]);
        let title = word_matcher(&["<title>nginx</title>"]);

        let single = score(&[&server], &config);
        let both = score(&[&server, &title], &config);
        assert!(both > single);
        assert!((both - (0.65 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_server_regex_with_title_combo() {
        let config = config();
        let server = regex_matcher(&["server: nginx"]);
        let title = word_matcher(&["<title>welcome</title>"]);
        let result = score(&[&server, &title], &config);
        // 0.8基础 + 0.1多匹配器 + 0.2组合，截断到1.0
        assert_eq!(result, 1.0);
    }

    #[test]
    fn test_favicon_with_others_combo() {
        let config = config();
        let favicon = Matcher {
            matcher_type: "favicon".to_string(),
            favicon_hash: vec!["abc".to_string()],
            ..Default::default()
        };
        let word = word_matcher(&["wp-content"]);

        // 0.9基础 + 0.1多匹配器 + 0.15图标组合，截断到1.0
        let result = score(&[&favicon, &word], &config);
        assert_eq!(result, 1.0);

        // 单独favicon不触发组合加成
        assert_eq!(score(&[&favicon], &config), 0.9);
    }

    #[test]
    fn test_score_clamped_to_range() {
        let config = config();
        let status = Matcher {
            matcher_type: "status".to_string(),
            status: vec![200],
            ..Default::default()
        };
        let result = score(&[&status], &config);
        assert!(result >= config.min_confidence);
        assert!(result <= config.max_confidence);
    }
}
