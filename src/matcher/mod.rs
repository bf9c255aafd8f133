// src/matcher/mod.rs
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::fingerprint::{Extractor, Matcher};

lazy_static! {
    // 编译后的正则缓存，指纹库固定，缓存一次性填满；
    // 编译失败缓存None，坏模式不会反复重试
    static ref REGEX_CACHE: RwLock<HashMap<String, Option<Regex>>> = RwLock::new(HashMap::new());
}

/// 带缓存的正则编译，失败返回None（静默跳过该模式）
pub fn compile_cached(pattern: &str) -> Option<Regex> {
    if let Some(cached) = REGEX_CACHE.read().unwrap().get(pattern) {
        return cached.clone();
    }

    let compiled = Regex::new(pattern).ok();
    REGEX_CACHE
        .write()
        .unwrap()
        .insert(pattern.to_string(), compiled.clone());
    compiled
}

// HTTP响应的关键信息
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub url: String,
    pub path: String,
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub favicon_hash: String,
}

// TCP响应的关键信息
#[derive(Debug, Clone, Default)]
pub struct TcpResponse {
    pub host: String,
    pub port: u16,
    pub response: String,
}

/// 指纹匹配结果
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub id: String,
    pub name: String,
    pub confidence: f64,
    pub details: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

// 匹配器作用的响应视图
enum ResponseContext<'a> {
    Http(&'a HttpResponse),
    Tcp(&'a TcpResponse),
}

impl<'a> ResponseContext<'a> {
    fn default_part(&self) -> &'static str {
        match self {
            ResponseContext::Http(_) => "body",
            ResponseContext::Tcp(_) => "response",
        }
    }

    // 取part对应的内容视图，None表示指定的头不存在（必定不匹配）
    fn view(&self, part: &str) -> Option<String> {
        match self {
            ResponseContext::Http(resp) => match part {
                "body" => Some(resp.body.clone()),
                "header" => {
                    let mut headers = String::new();
                    for (name, value) in &resp.headers {
                        headers.push_str(name);
                        headers.push_str(": ");
                        headers.push_str(value);
                        headers.push('\n');
                    }
                    Some(headers)
                }
                "all" | "response" => {
                    let mut all = format!("HTTP/1.1 {}\n", resp.status_code);
                    for (name, value) in &resp.headers {
                        all.push_str(name);
                        all.push_str(": ");
                        all.push_str(value);
                        all.push('\n');
                    }
                    all.push('\n');
                    all.push_str(&resp.body);
                    Some(all)
                }
                // 具体的HTTP头，如 "server"、"x-powered-by"
                name => {
                    let mut content = String::new();
                    for (header_name, value) in &resp.headers {
                        if header_name.eq_ignore_ascii_case(name) {
                            content.push_str(value);
                            content.push('\n');
                        }
                    }
                    if content.is_empty() {
                        None
                    } else {
                        Some(content)
                    }
                }
            },
            ResponseContext::Tcp(resp) => match part {
                "response" | "all" | "body" => Some(resp.response.clone()),
                _ => None,
            },
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            ResponseContext::Http(resp) => Some(resp.status_code),
            ResponseContext::Tcp(_) => None,
        }
    }

    fn favicon_hash(&self) -> Option<&str> {
        match self {
            ResponseContext::Http(resp) if !resp.favicon_hash.is_empty() => {
                Some(resp.favicon_hash.as_str())
            }
            _ => None,
        }
    }
}

/// 检查HTTP匹配器是否命中
pub fn is_matcher_hit_http(matcher: &Matcher, resp: &HttpResponse) -> bool {
    is_matcher_hit(matcher, &ResponseContext::Http(resp))
}

/// 检查TCP匹配器是否命中
pub fn is_matcher_hit_tcp(matcher: &Matcher, resp: &TcpResponse) -> bool {
    is_matcher_hit(matcher, &ResponseContext::Tcp(resp))
}

// 子句按favicon、word、regex、status顺序求值，在condition下组合，
// negative最后对组合结果取反
fn is_matcher_hit(matcher: &Matcher, ctx: &ResponseContext) -> bool {
    let condition = matcher.condition_or_default();
    let mut has_clauses = false;
    let mut composite = false;

    let clauses: [Option<bool>; 4] = [
        if matcher.favicon_hash.is_empty() {
            None
        } else {
            Some(match_favicon(matcher, ctx))
        },
        if matcher.words.is_empty() {
            None
        } else {
            Some(match_words(matcher, ctx))
        },
        if matcher.regex.is_empty() {
            None
        } else {
            Some(match_regex(matcher, ctx))
        },
        if matcher.status.is_empty() {
            None
        } else {
            Some(match_status(matcher, ctx))
        },
    ];

    for clause in clauses.into_iter().flatten() {
        has_clauses = true;
        if condition == "and" {
            if !clause {
                // AND：一个失败即失败
                return matcher.negative;
            }
            composite = true;
        } else {
            if clause {
                // OR：一个命中即命中
                return !matcher.negative;
            }
        }
    }

    // 没有任何子句的匹配器不命中，negative也不翻转
    if !has_clauses {
        return false;
    }

    composite != matcher.negative
}

fn match_favicon(matcher: &Matcher, ctx: &ResponseContext) -> bool {
    let hash = match ctx.favicon_hash() {
        Some(hash) => hash,
        None => return false,
    };

    matcher
        .favicon_hash
        .iter()
        .any(|h| h.eq_ignore_ascii_case(hash))
}

fn match_words(matcher: &Matcher, ctx: &ResponseContext) -> bool {
    let part = resolved_part(matcher, ctx);
    let content = match ctx.view(&part) {
        Some(content) => content,
        None => return false,
    };

    // words数组在加载期已转小写，这里只处理内容
    let content = if matcher.case_insensitive {
        content.to_lowercase()
    } else {
        content
    };

    if matcher.match_all {
        matcher.words.iter().all(|w| content.contains(w.as_str()))
    } else {
        matcher.words.iter().any(|w| content.contains(w.as_str()))
    }
}

fn match_regex(matcher: &Matcher, ctx: &ResponseContext) -> bool {
    let part = resolved_part(matcher, ctx);
    let content = match ctx.view(&part) {
        Some(content) => content,
        None => return false,
    };

    let mut matched_any = false;
    let mut matched_all = true;
    let mut compiled_any = false;

    for pattern in &matcher.regex {
        let pattern = if matcher.case_insensitive {
            format!("(?i){}", pattern)
        } else {
            pattern.clone()
        };

        let regex = match compile_cached(&pattern) {
            Some(regex) => regex,
            None => continue, // 编译失败静默跳过该模式
        };
        compiled_any = true;

        if regex.is_match(&content) {
            matched_any = true;
            if !matcher.match_all {
                return true;
            }
        } else {
            matched_all = false;
        }
    }

    if !compiled_any {
        return false;
    }

    if matcher.match_all {
        matched_all
    } else {
        matched_any
    }
}

fn match_status(matcher: &Matcher, ctx: &ResponseContext) -> bool {
    match ctx.status() {
        Some(status) => matcher.status.contains(&status),
        None => false,
    }
}

fn resolved_part(matcher: &Matcher, ctx: &ResponseContext) -> String {
    let part = matcher.part.trim().to_lowercase();
    if part.is_empty() {
        ctx.default_part().to_string()
    } else {
        part
    }
}

/// 规则级判定：任一匹配器命中即认为指纹命中，返回命中的匹配器用于计算置信度
pub fn matching_matchers_http<'a>(
    matchers: &'a [Matcher],
    resp: &HttpResponse,
) -> Vec<&'a Matcher> {
    matchers
        .iter()
        .filter(|m| is_matcher_hit_http(m, resp))
        .collect()
}

pub fn matching_matchers_tcp<'a>(matchers: &'a [Matcher], resp: &TcpResponse) -> Vec<&'a Matcher> {
    matchers
        .iter()
        .filter(|m| is_matcher_hit_tcp(m, resp))
        .collect()
}

// 逐行提取：返回第一个捕获组，没有分组时返回整个匹配
fn extract_from_content(extractor: &Extractor, content: &str) -> Option<String> {
    match extractor.extractor_type.as_str() {
        "regex" => {
            for pattern in &extractor.regex {
                let regex = match compile_cached(pattern) {
                    Some(regex) => regex,
                    None => continue,
                };

                for line in content.split('\n') {
                    let line = line.trim_end_matches('\r');
                    if let Some(caps) = regex.captures(line) {
                        if let Some(group) = caps.get(1) {
                            return Some(group.as_str().to_string());
                        }
                        return Some(caps.get(0).unwrap().as_str().to_string());
                    }
                }
            }
            None
        }
        "word" => {
            // word类型提取器：regex字段的第一个元素作为关键字
            let word = extractor.regex.first()?;
            if content.contains(word.as_str()) {
                Some(word.clone())
            } else {
                None
            }
        }
        _ => None,
    }
}

/// 从HTTP响应体提取命名属性
pub fn extract_http(extractor: &Extractor, resp: &HttpResponse) -> Option<String> {
    extract_from_content(extractor, &resp.body)
}

/// 从TCP响应提取命名属性
pub fn extract_tcp(extractor: &Extractor, resp: &TcpResponse) -> Option<String> {
    extract_from_content(extractor, &resp.response)
}
