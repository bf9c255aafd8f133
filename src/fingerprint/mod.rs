// src/fingerprint/mod.rs
pub mod loader;

use serde::{Deserialize, Serialize};

pub use loader::{load_fingerprints, preprocess_fingerprints};

// 指纹的完整结构体，对应指纹库JSON的字段
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Fingerprint {
    pub id: String,
    pub info: Info,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpProbe>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp: Vec<TcpProbe>,
}

// 指纹的元数据信息
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Info {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vendor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub product: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, rename = "fofa-query", skip_serializing_if = "Vec::is_empty")]
    pub fofa_query: Vec<String>,
    #[serde(default, rename = "shodan-query", skip_serializing_if = "Vec::is_empty")]
    pub shodan_query: Vec<String>,
    #[serde(default, rename = "zoomeye-query", skip_serializing_if = "Vec::is_empty")]
    pub zoomeye_query: Vec<String>,
    /// 稀有度，越小越常见，TCP探测按此排序
    #[serde(default)]
    pub rarity: i32,
    #[serde(default)]
    pub verified: bool,
}

// 单个HTTP请求探针
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpProbe {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<Extractor>,
}

fn default_method() -> String {
    "GET".to_string()
}

// 单个TCP请求探针，name为"null"表示无服务名指纹
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpProbe {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub port: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<ProbeInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<Extractor>,
}

// 发送给TCP服务的单步输入
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProbeInput {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    /// 读取响应的字节数上限
    #[serde(default)]
    pub read: usize,
}

/// 匹配器，type取值：word、regex、status、favicon
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Matcher {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type", default)]
    pub matcher_type: String,
    /// 匹配位置：body、header、response、all或具体的头名称，默认body
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub part: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regex: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<u16>,
    /// favicon类型的图标hash列表
    #[serde(rename = "hash", default, skip_serializing_if = "Vec::is_empty")]
    pub favicon_hash: Vec<String>,
    #[serde(rename = "case-insensitive", default)]
    pub case_insensitive: bool,
    /// 匹配结果取反
    #[serde(default)]
    pub negative: bool,
    /// 子句组合关系：or命中即返回，and要求全部命中，默认or
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
    /// 多个words/regex要求全部命中
    #[serde(rename = "match-all", default)]
    pub match_all: bool,
}

impl Matcher {
    /// 判断是否为favicon匹配器（显式类型或携带hash列表）
    pub fn is_favicon(&self) -> bool {
        self.matcher_type == "favicon" || !self.favicon_hash.is_empty()
    }

    pub fn condition_or_default(&self) -> &str {
        if self.condition.is_empty() {
            "or"
        } else {
            self.condition.as_str()
        }
    }
}

/// 提取器，命中后把捕获内容写入结果details，不影响匹配结论
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Extractor {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub extractor_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regex: Vec<String>,
}
