// src/detector/favicon.rs
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use url::Url;

lazy_static! {
    // link rel="icon" / rel="shortcut icon"
    static ref ICON_RE: Regex = Regex::new(
        r#"<link[^>]+rel=["'](?:shortcut icon|icon)["'][^>]+href=["']([^"']+)["']"#
    ).unwrap();
    // apple-touch-icon
    static ref APPLE_ICON_RE: Regex = Regex::new(
        r#"<link[^>]+rel=["']apple-touch-icon["'][^>]+href=["']([^"']+)["']"#
    ).unwrap();
    // href在rel前面的写法
    static ref ALT_ICON_RE: Regex = Regex::new(
        r#"<link[^>]+href=["']([^"']+)["'][^>]+rel=["'](?:shortcut icon|icon)["']"#
    ).unwrap();
}

/// 计算favicon原始字节的MD5，十六进制小写
pub fn hash_favicon_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// 从HTML中提取favicon候选链接
pub fn extract_favicon_urls(html: &str) -> Vec<String> {
    let mut urls = Vec::new();

    for re in [&*ICON_RE, &*APPLE_ICON_RE, &*ALT_ICON_RE] {
        if let Some(caps) = re.captures(html) {
            if let Some(href) = caps.get(1) {
                let href = href.as_str().to_string();
                if !urls.contains(&href) {
                    urls.push(href);
                }
            }
        }
    }

    urls
}

/// 把HTML里的favicon链接解析为绝对URL
pub fn resolve_favicon_url(base_url: &str, icon_url: &str) -> String {
    if icon_url.starts_with("http") {
        return icon_url.to_string();
    }

    if let Ok(base) = Url::parse(base_url) {
        if icon_url.starts_with('/') {
            // 绝对路径：复用scheme和host
            let mut resolved = format!("{}://{}", base.scheme(), base.host_str().unwrap_or(""));
            if let Some(port) = base.port() {
                resolved.push_str(&format!(":{}", port));
            }
            resolved.push_str(icon_url);
            return resolved;
        }
    }

    // 相对路径：拼接到base后面
    if base_url.ends_with('/') {
        format!("{}{}", base_url, icon_url)
    } else {
        format!("{}/{}", base_url, icon_url)
    }
}

/// 获取目标的favicon哈希：优先解析HTML中的<link>声明，失败时回退默认路径
pub async fn fetch_favicon(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let resp = client.get(base_url).send().await?;

    if resp.status().as_u16() == 200 {
        if let Ok(html) = resp.text().await {
            for icon_url in extract_favicon_urls(&html) {
                let absolute = resolve_favicon_url(base_url, &icon_url);
                match fetch_and_hash(client, &absolute).await {
                    Ok(hash) => return Ok(hash),
                    Err(e) => debug!("Favicon candidate {} failed: {}", absolute, e),
                }
            }
        }
    }

    fetch_default_favicon(client, base_url).await
}

async fn fetch_default_favicon(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let favicon_url = if base_url.ends_with('/') {
        format!("{}favicon.ico", base_url)
    } else {
        format!("{}/favicon.ico", base_url)
    };

    fetch_and_hash(client, &favicon_url).await
}

async fn fetch_and_hash(
    client: &reqwest::Client,
    favicon_url: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let resp = client.get(favicon_url).send().await?;

    if resp.status().as_u16() != 200 {
        return Err(format!("favicon not found, status: {}", resp.status().as_u16()).into());
    }

    let data = resp.bytes().await?;
    Ok(hash_favicon_bytes(&data))
}
