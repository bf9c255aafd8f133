// src/output/html.rs
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use chrono::Local;

use crate::matcher::MatchResult;
use crate::scanner::ScanResult;

// HTML报告增量写入。文件句柄在首个结果到达时创建并一直持有，
// 之后的目标块直接追加，finalize时补筛选脚本和统计尾部
pub struct HtmlReport {
    path: std::path::PathBuf,
    file: Option<File>,
    targets: usize,
    web_matches: usize,
    tcp_matches: usize,
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// 置信度档位：high ≥0.8，medium ≥0.5，其余low
fn confidence_class(confidence: f64) -> &'static str {
    if confidence >= 0.8 {
        "high"
    } else if confidence >= 0.5 {
        "medium"
    } else {
        "low"
    }
}

const HTML_HEADER: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>fingerscan-rs report</title>
<style>
  body { font-family: "Segoe UI", Arial, sans-serif; background: #10141a; color: #d8dee9; margin: 0; padding: 24px; }
  h1 { color: #88c0d0; font-size: 22px; border-bottom: 1px solid #2e3440; padding-bottom: 8px; }
  .meta { color: #4c566a; font-size: 13px; margin-bottom: 18px; }
  .toolbar { display: flex; flex-wrap: wrap; gap: 8px; background: #161b23; border: 1px solid #2e3440; border-radius: 6px; padding: 10px 12px; margin-bottom: 14px; align-items: center; }
  .search-box { position: relative; flex: 1; min-width: 220px; }
  .search-box input { width: 100%; box-sizing: border-box; background: #1d2430; color: #d8dee9; border: 1px solid #2e3440; border-radius: 4px; padding: 6px 26px 6px 10px; font-size: 13px; }
  .search-box button { position: absolute; right: 4px; top: 4px; background: none; border: none; color: #4c566a; cursor: pointer; font-size: 14px; display: none; }
  .search-box.has-text button { display: block; }
  .toolbar select { background: #1d2430; color: #d8dee9; border: 1px solid #2e3440; border-radius: 4px; padding: 6px 8px; font-size: 13px; }
  .toolbar .count { color: #81a1c1; font-size: 13px; margin-left: auto; }
  .target-block { background: #161b23; border: 1px solid #2e3440; border-radius: 6px; margin: 16px 0; padding: 12px 16px; }
  .target-block h2 { color: #a3be8c; font-size: 17px; margin: 0 0 8px 0; }
  .section { color: #81a1c1; font-size: 13px; text-transform: uppercase; letter-spacing: 1px; margin: 10px 0 4px 0; }
  .fingerprint-card { border: 1px solid #2e3440; border-left: 3px solid #81a1c1; border-radius: 4px; background: #1a2029; padding: 8px 12px; margin: 6px 0; }
  .fingerprint-card.tcp { border-left-color: #bf616a; }
  .card-head { display: flex; align-items: center; gap: 8px; }
  .card-head .name { color: #eceff4; font-weight: 600; font-size: 14px; }
  .card-head .id { color: #4c566a; font-size: 12px; }
  .badge { display: inline-block; padding: 1px 8px; border-radius: 10px; font-size: 12px; }
  .badge.high { background: #a3be8c; color: #10141a; }
  .badge.medium { background: #ebcb8b; color: #10141a; }
  .badge.low { background: #bf616a; color: #eceff4; }
  .tag { display: inline-block; background: #1d2430; color: #88c0d0; border-radius: 3px; padding: 0 6px; margin-right: 4px; font-size: 12px; cursor: pointer; }
  .details { color: #d8dee9; font-size: 13px; margin-top: 4px; }
  .details span { color: #81a1c1; }
  .no-results { display: none; color: #ebcb8b; padding: 18px; text-align: center; }
  .footer { color: #4c566a; font-size: 12px; margin-top: 24px; border-top: 1px solid #2e3440; padding-top: 10px; }
</style>
</head>
<body>
"#;

const HTML_TOOLBAR: &str = r#"<div class="toolbar">
  <div class="search-box" id="searchBox">
    <input type="text" id="searchInput" placeholder="Search fingerprints, URLs, hosts...">
    <button id="clearSearch" type="button">&times;</button>
  </div>
  <select id="kindFilter">
    <option value="all">All kinds</option>
    <option value="web">Web</option>
    <option value="tcp">Service</option>
  </select>
  <select id="confidenceFilter">
    <option value="all">All confidence</option>
    <option value="high">High (&ge;80%)</option>
    <option value="medium">Medium (50-79%)</option>
    <option value="low">Low (&lt;50%)</option>
  </select>
  <select id="statusFilter">
    <option value="all">All status codes</option>
  </select>
  <span class="count"><span id="visibleCount">0</span>/<span id="totalCount">0</span> shown</span>
</div>
<div class="no-results" id="noResults">No fingerprints match the current filters</div>
"#;

// 筛选脚本在finalize阶段写入，对已经追加完的卡片做客户端搜索和过滤
const HTML_SCRIPT: &str = r#"<script>
document.addEventListener('DOMContentLoaded', function() {
  const cards = document.querySelectorAll('.fingerprint-card');
  const blocks = document.querySelectorAll('.target-block');
  const searchBox = document.getElementById('searchBox');
  const searchInput = document.getElementById('searchInput');
  const clearButton = document.getElementById('clearSearch');
  const kindFilter = document.getElementById('kindFilter');
  const confidenceFilter = document.getElementById('confidenceFilter');
  const statusFilter = document.getElementById('statusFilter');
  const noResults = document.getElementById('noResults');

  document.getElementById('totalCount').textContent = cards.length;

  // 状态码下拉项从卡片属性收集，升序排列
  const statusCodes = new Set();
  cards.forEach(card => {
    const status = card.getAttribute('data-status');
    if (status) {
      statusCodes.add(status);
    }
  });
  Array.from(statusCodes).sort((a, b) => parseInt(a) - parseInt(b)).forEach(code => {
    const option = document.createElement('option');
    option.value = code;
    option.textContent = code;
    statusFilter.appendChild(option);
  });

  function applyFilters() {
    const searchText = searchInput.value.toLowerCase().trim();
    const kind = kindFilter.value;
    const confidence = confidenceFilter.value;
    const status = statusFilter.value;
    let visible = 0;

    cards.forEach(card => {
      const matchesKind = kind === 'all' || card.getAttribute('data-type') === kind;
      const matchesConfidence = confidence === 'all'
        || card.getAttribute('data-confidence-level') === confidence;
      const matchesStatus = status === 'all'
        || card.getAttribute('data-status') === status;
      const matchesSearch = !searchText
        || card.textContent.toLowerCase().includes(searchText);

      const show = matchesKind && matchesConfidence && matchesStatus && matchesSearch;
      card.style.display = show ? '' : 'none';
      if (show) {
        visible++;
      }
    });

    // 目标块内没有可见卡片时整块隐藏
    blocks.forEach(block => {
      const anyVisible = Array.from(block.querySelectorAll('.fingerprint-card'))
        .some(card => card.style.display !== 'none');
      block.style.display = anyVisible ? '' : 'none';
    });

    document.getElementById('visibleCount').textContent = visible;
    noResults.style.display = visible === 0 ? 'block' : 'none';
  }

  searchInput.addEventListener('input', function() {
    if (searchInput.value) {
      searchBox.classList.add('has-text');
    } else {
      searchBox.classList.remove('has-text');
    }
    applyFilters();
  });

  clearButton.addEventListener('click', function() {
    searchInput.value = '';
    searchBox.classList.remove('has-text');
    applyFilters();
  });

  kindFilter.addEventListener('change', applyFilters);
  confidenceFilter.addEventListener('change', applyFilters);
  statusFilter.addEventListener('change', applyFilters);

  // 点击标签直接作为搜索词
  document.querySelectorAll('.tag').forEach(tag => {
    tag.addEventListener('click', function() {
      searchInput.value = tag.textContent.trim();
      searchBox.classList.add('has-text');
      applyFilters();
    });
  });

  applyFilters();
});
</script>
"#;

// 单个匹配渲染为带筛选属性的卡片
fn render_card(block: &mut String, kind: &str, matched: &MatchResult) {
    let status = matched
        .details
        .get("status_code")
        .map(|s| s.as_str())
        .unwrap_or("");

    block.push_str(&format!(
        "<div class=\"fingerprint-card {}\" data-type=\"{}\" data-fingerprint=\"{}\" data-status=\"{}\" data-confidence-level=\"{}\">\n",
        kind,
        kind,
        escape(&matched.name),
        escape(status),
        confidence_class(matched.confidence)
    ));

    block.push_str(&format!(
        "<div class=\"card-head\"><span class=\"name\">{}</span><span class=\"id\">{}</span><span class=\"badge {}\">{:.2}</span>",
        escape(&matched.name),
        escape(&matched.id),
        confidence_class(matched.confidence),
        matched.confidence
    ));
    for tag in &matched.tags {
        block.push_str(&format!("<span class=\"tag\">{}</span>", escape(tag)));
    }
    block.push_str("</div>\n");

    if !matched.details.is_empty() {
        let details: Vec<String> = matched
            .details
            .iter()
            .map(|(k, v)| format!("<span>{}</span>={}", escape(k), escape(v)))
            .collect();
        block.push_str(&format!(
            "<div class=\"details\">{}</div>\n",
            details.join(" ")
        ));
    }

    block.push_str("</div>\n");
}

impl HtmlReport {
    pub fn create(path: &Path) -> io::Result<HtmlReport> {
        Ok(HtmlReport {
            path: path.to_path_buf(),
            file: None,
            targets: 0,
            web_matches: 0,
            tcp_matches: 0,
        })
    }

    // 首个结果到达时创建文件并写入头部和筛选工具栏
    fn create_report_file(path: &Path) -> io::Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        let header = format!(
            "{}<h1>fingerscan-rs scan report</h1>\n<div class=\"meta\">Generated at {}</div>\n{}",
            HTML_HEADER,
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            HTML_TOOLBAR
        );
        file.write_all(header.as_bytes())?;
        Ok(file)
    }

    /// 追加一个目标的结果块，文件句柄保留给后续追加
    pub fn append(&mut self, result: &ScanResult) -> io::Result<()> {
        if self.file.is_none() {
            self.file = Some(Self::create_report_file(&self.path)?);
        }

        let mut block = String::new();
        block.push_str("<div class=\"target-block\">\n");
        block.push_str(&format!("<h2>{}</h2>\n", escape(&result.target)));

        for (kind, label, matches) in [
            ("web", "Web fingerprints", &result.web_results),
            ("tcp", "Service fingerprints", &result.tcp_results),
        ] {
            if matches.is_empty() {
                continue;
            }
            block.push_str(&format!("<div class=\"section\">{}</div>\n", label));
            for matched in matches {
                render_card(&mut block, kind, matched);
            }
        }

        block.push_str("</div>\n");

        if let Some(file) = self.file.as_mut() {
            file.write_all(block.as_bytes())?;
        }

        self.targets += 1;
        self.web_matches += result.web_results.len();
        self.tcp_matches += result.tcp_results.len();

        Ok(())
    }

    /// 写入筛选脚本和统计尾部。没有任何结果时不生成文件
    pub fn finalize(mut self) -> io::Result<usize> {
        if let Some(file) = self.file.as_mut() {
            let footer = format!(
                "{}<div class=\"footer\">{} target(s) &middot; {} web match(es) &middot; {} service match(es) &middot; generated by fingerscan-rs</div>\n</body>\n</html>\n",
                HTML_SCRIPT, self.targets, self.web_matches, self.tcp_matches
            );
            file.write_all(footer.as_bytes())?;
            file.flush()?;
        }
        Ok(self.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_match(confidence: f64) -> MatchResult {
        let mut details = BTreeMap::new();
        details.insert("status_code".to_string(), "200".to_string());
        details.insert("title".to_string(), "<script>x</script>".to_string());

        MatchResult {
            id: "app".to_string(),
            name: "App".to_string(),
            confidence,
            details,
            tags: vec!["web".to_string()],
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("<title>&\"x\""), "&lt;title&gt;&amp;&quot;x&quot;");
    }

    #[test]
    fn test_confidence_class() {
        assert_eq!(confidence_class(0.9), "high");
        assert_eq!(confidence_class(0.6), "medium");
        assert_eq!(confidence_class(0.2), "low");
    }

    #[test]
    fn test_card_carries_filter_attributes() {
        let mut block = String::new();
        render_card(&mut block, "web", &sample_match(0.85));

        assert!(block.contains("data-type=\"web\""));
        assert!(block.contains("data-fingerprint=\"App\""));
        assert!(block.contains("data-status=\"200\""));
        assert!(block.contains("data-confidence-level=\"high\""));
        assert!(block.contains("badge high"));
    }

    #[test]
    fn test_card_escapes_details() {
        let mut block = String::new();
        render_card(&mut block, "tcp", &sample_match(0.3));
        assert!(block.contains("&lt;script&gt;"));
        assert!(!block.contains("<script>x"));
        assert!(block.contains("data-confidence-level=\"low\""));
    }

    #[test]
    fn test_toolbar_and_script_are_wired() {
        // 工具栏元素的id必须与脚本引用一致
        for id in [
            "searchInput",
            "clearSearch",
            "kindFilter",
            "confidenceFilter",
            "statusFilter",
            "noResults",
            "visibleCount",
            "totalCount",
        ] {
            assert!(HTML_TOOLBAR.contains(id), "toolbar missing {}", id);
            assert!(HTML_SCRIPT.contains(id), "script missing {}", id);
        }
        assert!(HTML_SCRIPT.contains("addEventListener"));
        assert!(HTML_SCRIPT.contains("applyFilters"));
    }
}
