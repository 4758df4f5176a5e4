//! 商品链接识别与 item_id 解析。

use regex::Regex;
use std::sync::OnceLock;

static RE_URL: OnceLock<Regex> = OnceLock::new();
static RE_MARKET: OnceLock<Regex> = OnceLock::new();
static RE_ITEM: OnceLock<Regex> = OnceLock::new();

fn re_url() -> &'static Regex {
    RE_URL.get_or_init(|| Regex::new(r"https?://\S+").expect("compile RE_URL"))
}

fn re_market() -> &'static Regex {
    RE_MARKET.get_or_init(|| Regex::new(r"(?i)vinted\.[a-z.]+").expect("compile RE_MARKET"))
}

fn re_item() -> &'static Regex {
    RE_ITEM.get_or_init(|| Regex::new(r"/items/(\d+)").expect("compile RE_ITEM"))
}

/// 文本里是否含有 Vinted 域名（不要求是完整 URL）。
pub fn looks_like_market_link(input: &str) -> bool {
    re_market().is_match(input)
}

/// 从一段粘贴文本中提取第一个 Vinted 链接；没有 `http(s)://` 前缀但含域名时原样返回。
pub fn extract_link(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    // If user pasted extra text around the URL, try to extract URL first.
    if let Some(m) = re_url()
        .find_iter(trimmed)
        .find(|m| looks_like_market_link(m.as_str()))
    {
        return Some(clean_link(m.as_str()));
    }

    if looks_like_market_link(trimmed) && !trimmed.contains(char::is_whitespace) {
        return Some(clean_link(trimmed));
    }

    None
}

/// 一次粘贴可能包含多个链接（换行/空格分隔），逐个提取并保持顺序。
pub fn extract_links(input: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in input.split_whitespace() {
        if let Some(link) = extract_link(token)
            && !out.contains(&link)
        {
            out.push(link);
        }
    }
    out
}

/// 商品页链接里的数字 ID，例如 `https://www.vinted.it/items/123456-maglia` → `123456`。
pub fn parse_item_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Some(trimmed.to_string());
    }
    re_item()
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// 去重用的键：优先数字 ID，否则退回到规范化后的整条链接。
pub fn tracking_key(link: &str) -> String {
    match parse_item_id(link) {
        Some(id) => id,
        None => format!("url:{}", clean_link(link)),
    }
}

fn clean_link(raw: &str) -> String {
    let mut s = raw
        .trim()
        .trim_end_matches(['"', '\'', ')', ']', '>', ',', ';'])
        .to_string();
    if let Some(idx) = s.find('#') {
        s.truncate(idx);
    }
    while s.ends_with('/') {
        s.pop();
    }
    s
}
