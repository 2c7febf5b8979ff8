//! 文本处理的公共工具函数

use std::collections::{BTreeSet, HashMap};

/// 意图发现与关键词统计时忽略的停用词
pub const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "of", "at", "by", "for", "with", "about", "to",
    "from", "in", "on", "is", "are", "was", "were", "be", "been", "am", "do", "does", "did",
    "have", "has", "had", "i", "me", "my", "you", "your", "we", "our", "it", "its", "this",
    "that", "what", "which", "who", "when", "where", "why", "how", "can", "could", "would",
    "should", "will", "there", "their", "they", "them", "so", "not", "no", "any", "all", "as",
];

/// 按非字母数字字符切分并转为小写
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// 去掉停用词与过短的词
pub fn content_words(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// 两段文本词集合的Jaccard相似度
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<String> = tokenize(a).into_iter().collect();
    let set_b: BTreeSet<String> = tokenize(b).into_iter().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

/// 词频向量
pub fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut tf = HashMap::new();
    for word in tokenize(text) {
        *tf.entry(word).or_insert(0.0) += 1.0;
    }
    tf
}

/// 词频向量的余弦相似度
pub fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(k, va)| b.get(k).map(|vb| va * vb))
        .sum();
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// 按字符（而非字节）截断
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// 按字符数切块
pub fn chunk_chars(text: &str, chunk_size: usize) -> Vec<String> {
    if chunk_size == 0 {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// 非字母数字字符替换为下划线
pub fn slugify(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// 从LLM回复中截取第一个完整的JSON对象（兼容```json代码块和前后说明文字）
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 金额格式化，如 1234.5 -> $1,234.50
pub fn format_currency(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!(
        "{}${}.{:02}",
        if negative { "-" } else { "" },
        grouped,
        cents % 100
    )
}

/// 解析 "$1,234.50" 之类的金额字符串
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_and_content_words() {
        assert_eq!(
            tokenize("What's my Policy #P1001?"),
            vec!["what", "s", "my", "policy", "p1001"]
        );
        assert_eq!(
            content_words("What is the deductible for my policy"),
            vec!["deductible", "policy"]
        );
    }

    #[test]
    fn test_jaccard_similarity() {
        assert_eq!(jaccard_similarity("flood damage", "flood damage"), 1.0);
        assert_eq!(jaccard_similarity("flood damage", "fire"), 0.0);
        assert!((jaccard_similarity("water damage", "flood damage") - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard_similarity("", ""), 0.0);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = term_frequencies("claim status claim");
        let b = term_frequencies("claim status");
        let sim = cosine_similarity(&a, &b);
        assert!(sim > 0.9 && sim < 1.0);
        assert_eq!(cosine_similarity(&a, &HashMap::new()), 0.0);
    }

    #[test]
    fn test_truncate_and_chunk_respect_chars() {
        assert_eq!(truncate_chars("保险条款abc", 3), "保险条");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(chunk_chars("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(chunk_chars("", 3), Vec::<String>::new());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Water Damage-2"), "Water_Damage_2");
    }

    #[test]
    fn test_extract_json_object() {
        let reply = "Here you go:\n```json\n{\"a\": {\"b\": \"}\"}, \"c\": 1}\n```\ntrailing";
        assert_eq!(
            extract_json_object(reply),
            Some("{\"a\": {\"b\": \"}\"}, \"c\": 1}")
        );
        assert_eq!(extract_json_object("no json"), None);
        assert_eq!(extract_json_object("{ unterminated"), None);
    }

    #[test]
    fn test_currency_round_trip() {
        assert_eq!(format_currency(1234.5), "$1,234.50");
        assert_eq!(format_currency(500.0), "$500.00");
        assert_eq!(format_currency(1_000_000.0), "$1,000,000.00");
        assert_eq!(parse_amount("$1,234.50"), Some(1234.5));
        assert_eq!(parse_amount("abc"), None);
    }
}
