use serde::Deserialize;

use crate::raster::OutputFormat;

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<Job>,
}

impl JobFile {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::ExtractError::config(format!("Failed to parse job YAML: {e}"))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub input: String,
    /// 出力ディレクトリ
    pub output: String,
    /// 省略時は全ページ
    #[serde(default, deserialize_with = "deserialize_pages")]
    pub pages: Option<Vec<u32>>,
    pub pass_through_extensions: Option<Vec<String>>,
    pub alpha_format: Option<OutputFormat>,
    pub opaque_format: Option<OutputFormat>,
    pub write_manifest: Option<bool>,
}

/// ページ範囲文字列をパースしてページ番号のベクタに変換する。
///
/// 形式:
/// - 単一ページ: `"5"`
/// - 範囲: `"5-10"` (5, 6, 7, 8, 9, 10)
/// - 混合（カンマ区切り）: `"1, 3, 5-10, 15"`
///
/// 結果はソート済み・重複なし。
pub fn parse_page_range(s: &str) -> crate::error::Result<Vec<u32>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(crate::error::ExtractError::config(
            "Page range cannot be empty",
        ));
    }

    let mut pages = Vec::new();

    for part in trimmed.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start_str, end_str)) = part.split_once('-') {
            let start = parse_page_number(start_str)?;
            let end = parse_page_number(end_str)?;

            if start > end {
                return Err(crate::error::ExtractError::config(format!(
                    "Invalid page range: start ({start}) > end ({end})"
                )));
            }

            pages.extend(start..=end);
        } else {
            pages.push(parse_page_number(part)?);
        }
    }

    if pages.is_empty() {
        return Err(crate::error::ExtractError::config(
            "Page range resolved to empty set",
        ));
    }

    pages.sort();
    pages.dedup();
    Ok(pages)
}

/// 1始まりのページ番号
fn parse_page_number(s: &str) -> crate::error::Result<u32> {
    let s = s.trim();
    match s.parse::<u32>() {
        Ok(0) => Err(crate::error::ExtractError::config(
            "Page numbers start at 1",
        )),
        Ok(n) => Ok(n),
        Err(_) => Err(crate::error::ExtractError::config(format!(
            "Invalid page number: '{s}'"
        ))),
    }
}

/// serdeのdeserialize_withで使用するページ範囲デシリアライザ
fn deserialize_pages<'de, D>(deserializer: D) -> Result<Option<Vec<u32>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| parse_page_range(&s))
        .transpose()
        .map_err(serde::de::Error::custom)
}
