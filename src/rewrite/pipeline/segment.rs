//! 片段与匹配协作方
//!
//! 片段由外部的匹配器产生，不保证有序，也不保证互不重叠

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::rewrite::error::RewriteResult;

/// 匹配到的文本片段
///
/// `start_index`/`end_index` 为文本节点内容中的 UTF-8 字节偏移
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub original_text: String,
    pub converted_text: String,
    pub start_index: usize,
    pub end_index: usize,
}

impl Segment {
    pub fn new(
        original_text: impl Into<String>,
        converted_text: impl Into<String>,
        start_index: usize,
        end_index: usize,
    ) -> Self {
        Self {
            original_text: original_text.into(),
            converted_text: converted_text.into(),
            start_index,
            end_index,
        }
    }

    /// 片段长度（字节）
    pub fn len(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 片段来源：对每个合格文本节点调用一次
pub trait SegmentSource {
    fn identify_segments(&self, text: &str) -> Vec<Segment>;
}

impl<F> SegmentSource for F
where
    F: Fn(&str) -> Vec<Segment>,
{
    fn identify_segments(&self, text: &str) -> Vec<Segment> {
        self(text)
    }
}

/// 精确匹配词典
///
/// 从左到右扫描，同一位置优先匹配最长的词条，结果互不重叠。
/// 只用于命令行工具和测试，不是完整的匹配引擎。
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: HashMap<String, String>,
    /// 按长度降序排列的词条
    ordered: Vec<String>,
}

/// 词典文件格式
#[derive(Debug, Deserialize)]
struct DictionaryFile {
    #[serde(default)]
    entries: HashMap<String, String>,
}

impl Dictionary {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| !k.is_empty())
            .collect();

        let mut ordered: Vec<String> = entries.keys().cloned().collect();
        ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Self { entries, ordered }
    }

    /// 从 TOML 文本加载，格式为 `[entries]` 表
    pub fn from_toml_str(source: &str) -> RewriteResult<Self> {
        let file: DictionaryFile = toml::from_str(source)?;
        Ok(Self::new(file.entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SegmentSource for Dictionary {
    fn identify_segments(&self, text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];
            let hit = self.ordered.iter().find(|key| rest.starts_with(key.as_str()));

            match hit {
                Some(key) => {
                    let end = pos + key.len();
                    segments.push(Segment::new(
                        key.clone(),
                        self.entries[key].clone(),
                        pos,
                        end,
                    ));
                    pos = end;
                }
                None => {
                    pos += rest.chars().next().map_or(1, char::len_utf8);
                }
            }
        }

        segments
    }
}
