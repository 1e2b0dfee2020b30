//! Model label set plus the dangerous and ignore lists keyed by class index.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Immutable label lookup handed to the decoder and classifier.
#[derive(Clone, Debug, Default)]
pub struct LabelSet {
    labels: Vec<String>,
    dangerous: HashMap<usize, String>,
    ignored: HashMap<usize, String>,
}

impl LabelSet {
    /// Build index maps by exact lookup of each listed label in `labels`.
    /// Listed names that the model does not know are dropped.
    pub fn new(labels: Vec<String>, dangerous: &[String], ignored: &[String]) -> Self {
        let dangerous = index_by_label(&labels, dangerous);
        let ignored = index_by_label(&labels, ignored);
        Self {
            labels,
            dangerous,
            ignored,
        }
    }

    /// Parse newline-delimited label assets. Carriage returns from assets
    /// edited on other platforms are stripped so lookups still match.
    pub fn from_newline_lists(labels: &str, dangerous: &str, ignored: Option<&str>) -> Self {
        let ignored = ignored.map(split_lines).unwrap_or_default();
        Self::new(split_lines(labels), &split_lines(dangerous), &ignored)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Raw label for a class index, if the model knows it.
    pub fn name(&self, class_index: i32) -> Option<&str> {
        usize::try_from(class_index)
            .ok()
            .and_then(|idx| self.labels.get(idx))
            .map(String::as_str)
    }

    pub fn is_dangerous(&self, class_index: i32) -> bool {
        usize::try_from(class_index).is_ok_and(|idx| self.dangerous.contains_key(&idx))
    }

    pub fn is_ignored(&self, class_index: i32) -> bool {
        usize::try_from(class_index).is_ok_and(|idx| self.ignored.contains_key(&idx))
    }

    pub fn dangerous_count(&self) -> usize {
        self.dangerous.len()
    }

    pub fn ignored_count(&self) -> usize {
        self.ignored.len()
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

fn index_by_label(labels: &[String], wanted: &[String]) -> HashMap<usize, String> {
    let mut map = HashMap::new();
    for name in wanted {
        if name.is_empty() {
            continue;
        }
        if let Some(idx) = labels.iter().position(|label| label == name) {
            map.entry(idx).or_insert_with(|| name.clone());
        }
    }
    map
}

/// Make a label safe for display and logs: trim, then replace every
/// whitespace or control character with `_`.
pub fn sanitize_label(raw: &str) -> String {
    static UNSAFE_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = UNSAFE_RE.get_or_init(|| {
        regex::Regex::new(r"[\s\p{Cc}]").expect("static label pattern is valid")
    });
    re.replace_all(raw.trim(), "_").into_owned()
}
