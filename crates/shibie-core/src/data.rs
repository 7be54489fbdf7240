//! Data loading for tab-separated NER datasets.
//!
//! One example per line: `sentence<TAB>tag tag tag ...`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::tags::Tag;

/// A single labeled sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub sentence: String,
    /// Raw tag strings, one per character of `sentence`.
    pub tag_names: Vec<String>,
}

impl Example {
    pub fn new(sentence: impl Into<String>, tag_names: Vec<String>) -> Self {
        Self {
            sentence: sentence.into(),
            tag_names,
        }
    }

    /// Parsed tags. Unknown names become `O`.
    pub fn tags(&self) -> Vec<Tag> {
        self.tag_names
            .iter()
            .map(|name| name.parse().unwrap_or(Tag::Outside))
            .collect()
    }
}

/// Parse one dataset line, `None` for blank or malformed lines.
pub fn parse_line(line: &str) -> Option<Example> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() != 2 {
        return None;
    }

    let tag_names = parts[1].split_whitespace().map(str::to_string).collect();
    Some(Example::new(parts[0], tag_names))
}

/// Load a dataset file, skipping blank and malformed lines.
pub fn load_examples<P: AsRef<Path>>(path: P) -> Result<Vec<Example>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let mut examples = Vec::new();
    let mut skipped = 0usize;

    for line in reader.lines() {
        let line = line?;
        match parse_line(&line) {
            Some(example) => examples.push(example),
            None => skipped += 1,
        }
    }

    debug!(
        path = %path.as_ref().display(),
        loaded = examples.len(),
        skipped,
        "loaded dataset"
    );
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::EntityKind;

    #[test]
    fn test_parse_line() {
        let example = parse_line("张三在北京\tB-PER I-PER O B-LOC I-LOC").unwrap();
        assert_eq!(example.sentence, "张三在北京");
        assert_eq!(example.tag_names.len(), 5);
        assert_eq!(
            example.tags(),
            vec![
                Tag::Begin(EntityKind::Person),
                Tag::Inside(EntityKind::Person),
                Tag::Outside,
                Tag::Begin(EntityKind::Location),
                Tag::Inside(EntityKind::Location),
            ]
        );
    }

    #[test]
    fn test_skip_blank_and_malformed() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("no tab here").is_none());
        assert!(parse_line("a\tO\textra").is_none());
    }

    #[test]
    fn test_unknown_tags_are_outside() {
        let example = parse_line("你好\tB-FOO I-PER").unwrap();
        assert_eq!(example.tags(), vec![Tag::Outside, Tag::Inside(EntityKind::Person)]);
    }

    #[test]
    fn test_crlf_tolerated() {
        let example = parse_line("今天\tB-TIME I-TIME\r").unwrap();
        assert_eq!(example.tag_names, vec!["B-TIME", "I-TIME"]);
    }

    #[test]
    fn test_load_examples() {
        let path = std::env::temp_dir().join(format!("shibie-data-{}.tsv", std::process::id()));
        std::fs::write(
            &path,
            "张三\tB-PER I-PER\n\nbroken line\n今天下雨\tB-TIME I-TIME O O\n",
        )
        .unwrap();

        let examples = load_examples(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(examples.len(), 2);
        assert_eq!(examples[1].sentence, "今天下雨");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_examples("/definitely/not/here.tsv").is_err());
    }
}
