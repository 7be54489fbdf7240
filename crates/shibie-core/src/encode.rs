//! # Sentence Encoder
//!
//! Character-level encoding of labeled sentences for a BERT vocabulary.
//! Each non-whitespace character becomes one unit, so tags stay aligned
//! 1:1 with units. The sequence is wrapped in `[CLS]`/`[SEP]` and padded
//! to a fixed length.

use std::collections::HashMap;
use std::path::Path;

use tokenizers::Tokenizer as HfTokenizer;

use crate::data::Example;
use crate::error::{Result, ShibieError};
use crate::tags::Tag;

pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";
pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";

/// An example ready for batching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedExample {
    /// Surface units, without boundary markers or padding.
    pub tokens: Vec<String>,
    /// `max_len` ids: `[CLS] units [SEP] [PAD]...`.
    pub input_ids: Vec<u32>,
    /// `max_len` tag indices, `O` on markers and padding.
    pub labels: Vec<u32>,
    /// 1 on `[CLS]`, units and `[SEP]`; 0 on padding.
    pub attention_mask: Vec<u32>,
}

impl EncodedExample {
    /// Number of attended positions, markers included.
    pub fn active_len(&self) -> usize {
        self.tokens.len() + 2
    }

    /// Gold tag indices for the surface units.
    pub fn unit_labels(&self) -> Vec<usize> {
        self.labels[1..=self.tokens.len()]
            .iter()
            .map(|&l| l as usize)
            .collect()
    }
}

/// Maps sentences to fixed-length id, label and mask rows.
#[derive(Debug, Clone)]
pub struct SentenceEncoder {
    vocab: HashMap<String, u32>,
    cls_id: u32,
    sep_id: u32,
    pad_id: u32,
    unk_id: u32,
    max_len: usize,
}

impl SentenceEncoder {
    /// Build from an explicit vocabulary; it must contain the four
    /// special tokens.
    pub fn new(vocab: HashMap<String, u32>, max_len: usize) -> Result<Self> {
        if max_len < 3 {
            return Err(ShibieError::InvalidMaxLen(max_len));
        }
        let special = |token: &str| {
            vocab
                .get(token)
                .copied()
                .ok_or_else(|| ShibieError::MissingSpecialToken(token.to_string()))
        };

        Ok(Self {
            cls_id: special(CLS_TOKEN)?,
            sep_id: special(SEP_TOKEN)?,
            pad_id: special(PAD_TOKEN)?,
            unk_id: special(UNK_TOKEN)?,
            vocab,
            max_len,
        })
    }

    /// Load the vocabulary of a Hugging Face `tokenizer.json`.
    pub fn from_tokenizer_file<P: AsRef<Path>>(path: P, max_len: usize) -> Result<Self> {
        let tokenizer = HfTokenizer::from_file(path.as_ref())
            .map_err(|e| ShibieError::Tokenizer(format!("{}: {e}", path.as_ref().display())))?;
        Self::new(tokenizer.get_vocab(true), max_len)
    }

    /// Load a WordPiece `vocab.txt`, one token per line, id = line number.
    pub fn from_vocab_file<P: AsRef<Path>>(path: P, max_len: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let vocab = content
            .lines()
            .enumerate()
            .map(|(id, token)| (token.trim_end().to_string(), id as u32))
            .collect();
        Self::new(vocab, max_len)
    }

    /// Load from a model directory, preferring `tokenizer.json` over
    /// `vocab.txt`.
    pub fn from_model_dir<P: AsRef<Path>>(dir: P, max_len: usize) -> Result<Self> {
        let tokenizer = dir.as_ref().join("tokenizer.json");
        if tokenizer.exists() {
            return Self::from_tokenizer_file(tokenizer, max_len);
        }
        Self::from_vocab_file(dir.as_ref().join("vocab.txt"), max_len)
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    /// Vocabulary id for one unit: verbatim, then lowercased, then `[UNK]`.
    pub fn token_id(&self, token: &str) -> u32 {
        if let Some(&id) = self.vocab.get(token) {
            return id;
        }
        let lower = token.to_lowercase();
        self.vocab.get(&lower).copied().unwrap_or(self.unk_id)
    }

    /// Encode one example.
    ///
    /// Tags pair with characters by position; missing tags are `O` and
    /// surplus tags are dropped. Whitespace characters are removed along
    /// with their tags. Units beyond `max_len - 2` are truncated.
    pub fn encode(&self, example: &Example) -> EncodedExample {
        let tags = example.tags();
        let capacity = self.max_len - 2;

        let (tokens, unit_labels): (Vec<String>, Vec<u32>) = example
            .sentence
            .chars()
            .enumerate()
            .filter(|(_, c)| !c.is_whitespace())
            .map(|(i, c)| {
                let tag = tags.get(i).copied().unwrap_or(Tag::Outside);
                (c.to_string(), tag.index() as u32)
            })
            .take(capacity)
            .unzip();

        let outside = Tag::Outside.index() as u32;
        let mut input_ids = Vec::with_capacity(self.max_len);
        let mut labels = Vec::with_capacity(self.max_len);

        input_ids.push(self.cls_id);
        labels.push(outside);
        input_ids.extend(tokens.iter().map(|t| self.token_id(t)));
        labels.extend(unit_labels);
        input_ids.push(self.sep_id);
        labels.push(outside);

        let active = input_ids.len();
        let mut attention_mask = vec![1u32; active];

        input_ids.resize(self.max_len, self.pad_id);
        labels.resize(self.max_len, outside);
        attention_mask.resize(self.max_len, 0);

        EncodedExample {
            tokens,
            input_ids,
            labels,
            attention_mask,
        }
    }

    /// Encode every example.
    pub fn encode_all(&self, examples: &[Example]) -> Vec<EncodedExample> {
        examples.iter().map(|e| self.encode(e)).collect()
    }
}
