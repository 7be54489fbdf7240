//! # Entity Decoding
//!
//! Turns per-token IOB tag predictions into entity spans with a single
//! left-to-right pass. A span is opened by a begin tag and extended only by
//! inside tags of the same kind; anything else closes it.

use std::collections::BTreeMap;

use crate::tags::{EntityKind, Tag};

/// Decoded surface texts grouped by entity kind.
pub type Entities = BTreeMap<EntityKind, Vec<String>>;

/// Sub-word continuation marker used by WordPiece vocabularies.
const CONTINUATION_MARKER: &str = "##";

/// A decoded entity with token indices (`end` is exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: EntityKind,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Open { kind: EntityKind, start: usize },
}

/// Decode aligned tokens and tag ids into positional spans.
///
/// Tag ids outside the tag vocabulary count as `O`. When the two slices
/// differ in length only the common prefix is decoded.
pub fn decode_spans<S: AsRef<str>>(tokens: &[S], tag_ids: &[usize]) -> Vec<Span> {
    let len = tokens.len().min(tag_ids.len());
    let tokens = &tokens[..len];
    let mut spans = Vec::new();
    let mut state = State::Idle;

    let close = |state: State, end: usize, spans: &mut Vec<Span>| {
        if let State::Open { kind, start } = state {
            spans.push(Span {
                kind,
                start,
                end,
                text: join_tokens(&tokens[start..end]),
            });
        }
    };

    for (i, &id) in tag_ids[..len].iter().enumerate() {
        state = match Tag::from_index_or_outside(id) {
            Tag::Begin(kind) => {
                close(state, i, &mut spans);
                State::Open { kind, start: i }
            }
            Tag::Inside(kind) => match state {
                State::Open { kind: open, .. } if open == kind => state,
                _ => {
                    close(state, i, &mut spans);
                    State::Idle
                }
            },
            Tag::Outside => {
                close(state, i, &mut spans);
                State::Idle
            }
        };
    }
    close(state, len, &mut spans);

    spans
}

/// Decode aligned tokens and tag ids into surface texts grouped by kind.
///
/// Kinds with no span are absent from the map.
pub fn decode<S: AsRef<str>>(tokens: &[S], tag_ids: &[usize]) -> Entities {
    let mut entities = Entities::new();
    for span in decode_spans(tokens, tag_ids) {
        entities.entry(span.kind).or_default().push(span.text);
    }
    entities
}

/// Join sub-word tokens back into surface text.
///
/// Continuation markers are stripped and units are concatenated without
/// separators.
pub fn join_tokens<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| {
            let t = t.as_ref();
            t.strip_prefix(CONTINUATION_MARKER).unwrap_or(t)
        })
        .collect()
}
