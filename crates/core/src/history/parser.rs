//! Parser for the Plastic changeset history XML export.
//!
//! The export is a root element with `<Changeset>` children. Items inside
//! `<Changes>` repeat several changeset-level element names (`Branch`,
//! `Owner`, `Date`), so changeset fields are always read with the
//! `<Changes>` block cut out.

use tracing::{debug, warn};

use super::History;
use crate::errors::HistoryError;
use crate::models::{ChangeKind, Changeset, FileChange};

/// Parse a full history document into a validated, ordered [`History`].
pub fn parse_history(xml: &str) -> Result<History, HistoryError> {
    debug!("parsing history XML ({} bytes)", xml.len());
    check_well_formed(xml)?;

    let blocks = element_blocks(xml, "Changeset");
    if blocks.is_empty() {
        warn!("history export contains no <Changeset> elements");
    }

    let changesets = blocks
        .iter()
        .enumerate()
        .map(|(pos, block)| parse_changeset(block, pos + 1))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(count = changesets.len(), "parsed changesets");
    History::new(changesets)
}

fn parse_changeset(block: &str, position: usize) -> Result<Changeset, HistoryError> {
    let header = without_element(block, "Changes");

    let label = format!("#{}", position);
    let id_text = required_field(&header, "ChangesetId", &label)?;
    let id = id_text
        .parse::<i64>()
        .map_err(|e| HistoryError::InvalidField {
            changeset: label,
            field: "ChangesetId".into(),
            detail: format!("'{}': {}", id_text, e),
        })?;

    let label = format!("cs:{}", id);
    let branch = required_field(&header, "Branch", &label)?;
    let timestamp = required_field(&header, "Date", &label)?;
    let comment = extract_tag_content(&header, "Comment").unwrap_or_default();
    let owner = extract_tag_content(&header, "Owner")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let changes = match element_blocks(block, "Changes").first() {
        Some(changes_block) => element_blocks(changes_block, "Item")
            .iter()
            .map(|item| parse_item(item, &label))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(Changeset {
        id,
        branch,
        comment,
        owner,
        timestamp,
        changes,
    })
}

fn parse_item(item: &str, label: &str) -> Result<FileChange, HistoryError> {
    let type_text = required_field(item, "Type", label)?;
    let kind = ChangeKind::from_str_val(&type_text).ok_or_else(|| HistoryError::InvalidField {
        changeset: label.to_string(),
        field: "Type".into(),
        detail: format!("unknown change type '{}'", type_text),
    })?;

    let dst_path = required_field(item, "DstCmPath", label)?;
    let src_path = match kind {
        ChangeKind::Moved => Some(required_field(item, "SrcCmPath", label)?),
        _ => None,
    };

    Ok(FileChange {
        kind,
        src_path,
        dst_path,
    })
}

/// Trimmed, non-empty content of `tag`, or `MissingField`.
fn required_field(xml: &str, tag: &str, label: &str) -> Result<String, HistoryError> {
    extract_tag_content(xml, tag)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HistoryError::MissingField {
            changeset: label.to_string(),
            field: tag.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Element scanning
// ---------------------------------------------------------------------------

struct OpenTag {
    start: usize,
    content_start: usize,
    self_closing: bool,
}

/// Find the next `<tag ...>` at or after `from`, matching the name exactly.
fn find_open_tag(xml: &str, tag: &str, from: usize) -> Option<OpenTag> {
    let open = format!("<{}", tag);
    let mut search_from = from;
    while let Some(rel_pos) = xml[search_from..].find(&open) {
        let start = search_from + rel_pos;
        let after_open = &xml[start + open.len()..];
        // Next char must end the name, otherwise <ChangesetId> would match <Changeset>.
        match after_open.chars().next() {
            Some(ch) if ch == '>' || ch == '/' || ch.is_ascii_whitespace() => {}
            _ => {
                search_from = start + open.len();
                continue;
            }
        }
        let gt = after_open.find('>')?;
        return Some(OpenTag {
            start,
            content_start: start + open.len() + gt + 1,
            self_closing: after_open[..gt].ends_with('/'),
        });
    }
    None
}

/// Raw inner content of every non-nested `<tag>` element, in document order.
fn element_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let close = format!("</{}>", tag);
    let mut blocks = Vec::new();
    let mut pos = 0;
    while let Some(open) = find_open_tag(xml, tag, pos) {
        if open.self_closing {
            blocks.push("");
            pos = open.content_start;
            continue;
        }
        match xml[open.content_start..].find(&close) {
            Some(end) => {
                blocks.push(&xml[open.content_start..open.content_start + end]);
                pos = open.content_start + end + close.len();
            }
            None => break,
        }
    }
    blocks
}

/// Decoded content of the first `<tag>` element.
fn extract_tag_content(xml: &str, tag: &str) -> Option<String> {
    element_blocks(xml, tag).first().map(|raw| decode_text(raw))
}

/// `xml` with the first `<tag>` element (and its content) removed.
fn without_element(xml: &str, tag: &str) -> String {
    let Some(open) = find_open_tag(xml, tag, 0) else {
        return xml.to_string();
    };
    let end = if open.self_closing {
        open.content_start
    } else {
        let close = format!("</{}>", tag);
        match xml[open.content_start..].find(&close) {
            Some(rel) => open.content_start + rel + close.len(),
            None => xml.len(),
        }
    };
    format!("{}{}", &xml[..open.start], &xml[end..])
}

// ---------------------------------------------------------------------------
// Text decoding
// ---------------------------------------------------------------------------

/// Decode element text: CDATA sections verbatim, entities everywhere else.
fn decode_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("<![CDATA[") {
        out.push_str(&xml_unescape(&rest[..start]));
        let after = &rest[start + "<![CDATA[".len()..];
        match after.find("]]>") {
            Some(end) => {
                out.push_str(&after[..end]);
                rest = &after[end + 3..];
            }
            None => {
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(&xml_unescape(rest));
    out
}

/// Unescape the predefined XML entities and numeric character references.
fn xml_unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => {
                    if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                    } else if let Some(dec) = entity.strip_prefix('#') {
                        dec.parse::<u32>().ok().and_then(char::from_u32)
                    } else {
                        None
                    }
                }
            };
            ch.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Well-formedness
// ---------------------------------------------------------------------------

/// Tag-balance check: one root element, every open tag closed in order.
fn check_well_formed(xml: &str) -> Result<(), HistoryError> {
    let mut stack: Vec<&str> = Vec::new();
    let mut saw_root = false;
    let mut pos = 0;

    while let Some(rel) = xml[pos..].find('<') {
        let start = pos + rel;
        let tail = &xml[start..];

        let skip_to = |terminator: &str, what: &str| -> Result<usize, HistoryError> {
            tail.find(terminator)
                .map(|end| start + end + terminator.len())
                .ok_or_else(|| {
                    HistoryError::Malformed(format!("unterminated {} at byte {}", what, start))
                })
        };

        if tail.starts_with("<?") {
            pos = skip_to("?>", "processing instruction")?;
            continue;
        }
        if tail.starts_with("<!--") {
            pos = skip_to("-->", "comment")?;
            continue;
        }
        if tail.starts_with("<![CDATA[") {
            if stack.is_empty() {
                return Err(HistoryError::Malformed(format!(
                    "CDATA outside the root element at byte {}",
                    start
                )));
            }
            pos = skip_to("]]>", "CDATA section")?;
            continue;
        }
        if tail.starts_with("<!") {
            pos = skip_to(">", "declaration")?;
            continue;
        }

        let gt = tail.find('>').ok_or_else(|| {
            HistoryError::Malformed(format!("unterminated tag at byte {}", start))
        })?;
        let inner = &tail[1..gt];

        if let Some(name) = inner.strip_prefix('/') {
            let name = name.trim();
            match stack.pop() {
                Some(open) if open == name => {}
                Some(open) => {
                    return Err(HistoryError::Malformed(format!(
                        "mismatched closing tag </{}> (expected </{}>) at byte {}",
                        name, open, start
                    )));
                }
                None => {
                    return Err(HistoryError::Malformed(format!(
                        "unexpected closing tag </{}> at byte {}",
                        name, start
                    )));
                }
            }
        } else {
            let self_closing = inner.ends_with('/');
            let name = inner
                .trim_end_matches('/')
                .split(|c: char| c.is_ascii_whitespace())
                .next()
                .unwrap_or("");
            if name.is_empty() {
                return Err(HistoryError::Malformed(format!(
                    "empty tag name at byte {}",
                    start
                )));
            }
            if stack.is_empty() {
                if saw_root {
                    return Err(HistoryError::Malformed(format!(
                        "second root element <{}> at byte {}",
                        name, start
                    )));
                }
                saw_root = true;
            }
            if !self_closing {
                stack.push(name);
            }
        }
        pos = start + gt + 1;
    }

    if let Some(open) = stack.last() {
        return Err(HistoryError::Malformed(format!(
            "element <{}> is never closed",
            open
        )));
    }
    if !saw_root {
        return Err(HistoryError::Malformed("document has no root element".into()));
    }
    Ok(())
}
