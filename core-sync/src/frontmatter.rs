//! Front-matter patching for append-merged documents.
//!
//! An appended delta adds snips to a document whose header was rendered
//! during an earlier run, so the running count in the header goes stale.

pub const SNIP_COUNT_FIELD: &str = "snip_count";

const DELIMITER: &str = "---";

/// Rewrites `field: <value>` inside the leading `---` block.
///
/// Returns `None` when the document has no front-matter block or the block
/// has no such field.
pub fn rewrite_field(document: &str, field: &str, value: &str) -> Option<String> {
    let mut lines = document.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != DELIMITER {
        return None;
    }

    let mut out = String::with_capacity(document.len() + value.len());
    out.push_str(first);
    let mut consumed = first.len();
    let mut replaced = false;

    for line in lines {
        consumed += line.len();
        let body = line.trim_end_matches(['\n', '\r']);

        if body.trim_end() == DELIMITER {
            if !replaced {
                return None;
            }
            out.push_str(line);
            out.push_str(&document[consumed..]);
            return Some(out);
        }

        if !replaced && is_field_line(body, field) {
            let indent = &body[..body.len() - body.trim_start().len()];
            out.push_str(indent);
            out.push_str(field);
            out.push_str(": ");
            out.push_str(value);
            out.push_str(&line[body.len()..]);
            replaced = true;
        } else {
            out.push_str(line);
        }
    }

    // Unterminated block: not front matter.
    None
}

fn is_field_line(line: &str, field: &str) -> bool {
    line.trim_start()
        .strip_prefix(field)
        .map(|rest| rest.trim_start().starts_with(':'))
        .unwrap_or(false)
}

/// Updates the snip count, leaving the document untouched when it has no
/// recognizable count.
pub fn update_snip_count(document: String, total_snip_count: u64) -> String {
    rewrite_field(&document, SNIP_COUNT_FIELD, &total_snip_count.to_string()).unwrap_or(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_count_in_front_matter() {
        let doc = "---\ntitle: Pilot\nsnip_count: 2\n---\n# Pilot\nsnip_count: 2\n";
        let updated = update_snip_count(doc.to_string(), 5);
        assert_eq!(
            updated,
            "---\ntitle: Pilot\nsnip_count: 5\n---\n# Pilot\nsnip_count: 2\n"
        );
    }

    #[test]
    fn test_preserves_crlf_and_indent() {
        let doc = "---\r\n  snip_count:  3\r\n---\r\nbody";
        assert_eq!(
            rewrite_field(doc, SNIP_COUNT_FIELD, "4").unwrap(),
            "---\r\n  snip_count: 4\r\n---\r\nbody"
        );
    }

    #[test]
    fn test_no_front_matter_is_noop() {
        let doc = "# Title\nsnip_count: 2\n".to_string();
        assert_eq!(update_snip_count(doc.clone(), 9), doc);
    }

    #[test]
    fn test_block_without_field_is_noop() {
        let doc = "---\ntitle: x\n---\nbody".to_string();
        assert_eq!(update_snip_count(doc.clone(), 9), doc);
    }

    #[test]
    fn test_unterminated_block_is_noop() {
        let doc = "---\nsnip_count: 1\nbody".to_string();
        assert_eq!(update_snip_count(doc.clone(), 9), doc);
    }

    #[test]
    fn test_similar_prefix_is_not_the_field() {
        let doc = "---\nsnip_count_total: 1\n---\n".to_string();
        assert_eq!(update_snip_count(doc.clone(), 9), doc);
    }
}
