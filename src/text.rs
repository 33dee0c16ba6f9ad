//! Message bodies and blob pagination.

use serde::{Deserialize, Serialize};

/// Room kept for the " (Page i of n)" label suffix when budgeting a page.
const PAGE_LABEL_RESERVE: usize = " (Page 999 of 999)".len();

/// Fixed markup wrapped around every page.
const BLOB_OPEN: &str = "<a href=\"text://";
const BLOB_MID: &str = "\">";
const BLOB_CLOSE: &str = "</a>";

/// A long-form message: a short title with a body too large for one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBlob {
    pub title: String,
    pub body: String,
}

impl ChatBlob {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Payload of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum MessageBody {
    Text(String),
    Blob(ChatBlob),
}

impl From<&str> for MessageBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<ChatBlob> for MessageBody {
    fn from(blob: ChatBlob) -> Self {
        Self::Blob(blob)
    }
}

/// Split `blob` into pages of at most `max_page_length` bytes each.
///
/// Pages break on newlines where possible, then on spaces. A page is rendered
/// as a blob link labelled with the title, plus "(Page i of n)" when there is
/// more than one.
pub fn paginate(blob: &ChatBlob, max_page_length: usize) -> Vec<String> {
    let overhead = BLOB_OPEN.len()
        + BLOB_MID.len()
        + BLOB_CLOSE.len()
        + blob.title.len()
        + PAGE_LABEL_RESERVE;
    let budget = max_page_length.saturating_sub(overhead).max(1);

    let chunks = split_body(&blob.body, budget);
    let total = chunks.len();

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let label = if total == 1 {
                blob.title.clone()
            } else {
                format!("{} (Page {} of {})", blob.title, i + 1, total)
            };
            format!("{BLOB_OPEN}{chunk}{BLOB_MID}{label}{BLOB_CLOSE}")
        })
        .collect()
}

fn split_body(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let limit = floor_char_boundary(remaining, max_len);
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Never split at 0, or we'd loop forever.
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Largest char boundary `<= index`, but at least one whole char.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    if i == 0 {
        text.char_indices()
            .nth(1)
            .map(|(pos, _)| pos)
            .unwrap_or(text.len())
    } else {
        i
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Page budget for title "T" is max_len - 41.
    fn lines(count: usize, width: usize) -> String {
        vec!["a".repeat(width); count].join("\n")
    }

    #[test]
    fn short_body_is_single_page_with_plain_title() {
        let pages = paginate(&ChatBlob::new("Online", "Alice, Bob"), 7500);
        assert_eq!(pages, vec!["<a href=\"text://Alice, Bob\">Online</a>"]);
    }

    #[test]
    fn splits_on_newlines() {
        let blob = ChatBlob::new("T", lines(3, 49));
        let pages = paginate(&blob, 90);
        assert_eq!(pages.len(), 3);
        assert!(pages[0].ends_with("T (Page 1 of 3)</a>"));
        assert!(pages[2].ends_with("T (Page 3 of 3)</a>"));
    }

    #[test]
    fn pages_fit_max_length() {
        let blob = ChatBlob::new("Report", lines(20, 30));
        for page in paginate(&blob, 200) {
            assert!(page.len() <= 200, "page too long: {}", page.len());
        }
    }

    #[test]
    fn splits_on_space_when_no_newline() {
        let body = format!("{} {}", "a".repeat(40), "b".repeat(40));
        let pages = paginate(&ChatBlob::new("T", body), 90);
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains(&"a".repeat(40)));
        assert!(pages[1].contains(&"b".repeat(40)));
    }

    #[test]
    fn hard_split_without_break_points() {
        let chunks = split_body(&"a".repeat(120), 50);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 20);
    }

    #[test]
    fn split_respects_char_boundaries() {
        let chunks = split_body(&"é".repeat(10), 5);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert_eq!(chunks.concat(), "é".repeat(10));
    }

    #[test]
    fn message_body_serializes_tagged() {
        let json = serde_json::to_value(MessageBody::from(ChatBlob::new("Raid", "Loot list"))).unwrap();
        assert_eq!(json["type"], "blob");
        assert_eq!(json["content"]["title"], "Raid");

        let text: MessageBody = serde_json::from_str(r#"{"type":"text","content":"hi"}"#).unwrap();
        assert_eq!(text, MessageBody::Text("hi".into()));
    }
}
