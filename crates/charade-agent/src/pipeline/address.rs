//! Mention detection, dedup, and identity substitution.
//!
//! The recognized grammar is the platform mention element `<at id="..."/>`,
//! scanned with an explicit matcher (no regex) so the accepted literal form
//! is exact and independently testable. A leading or trailing mention token
//! classifies the message; tokens elsewhere only get rewritten.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use charade_channels::IdentityDirectory;
use charade_core::types::UserId;

const MENTION_OPEN: &str = "<at id=\"";
const MENTION_CLOSE: &str = "\"/>";

/// One mention token found in the text (byte span, half-open).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionToken {
    pub id: String,
    pub start: usize,
    pub end: usize,
}

/// Find every well-formed mention token, left to right.
pub fn scan_mentions(text: &str) -> Vec<MentionToken> {
    let mut tokens = Vec::new();
    let mut at = 0;
    while let Some(rel) = text[at..].find(MENTION_OPEN) {
        let start = at + rel;
        let id_start = start + MENTION_OPEN.len();
        let Some(id_len) = text[id_start..].find('"') else {
            break;
        };
        let id_end = id_start + id_len;
        if text[id_end..].starts_with(MENTION_CLOSE) {
            let end = id_end + MENTION_CLOSE.len();
            tokens.push(MentionToken {
                id: text[id_start..id_end].to_string(),
                start,
                end,
            });
            at = end;
        } else {
            // Malformed element; resume after the opening marker.
            at = id_start;
        }
    }
    tokens
}

/// How a message is directed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingKind {
    Unaddressed,
    ToSelf,
    ToOther,
}

/// Classify trimmed message text by its leading-or-trailing mention token.
pub fn classify(text: &str, self_id: &str) -> AddressingKind {
    let tokens = scan_mentions(text);
    match addressing_token(text, &tokens) {
        Some(token) if token.id == self_id => AddressingKind::ToSelf,
        Some(_) => AddressingKind::ToOther,
        None => AddressingKind::Unaddressed,
    }
}

fn addressing_token<'a>(text: &str, tokens: &'a [MentionToken]) -> Option<&'a MentionToken> {
    tokens
        .first()
        .filter(|t| t.start == 0)
        .or_else(|| tokens.last().filter(|t| t.end == text.len()))
}

/// Result of addressing resolution for one inbound turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTurn {
    pub kind: AddressingKind,
    /// The (possibly rewritten) text to record in history.
    pub text: String,
    /// `false` → the turn is recorded but never sent to the model.
    pub completes: bool,
}

/// Classify and rewrite one trimmed inbound text.
///
/// - unaddressed: passthrough.
/// - addressed-to-self: dedup mention tokens and replace the self token
///   with a textual reference to the persona; proceeds to completion.
/// - addressed-to-other: resolve the mentioned identity, dedup, and
///   substitute display names; the turn never completes. A failed lookup
///   leaves the text unmodified (and still never completes).
pub async fn resolve(
    text: &str,
    self_id: &str,
    persona_name: &str,
    directory: &dyn IdentityDirectory,
) -> ResolvedTurn {
    let tokens = scan_mentions(text);
    let Some(addressed) = addressing_token(text, &tokens).cloned() else {
        return ResolvedTurn {
            kind: AddressingKind::Unaddressed,
            text: text.to_string(),
            completes: true,
        };
    };

    if addressed.id == self_id {
        let rewritten = dedup_and_substitute(text, &tokens, |id| {
            (id == self_id).then(|| format!("@{persona_name}"))
        });
        return ResolvedTurn {
            kind: AddressingKind::ToSelf,
            text: rewritten,
            completes: true,
        };
    }

    // Addressed to another member: the addressed identity must resolve for
    // any rewriting to happen at all.
    let mut names: HashMap<String, String> = HashMap::new();
    match directory.resolve(&UserId::from(addressed.id.clone())).await {
        Ok(identity) => {
            names.insert(addressed.id.clone(), identity.display_name);
        }
        Err(e) => {
            debug!(user = %addressed.id, error = %e, "identity lookup failed; leaving mention unresolved");
            return ResolvedTurn {
                kind: AddressingKind::ToOther,
                text: text.to_string(),
                completes: false,
            };
        }
    }

    // Remaining distinct identities resolve best-effort; failures keep the
    // literal token.
    for token in &tokens {
        if !names.contains_key(&token.id) {
            if let Ok(identity) = directory.resolve(&UserId::from(token.id.clone())).await {
                names.insert(token.id.clone(), identity.display_name);
            }
        }
    }

    let rewritten = dedup_and_substitute(text, &tokens, |id| {
        names.get(id).map(|name| format!("@{name}"))
    });
    ResolvedTurn {
        kind: AddressingKind::ToOther,
        text: rewritten,
        completes: false,
    }
}

/// Rebuild `text` keeping the first occurrence of each distinct mention,
/// dropping repeats, and substituting via `subst` (None keeps the literal
/// token).
fn dedup_and_substitute<F>(text: &str, tokens: &[MentionToken], subst: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut seen: HashSet<&str> = HashSet::new();
    let mut cursor = 0;
    for token in tokens {
        out.push_str(&text[cursor..token.start]);
        cursor = token.end;
        if !seen.insert(token.id.as_str()) {
            continue; // repeat of an already-kept identity
        }
        match subst(&token.id) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(&text[token.start..token.end]),
        }
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use charade_channels::{Identity, IdentityError};

    struct StaticDirectory {
        entries: HashMap<String, String>,
    }

    impl StaticDirectory {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                entries: entries
                    .iter()
                    .map(|(id, name)| (id.to_string(), name.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl IdentityDirectory for StaticDirectory {
        async fn resolve(&self, user_id: &UserId) -> Result<Identity, IdentityError> {
            self.entries
                .get(user_id.as_str())
                .map(|name| Identity {
                    id: user_id.clone(),
                    display_name: name.clone(),
                })
                .ok_or_else(|| IdentityError::NotFound(user_id.to_string()))
        }
    }

    #[test]
    fn scan_finds_tokens_in_order() {
        let text = "<at id=\"1\"/>你好<at id=\"2\"/>";
        let tokens = scan_mentions(text);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].id, "1");
        assert_eq!(tokens[0].start, 0);
        assert_eq!(tokens[1].id, "2");
        assert_eq!(tokens[1].end, text.len());
    }

    #[test]
    fn malformed_tokens_are_not_matched() {
        assert!(scan_mentions("<at id=\"1\">你好").is_empty());
        assert!(scan_mentions("<at id=1/>你好").is_empty());
    }

    #[test]
    fn classify_leading_and_trailing() {
        assert_eq!(classify("<at id=\"me\"/>早", "me"), AddressingKind::ToSelf);
        assert_eq!(classify("早<at id=\"me\"/>", "me"), AddressingKind::ToSelf);
        assert_eq!(classify("<at id=\"u2\"/>早", "me"), AddressingKind::ToOther);
        assert_eq!(classify("早啊", "me"), AddressingKind::Unaddressed);
        // A token in the middle does not address anyone.
        assert_eq!(classify("早<at id=\"me\"/>啊", "me"), AddressingKind::Unaddressed);
    }

    #[tokio::test]
    async fn repeated_mentions_dedup_to_first_occurrence() {
        let dir = StaticDirectory::new(&[("a", "阿甲"), ("b", "阿乙")]);
        let text = "<at id=\"a\"/>和<at id=\"b\"/>还有<at id=\"a\"/>来";
        let resolved = resolve(text, "me", "小明", &dir).await;
        assert_eq!(resolved.kind, AddressingKind::ToOther);
        assert!(!resolved.completes);
        assert_eq!(resolved.text, "@阿甲和@阿乙还有来");
    }

    #[tokio::test]
    async fn self_mention_becomes_persona_reference() {
        let dir = StaticDirectory::new(&[]);
        let resolved = resolve("<at id=\"me\"/>在吗", "me", "小明", &dir).await;
        assert_eq!(resolved.kind, AddressingKind::ToSelf);
        assert!(resolved.completes);
        assert_eq!(resolved.text, "@小明在吗");
    }

    #[tokio::test]
    async fn failed_lookup_leaves_text_unmodified() {
        let dir = StaticDirectory::new(&[]);
        let text = "<at id=\"ghost\"/>喂";
        let resolved = resolve(text, "me", "小明", &dir).await;
        assert_eq!(resolved.kind, AddressingKind::ToOther);
        assert!(!resolved.completes);
        assert_eq!(resolved.text, text);
    }

    #[tokio::test]
    async fn unaddressed_passes_through() {
        let dir = StaticDirectory::new(&[]);
        let resolved = resolve("今天真热", "me", "小明", &dir).await;
        assert_eq!(resolved.kind, AddressingKind::Unaddressed);
        assert!(resolved.completes);
        assert_eq!(resolved.text, "今天真热");
    }
}
