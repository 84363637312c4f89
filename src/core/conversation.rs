//! Conversation records, recency grouping for the conversation list, and
//! title derivation from a first message.

use chrono::{DateTime, Days, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

use crate::api::ConversationRecord;

pub const DEFAULT_CONVERSATION_TITLE: &str = "Nova Conversa";
const MAX_TITLE_GRAPHEMES: usize = 50;
const TRUNCATED_TITLE_GRAPHEMES: usize = 47;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub user_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    /// Accept a store row only when every required column is present.
    pub fn from_record(record: ConversationRecord) -> Option<Self> {
        match record {
            ConversationRecord {
                id: Some(id),
                title: Some(title),
                user_id,
                created_at: Some(created_at),
                updated_at: Some(updated_at),
            } if !title.is_empty() => Some(Self {
                id,
                title,
                user_id,
                created_at,
                updated_at,
            }),
            other => {
                warn!(record = ?other, "Dropping invalid conversation row");
                None
            }
        }
    }

    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.updated_at)
    }
}

/// Parse an RFC 3339 timestamp. Offset-less values are read as UTC, which is
/// what the store emits for `timestamp without time zone` columns.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecencyBucket {
    Today,
    Yesterday,
    LastSevenDays,
    LastThirtyDays,
    Older,
}

impl RecencyBucket {
    pub const ALL: [RecencyBucket; 5] = [
        RecencyBucket::Today,
        RecencyBucket::Yesterday,
        RecencyBucket::LastSevenDays,
        RecencyBucket::LastThirtyDays,
        RecencyBucket::Older,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RecencyBucket::Today => "Today",
            RecencyBucket::Yesterday => "Yesterday",
            RecencyBucket::LastSevenDays => "Last 7 days",
            RecencyBucket::LastThirtyDays => "Last 30 days",
            RecencyBucket::Older => "Older",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationGroup<'a> {
    pub bucket: RecencyBucket,
    pub conversations: Vec<&'a Conversation>,
}

/// Classify a timestamp against local-midnight boundaries in `now`'s zone.
/// Missing timestamps land in `Older`.
pub fn bucket_for<Tz: TimeZone>(updated_at: Option<DateTime<Utc>>, now: &DateTime<Tz>) -> RecencyBucket {
    let Some(updated_at) = updated_at else {
        return RecencyBucket::Older;
    };

    let today = now.date_naive();
    let date = updated_at.with_timezone(&now.timezone()).date_naive();

    let days_back = |n: u64| today.checked_sub_days(Days::new(n));

    if date >= today {
        RecencyBucket::Today
    } else if Some(date) == days_back(1) {
        RecencyBucket::Yesterday
    } else if days_back(7).is_some_and(|boundary| date >= boundary) {
        RecencyBucket::LastSevenDays
    } else if days_back(30).is_some_and(|boundary| date >= boundary) {
        RecencyBucket::LastThirtyDays
    } else {
        RecencyBucket::Older
    }
}

/// Partition conversations into recency buckets. Bucket order is fixed, empty
/// buckets are omitted, and order inside a bucket follows the input.
pub fn group_by_recency<'a, Tz: TimeZone>(
    conversations: &'a [Conversation],
    now: &DateTime<Tz>,
) -> Vec<ConversationGroup<'a>> {
    let mut groups: Vec<ConversationGroup<'a>> = RecencyBucket::ALL
        .iter()
        .map(|bucket| ConversationGroup {
            bucket: *bucket,
            conversations: Vec::new(),
        })
        .collect();

    for conversation in conversations {
        let bucket = bucket_for(conversation.updated_at_utc(), now);
        if let Some(group) = groups.iter_mut().find(|group| group.bucket == bucket) {
            group.conversations.push(conversation);
        }
    }

    groups.retain(|group| !group.conversations.is_empty());
    groups
}

struct TitlePattern {
    prefixes: &'static [&'static str],
    lead: &'static str,
}

const TITLE_PATTERNS: &[TitlePattern] = &[
    TitlePattern {
        prefixes: &["o que é", "o que são", "oque é", "oque são"],
        lead: "O que é",
    },
    TitlePattern {
        prefixes: &["como fazer", "como criar", "como", "como posso"],
        lead: "Como",
    },
    TitlePattern {
        prefixes: &["por que", "porque", "pq"],
        lead: "Por que",
    },
    TitlePattern {
        prefixes: &["qual", "quais"],
        lead: "Qual",
    },
    TitlePattern {
        prefixes: &["explique", "explica", "me explique"],
        lead: "Explicar",
    },
    TitlePattern {
        prefixes: &["diferença entre", "diferenca entre", "diff entre"],
        lead: "Diferença entre",
    },
    TitlePattern {
        prefixes: &["me ajude", "ajuda", "help"],
        lead: "Ajuda com",
    },
    TitlePattern {
        prefixes: &["tutorial", "como usar"],
        lead: "Tutorial",
    },
];

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut text_chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = text_chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    let offset = text_chars.next().map_or(text.len(), |(index, _)| index);
    Some(&text[offset..])
}

/// `prefix`, then at least one whitespace character, then a non-empty rest.
fn match_leading_phrase<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = strip_prefix_ignore_case(text, prefix)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let subject = rest.trim_start();
    (!subject.is_empty()).then_some(subject)
}

fn truncate_title(title: String) -> String {
    if title.graphemes(true).count() > MAX_TITLE_GRAPHEMES {
        let mut truncated: String = title.graphemes(true).take(TRUNCATED_TITLE_GRAPHEMES).collect();
        truncated.push_str("...");
        truncated
    } else {
        title
    }
}

/// Derive a conversation title from the first user message.
pub fn derive_title(message: &str) -> String {
    let clean = message.split_whitespace().collect::<Vec<_>>().join(" ");

    for pattern in TITLE_PATTERNS {
        if let Some(subject) = pattern
            .prefixes
            .iter()
            .find_map(|prefix| match_leading_phrase(&clean, prefix))
        {
            return truncate_title(format!("{} {}", pattern.lead, subject));
        }
    }

    if clean.is_empty() {
        DEFAULT_CONVERSATION_TITLE.to_string()
    } else {
        truncate_title(clean)
    }
}
