use std::sync::LazyLock;

use regex::Regex;

/// Sender attribution for a segmented message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "User",
            Sender::Assistant => "Assistant",
        }
    }

    /// Alternation used by the positional fallbacks: even index → User.
    fn from_index(i: usize) -> Self {
        if i % 2 == 0 {
            Sender::User
        } else {
            Sender::Assistant
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
}

/// Which strategy in the fallthrough chain produced the messages. The order
/// is a contract: PatternMatch wins whenever any line carries a known sender
/// prefix; TimestampBoundary and ParagraphSplit cover unprefixed transcripts;
/// Bisect is the last resort when nothing else yielded a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PatternMatch,
    TimestampBoundary,
    ParagraphSplit,
    Bisect,
}

#[derive(Debug)]
pub struct Segmentation {
    pub strategy: Strategy,
    pub messages: Vec<Message>,
}

/// Line prefixes that start a new User message.
pub const USER_PREFIXES: &[&str] = &[
    "User:",
    "[User]:",
    "Customer:",
    "[Customer]:",
    "Client:",
    "[Client]:",
    "Human:",
    "[Human]:",
    "Me:",
    "[Me]:",
    "Question:",
    "User >",
    "Customer >",
    "User said:",
    "Customer said:",
    "User writes:",
    "User asked:",
    "User message:",
    "From user:",
    "Client message:",
    "Q:",
    "Input:",
    "Query:",
    "Person:",
    "Visitor:",
    "Guest:",
    "User input:",
    "User query:",
];

/// Line prefixes that start a new Assistant message.
pub const ASSISTANT_PREFIXES: &[&str] = &[
    "Assistant:",
    "[Assistant]:",
    "Agent:",
    "[Agent]:",
    "Bot:",
    "[Bot]:",
    "AI:",
    "[AI]:",
    "ChatGPT:",
    "[ChatGPT]:",
    "System:",
    "[System]:",
    "Support:",
    "[Support]:",
    "Answer:",
    "Assistant >",
    "Bot >",
    "Assistant said:",
    "Assistant writes:",
    "AI responded:",
    "LLM:",
    "[LLM]:",
    "Response:",
    "A:",
    "Output:",
    "AI output:",
    "Model:",
    "[Model]:",
    "Assistant message:",
    "From assistant:",
    "Bot response:",
    "AI says:",
];

const USER_KEYWORDS: &[&str] = &["user", "customer", "client", "human", "question", "query"];
const ASSISTANT_KEYWORDS: &[&str] = &[
    "assistant", "agent", "bot", "ai", "system", "support", "answer", "response",
];

static TIMESTAMP_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\[\d{2}:\d{2}:\d{2}\]",          // [HH:MM:SS]
        r"^\[\d{2}:\d{2}\]",                // [HH:MM]
        r"^\(\d{2}:\d{2}:\d{2}\)",          // (HH:MM:SS)
        r"^\(\d{2}:\d{2}\)",                // (HH:MM)
        r"^\d{2}:\d{2}:\d{2} -",            // HH:MM:SS -
        r"^\d{2}:\d{2} -",                  // HH:MM -
        r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}", // YYYY-MM-DD HH:MM:SS
    ]
    .iter()
    .map(|p| Regex::new(p).expect("timestamp pattern"))
    .collect()
});

static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence pattern"));

/// Split one transcript blob into an ordered sequence of sender-attributed
/// messages, trying the strategies in fixed precedence. Empty or
/// whitespace-only input yields zero messages.
pub fn segment_transcript(transcript: &str) -> Segmentation {
    if transcript.trim().is_empty() {
        return Segmentation {
            strategy: Strategy::PatternMatch,
            messages: Vec::new(),
        };
    }

    let lines: Vec<&str> = transcript.lines().collect();

    let has_prefixes = lines.iter().any(|line| {
        let trimmed = line.trim();
        strip_prefix_any(trimmed, USER_PREFIXES).is_some()
            || strip_prefix_any(trimmed, ASSISTANT_PREFIXES).is_some()
    });

    if has_prefixes {
        let messages = parse_prefixed(&lines);
        if !messages.is_empty() {
            return Segmentation {
                strategy: Strategy::PatternMatch,
                messages,
            };
        }
        return bisect(&lines);
    }

    let timestamp_lines: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            TIMESTAMP_RES.iter().any(|re| re.is_match(trimmed))
        })
        .map(|(i, _)| i)
        .collect();

    // Timestamp boundaries only qualify when they are frequent enough to
    // plausibly delimit messages: at least 4 hits covering at least 20% of
    // all lines.
    if timestamp_lines.len() >= 4 && timestamp_lines.len() * 5 >= lines.len() {
        let messages = parse_timestamp_bounded(&lines, &timestamp_lines);
        if !messages.is_empty() {
            return Segmentation {
                strategy: Strategy::TimestampBoundary,
                messages,
            };
        }
        return bisect(&lines);
    }

    let messages = parse_paragraphs(&lines);
    if !messages.is_empty() {
        return Segmentation {
            strategy: Strategy::ParagraphSplit,
            messages,
        };
    }
    bisect(&lines)
}

fn strip_prefix_any<'a>(line: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    for prefix in prefixes {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Some(rest.trim());
        }
    }
    None
}

fn flush(messages: &mut Vec<Message>, sender: Option<Sender>, buf: &mut Vec<String>) {
    if let Some(sender) = sender {
        if !buf.is_empty() {
            let text = buf.join("\n");
            if !text.trim().is_empty() {
                messages.push(Message { sender, text });
            }
        }
    }
    buf.clear();
}

/// Primary path: sender prefixes open messages; unprefixed lines continue
/// the message in progress.
fn parse_prefixed(lines: &[&str]) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut sender: Option<Sender> = None;
    let mut buf: Vec<String> = Vec::new();

    for line in lines {
        let trimmed = line.trim();

        // Skip leading blanks before any sender is established.
        if trimmed.is_empty() && sender.is_none() {
            continue;
        }

        if let Some(rest) = strip_prefix_any(trimmed, USER_PREFIXES) {
            flush(&mut messages, sender, &mut buf);
            sender = Some(Sender::User);
            if !rest.is_empty() {
                buf.push(rest.to_string());
            }
        } else if let Some(rest) = strip_prefix_any(trimmed, ASSISTANT_PREFIXES) {
            flush(&mut messages, sender, &mut buf);
            sender = Some(Sender::Assistant);
            if !rest.is_empty() {
                buf.push(rest.to_string());
            }
        } else if sender.is_some() {
            buf.push((*line).to_string());
        } else {
            log::warn!(
                "transcript line without sender prefix: '{}', assuming User message",
                line
            );
            sender = Some(Sender::User);
            buf.push((*line).to_string());
        }
    }

    flush(&mut messages, sender, &mut buf);
    messages
}

/// Fallback 1: draw message boundaries at timestamp-prefixed lines and infer
/// the sender from keywords in each segment's first line, alternating when
/// neither keyword set matches.
fn parse_timestamp_bounded(lines: &[&str], timestamp_lines: &[usize]) -> Vec<Message> {
    let mut boundaries = timestamp_lines.to_vec();
    boundaries.push(lines.len());

    let mut messages = Vec::new();
    for (i, window) in boundaries.windows(2).enumerate() {
        let (start, end) = (window[0], window[1]);
        let text = lines[start..end].join("\n");
        if text.trim().is_empty() {
            continue;
        }

        let first_line = lines[start].to_lowercase();
        let is_user = USER_KEYWORDS.iter().any(|kw| first_line.contains(kw));
        let is_assistant = ASSISTANT_KEYWORDS.iter().any(|kw| first_line.contains(kw));

        let sender = if is_user || (!is_assistant && i % 2 == 0) {
            Sender::User
        } else {
            Sender::Assistant
        };
        messages.push(Message { sender, text });
    }
    messages
}

/// Fallback 2: blank-line-delimited paragraphs alternate senders starting
/// with User. A lone paragraph of more than 100 words is instead split at
/// sentence boundaries and regrouped into small alternating chunks.
fn parse_paragraphs(lines: &[&str]) -> Vec<Message> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    if paragraphs.len() == 1 && paragraphs[0].split_whitespace().count() > 100 {
        return chunk_single_paragraph(&paragraphs[0]);
    }

    paragraphs
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .enumerate()
        .map(|(i, text)| Message {
            sender: Sender::from_index(i),
            text,
        })
        .collect()
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        // Keep the terminating punctuation with the sentence.
        let end = boundary.start() + 1;
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }
    if start < text.len() {
        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }
    }
    sentences
}

/// Regroup sentences into chunks of up to three, flushing early when a chunk
/// ends on a question mark at an odd sentence index.
fn chunk_single_paragraph(text: &str) -> Vec<Message> {
    let sentences = split_sentences(text);
    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for (i, sentence) in sentences.iter().enumerate() {
        current.push(sentence);
        if (i % 2 == 1 && sentence.ends_with('?')) || current.len() >= 3 {
            chunks.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .enumerate()
        .map(|(i, text)| Message {
            sender: Sender::from_index(i),
            text,
        })
        .collect()
}

/// Last resort: split the line list at its midpoint, first half User,
/// second half Assistant, keeping only non-blank halves.
fn bisect(lines: &[&str]) -> Segmentation {
    let mid = lines.len() / 2;
    let mut messages = Vec::new();

    let first = lines[..mid].join("\n");
    if !first.trim().is_empty() {
        messages.push(Message {
            sender: Sender::User,
            text: first,
        });
    }
    let second = lines[mid..].join("\n");
    if !second.trim().is_empty() {
        messages.push(Message {
            sender: Sender::Assistant,
            text: second,
        });
    }

    Segmentation {
        strategy: Strategy::Bisect,
        messages,
    }
}
