//! Sentence chunking and voice selection for the vocalization controller
//!
//! Long replies are split into sentence-sized utterances so a synthesizer
//! hiccup only costs one sentence, and a voice is picked from whatever list
//! the platform exposes.

/// One unit of synthesized speech, roughly a sentence
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChunk {
    /// Trimmed text of this chunk
    pub text: String,

    /// Position of this chunk in its speak request
    pub index: usize,
}

impl TextChunk {
    pub fn new(text: impl Into<String>, index: usize) -> Self {
        Self {
            text: text.into(),
            index,
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split text at `.`, `!` or `?` followed by whitespace, dropping empty chunks
pub fn split_sentences(text: &str) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        let at_boundary = is_sentence_end(c)
            && chars.peek().map(|next| next.is_whitespace()).unwrap_or(false);
        if at_boundary {
            push_chunk(&mut chunks, &current);
            current.clear();
        }
    }
    push_chunk(&mut chunks, &current);

    chunks
}

fn push_chunk(chunks: &mut Vec<TextChunk>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        let index = chunks.len();
        chunks.push(TextChunk::new(trimmed, index));
    }
}

/// Estimated speaking time for `text`: words times `per_word_ms`, never below `floor_ms`
pub fn estimate_speaking_ms(text: &str, per_word_ms: u64, floor_ms: u64) -> u64 {
    let words = text.split_whitespace().count() as u64;
    (words * per_word_ms).max(floor_ms)
}

/// A synthesizer voice as reported by the platform
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    /// BCP 47 tag, e.g. `en-US`
    pub lang: String,
    /// Whether the platform marks this as its default voice
    pub is_default: bool,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
            is_default: false,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Heuristic: platforms rarely report gender, so go by the voice name
    pub fn sounds_female(&self) -> bool {
        self.name
            .split(|c: char| !c.is_alphanumeric())
            .map(|word| word.to_lowercase())
            .any(|word| word == "female" || FEMALE_VOICE_NAMES.contains(&word.as_str()))
    }

    fn primary_language(&self) -> String {
        primary_subtag(&self.lang)
    }

    fn exact_locale(&self, lang: &str) -> bool {
        normalize_tag(&self.lang) == normalize_tag(lang)
    }
}

const FEMALE_VOICE_NAMES: &[&str] = &[
    "samantha", "victoria", "karen", "moira", "tessa", "fiona", "serena", "zira", "susan",
    "hazel", "allison", "ava", "kate", "aria", "jenny", "libby", "sonia", "natasha",
];

fn normalize_tag(tag: &str) -> String {
    tag.replace('_', "-").to_lowercase()
}

fn primary_subtag(tag: &str) -> String {
    normalize_tag(tag)
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Pick a voice: female in `lang`, else any voice in `lang`, else the
/// platform default, else the first one listed
pub fn select_voice(voices: &[Voice], lang: &str) -> Option<Voice> {
    let wanted = primary_subtag(lang);
    let in_language: Vec<&Voice> = voices
        .iter()
        .filter(|v| v.primary_language() == wanted)
        .collect();

    let best_of = |candidates: Vec<&Voice>| -> Option<Voice> {
        candidates
            .iter()
            .find(|v| v.exact_locale(lang))
            .or_else(|| candidates.first())
            .map(|v| (*v).clone())
    };

    let female: Vec<&Voice> = in_language
        .iter()
        .copied()
        .filter(|v| v.sounds_female())
        .collect();

    best_of(female)
        .or_else(|| best_of(in_language))
        .or_else(|| voices.iter().find(|v| v.is_default).cloned())
        .or_else(|| voices.first().cloned())
}
