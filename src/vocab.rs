/// The vocabulary used by the caption model: a read-only, bidirectional map between words and ids.
///
/// The persisted form is JSON. We accept either a plain `{"word": id}` object, or the output of
/// Keras' `Tokenizer.to_json()`, which is how caption models trained with Keras usually ship their tokenizer.
/// In the latter case the tokenizer settings (lower-casing, filters, OOV token, ...) are honoured
/// when encoding text, so that the ids we feed the model match the ids it was trained on.

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub const DEFAULT_FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n";

/// How text is split into words before being looked up in the vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions
{
    pub lower: bool,
    /// Every character in this string is treated as a separator.
    pub filters: String,
    pub split: String,
    pub oov_token: Option<String>,
    /// Only ids strictly below this are kept when encoding. Zero means no limit.
    pub num_words: Option<usize>,
}

impl Default for TextOptions
{
    fn default() -> Self
    {
        TextOptions {
            lower: true,
            filters: DEFAULT_FILTERS.to_string(),
            split: " ".to_string(),
            oov_token: None,
            num_words: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vocabulary
{
    word_to_id: FxHashMap<String, u32>,
    id_to_word: FxHashMap<u32, String>,
    options: TextOptions,
}

#[derive(Deserialize)]
struct KerasTokenizerJson
{
    config: KerasTokenizerConfig,
}

#[derive(Deserialize)]
struct KerasTokenizerConfig
{
    #[serde(default)]
    num_words: Option<usize>,
    #[serde(default)]
    filters: Option<String>,
    #[serde(default)]
    lower: Option<bool>,
    #[serde(default)]
    split: Option<String>,
    #[serde(default)]
    oov_token: Option<String>,
    word_index: Value,
    #[serde(default)]
    index_word: Option<Value>,
}

impl Vocabulary
{
    /// Builds the vocabulary from a word -> id map, inverting it for id -> word lookups.
    /// If several words share an id, the lexicographically smallest word wins the reverse lookup.
    pub fn from_word_index(word_index: impl IntoIterator<Item = (String, u32)>) -> Self
    {
        Self::with_options(word_index, TextOptions::default())
    }

    pub fn with_options(word_index: impl IntoIterator<Item = (String, u32)>, options: TextOptions) -> Self
    {
        let word_to_id: FxHashMap<String, u32> = word_index.into_iter().collect();

        let mut entries: Vec<(&String, &u32)> = word_to_id.iter().collect();
        entries.sort();
        let mut id_to_word = FxHashMap::default();
        for (word, id) in entries {
            id_to_word.entry(*id).or_insert_with(|| word.clone());
        }

        Vocabulary { word_to_id, id_to_word, options }
    }

    /// Loads the vocabulary from a JSON file. See the module documentation for the accepted layouts.
    pub fn load(path: &Path) -> Result<Self>
    {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Vocabulary(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
            .map_err(|e| Error::Vocabulary(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(contents: &str) -> anyhow::Result<Self>
    {
        let value: Value = serde_json::from_str(contents)?;

        let is_keras_tokenizer = value.get("config")
            .and_then(|config| config.get("word_index"))
            .is_some();
        if !is_keras_tokenizer {
            let word_index: FxHashMap<String, u32> = serde_json::from_value(value)?;
            return Ok(Self::from_word_index(word_index));
        }

        let tokenizer: KerasTokenizerJson = serde_json::from_value(value)?;
        let config = tokenizer.config;
        let defaults = TextOptions::default();
        let options = TextOptions {
            lower: config.lower.unwrap_or(defaults.lower),
            filters: config.filters.unwrap_or(defaults.filters),
            split: config.split.unwrap_or(defaults.split),
            oov_token: config.oov_token,
            num_words: config.num_words,
        };

        let word_index: FxHashMap<String, u32> = embedded_json(config.word_index)?;
        let mut vocabulary = Self::with_options(word_index, options);

        // Keras keeps the reverse map too; when it is present it is authoritative.
        if let Some(index_word) = config.index_word {
            let index_word: FxHashMap<String, String> = embedded_json(index_word)?;
            let mut id_to_word = FxHashMap::default();
            for (id, word) in index_word {
                let id: u32 = id.parse()
                    .map_err(|_| anyhow::anyhow!("index_word key {:?} is not an integer id", id))?;
                id_to_word.insert(id, word);
            }
            vocabulary.id_to_word = id_to_word;
        }

        Ok(vocabulary)
    }

    pub fn word(&self, id: u32) -> Option<&str>
    {
        self.id_to_word.get(&id).map(String::as_str)
    }

    pub fn id(&self, word: &str) -> Option<u32>
    {
        self.word_to_id.get(word).copied()
    }

    pub fn len(&self) -> usize
    {
        self.id_to_word.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.id_to_word.is_empty()
    }

    /// Splits the text into words the same way the tokenizer did at training time,
    /// and maps each word to its id.
    /// Unknown words are dropped, unless the vocabulary has an OOV token, in which case they map to its id.
    pub fn text_to_ids(&self, text: &str) -> Vec<u32>
    {
        let oov_id = self.options.oov_token.as_deref().and_then(|token| self.id(token));

        self.split_words(text)
            .iter()
            .filter_map(|word| {
                match self.id(word) {
                    Some(id) if self.is_within_num_words(id) => Some(id),
                    _ => oov_id,
                }
            })
            .collect()
    }

    fn is_within_num_words(&self, id: u32) -> bool
    {
        match self.options.num_words {
            Some(0) | None => true,
            Some(num_words) => (id as usize) < num_words,
        }
    }

    fn split_words(&self, text: &str) -> Vec<String>
    {
        let text = if self.options.lower { text.to_lowercase() } else { text.to_string() };

        let split = self.options.split.as_str();
        let mut cleaned = String::with_capacity(text.len());
        for c in text.chars() {
            if self.options.filters.contains(c) {
                cleaned.push_str(if split.is_empty() { " " } else { split });
            } else {
                cleaned.push(c);
            }
        }

        let words: Vec<&str> = if split.is_empty() {
            cleaned.split_whitespace().collect()
        } else {
            cleaned.split(split).collect()
        };

        words.into_iter()
            .filter(|word| !word.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Keras serializes nested maps as JSON strings inside the JSON document.
/// Accept both that and a plain nested object.
fn embedded_json<T: DeserializeOwned>(value: Value) -> serde_json::Result<T>
{
    match value {
        Value::String(inner) => serde_json::from_str(&inner),
        other => serde_json::from_value(other),
    }
}
