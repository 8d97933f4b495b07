//! Greedy autoregressive decoding: starting from the start token, repeatedly ask the caption model
//! for the most probable next word until it produces the end token, predicts an id with no word,
//! or the maximum length is reached.

use log::trace;
use ndarray::ArrayView1;

use crate::error::{Error, Result};
use crate::models::NextWordPredictor;
use crate::preprocessing;
use crate::vocab::Vocabulary;

pub const MAX_LEN: usize = 34;
pub const START_TOKEN: &str = "startseq";
pub const END_TOKEN: &str = "endseq";

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOptions
{
    /// The length the sequence is padded to, and the maximum number of words generated.
    pub max_len: usize,
    pub start_token: String,
    pub end_token: String,
}

impl Default for DecodeOptions
{
    fn default() -> Self
    {
        DecodeOptions {
            max_len: MAX_LEN,
            start_token: START_TOKEN.to_string(),
            end_token: END_TOKEN.to_string(),
        }
    }
}

/// Index of the highest value. Ties go to the lowest index, and NaN never wins.
/// Returns None only for an empty (or all-NaN) distribution.
pub fn argmax(probabilities: ArrayView1<f32>) -> Option<usize>
{
    let mut best: Option<(usize, f32)> = None;
    for (index, &probability) in probabilities.iter().enumerate() {
        if probability.is_nan() {
            continue;
        }
        match best {
            Some((_, best_probability)) if probability <= best_probability => {},
            _ => best = Some((index, probability)),
        }
    }
    best.map(|(index, _)| index)
}

/// Generates a caption for the image features, one word per call to the predictor.
pub fn greedy_decode(
    features: ArrayView1<f32>,
    vocabulary: &Vocabulary,
    predictor: &dyn NextWordPredictor,
    options: &DecodeOptions,
) -> Result<String>
{
    let mut words: Vec<String> = vec![options.start_token.clone()];

    for step in 0..options.max_len {
        let ids = vocabulary.text_to_ids(&words.join(" "));
        let sequence = preprocessing::pad_sequence(&ids, options.max_len);

        let probabilities = predictor.predict(features, sequence.view())
            .map_err(Error::Inference)?;

        let word = argmax(probabilities.view())
            .and_then(|id| u32::try_from(id).ok())
            .and_then(|id| vocabulary.word(id));
        let Some(word) = word else {
            trace!("Step {}: predicted id has no word, stopping", step);
            break;
        };

        trace!("Step {}: {:?}", step, word);
        words.push(word.to_string());
        if word == options.end_token {
            break;
        }
    }

    Ok(assemble_caption(&words, options))
}

/// Drops the start and end tokens, joins the remaining words and capitalizes the caption:
/// the first letter is upper-cased and every other letter lower-cased.
pub fn assemble_caption(words: &[String], options: &DecodeOptions) -> String
{
    let caption = words.iter()
        .filter(|word| **word != options.start_token && **word != options.end_token)
        .map(String::as_str)
        .collect::<Vec<&str>>()
        .join(" ");

    capitalize(&caption)
}

fn capitalize(text: &str) -> String
{
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests
{
    use std::sync::Mutex;

    use ndarray::{arr1, Array1};

    use super::*;

    /// Returns the given ids, in order, as one-hot distributions; repeats the last one when it runs out.
    struct ScriptedPredictor
    {
        ids: Vec<usize>,
        vocabulary_size: usize,
        calls: Mutex<usize>,
        sequences: Mutex<Vec<Vec<f32>>>,
    }

    impl ScriptedPredictor
    {
        fn new(ids: &[usize], vocabulary_size: usize) -> Self
        {
            ScriptedPredictor {
                ids: ids.to_vec(),
                vocabulary_size,
                calls: Mutex::new(0),
                sequences: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize
        {
            *self.calls.lock().unwrap()
        }
    }

    impl NextWordPredictor for ScriptedPredictor
    {
        fn predict(&self, _features: ArrayView1<f32>, sequence: ArrayView1<f32>) -> anyhow::Result<Array1<f32>>
        {
            let mut calls = self.calls.lock().unwrap();
            let step = *calls;
            *calls += 1;
            self.sequences.lock().unwrap().push(sequence.to_vec());

            let id = self.ids[step.min(self.ids.len() - 1)];
            let mut probabilities = Array1::zeros(self.vocabulary_size);
            probabilities[id] = 1.0;
            Ok(probabilities)
        }
    }

    struct FailingPredictor;

    impl NextWordPredictor for FailingPredictor
    {
        fn predict(&self, _features: ArrayView1<f32>, _sequence: ArrayView1<f32>) -> anyhow::Result<Array1<f32>>
        {
            anyhow::bail!("backend unavailable")
        }
    }

    fn vocabulary() -> Vocabulary
    {
        Vocabulary::from_word_index([
            ("startseq".to_string(), 1),
            ("a".to_string(), 2),
            ("dog".to_string(), 3),
            ("endseq".to_string(), 4),
        ])
    }

    fn features() -> Array1<f32>
    {
        arr1(&[0.25, -1.0, 3.5])
    }

    #[test]
    fn a_dog()
    {
        let predictor = ScriptedPredictor::new(&[2, 3, 4], 5);
        let caption = greedy_decode(features().view(), &vocabulary(), &predictor, &DecodeOptions::default()).unwrap();
        assert_eq!(caption, "A dog");
        assert_eq!(predictor.calls(), 3);
    }

    #[test]
    fn end_token_first_gives_empty_caption()
    {
        let predictor = ScriptedPredictor::new(&[4], 5);
        let caption = greedy_decode(features().view(), &vocabulary(), &predictor, &DecodeOptions::default()).unwrap();
        assert_eq!(caption, "");
        assert_eq!(predictor.calls(), 1);
    }

    #[test]
    fn unknown_id_first_gives_empty_caption()
    {
        // Id 0 is padding and id 5 is past the vocabulary; neither has a word.
        for unknown in [0, 5] {
            let predictor = ScriptedPredictor::new(&[unknown], 6);
            let caption = greedy_decode(features().view(), &vocabulary(), &predictor, &DecodeOptions::default()).unwrap();
            assert_eq!(caption, "");
            assert_eq!(predictor.calls(), 1);
        }
    }

    #[test]
    fn unknown_id_later_keeps_words_so_far()
    {
        let predictor = ScriptedPredictor::new(&[2, 3, 0], 5);
        let caption = greedy_decode(features().view(), &vocabulary(), &predictor, &DecodeOptions::default()).unwrap();
        assert_eq!(caption, "A dog");
    }

    #[test]
    fn stops_at_max_len_without_end_token()
    {
        let options = DecodeOptions { max_len: 3, ..DecodeOptions::default() };
        let predictor = ScriptedPredictor::new(&[2], 5);
        let caption = greedy_decode(features().view(), &vocabulary(), &predictor, &options).unwrap();
        assert_eq!(caption, "A a a");
        assert_eq!(predictor.calls(), 3);
    }

    #[test]
    fn never_more_than_max_len_words()
    {
        for max_len in 0..8 {
            let options = DecodeOptions { max_len, ..DecodeOptions::default() };
            let predictor = ScriptedPredictor::new(&[3, 2], 5);
            let caption = greedy_decode(features().view(), &vocabulary(), &predictor, &options).unwrap();
            assert!(caption.split_whitespace().count() <= max_len);
            assert_eq!(predictor.calls(), max_len);
        }
    }

    #[test]
    fn sequences_are_left_padded_to_max_len()
    {
        let options = DecodeOptions { max_len: 4, ..DecodeOptions::default() };
        let predictor = ScriptedPredictor::new(&[2, 3, 4], 5);
        greedy_decode(features().view(), &vocabulary(), &predictor, &options).unwrap();

        let sequences = predictor.sequences.lock().unwrap();
        assert_eq!(sequences[0], vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(sequences[1], vec![0.0, 0.0, 1.0, 2.0]);
        assert_eq!(sequences[2], vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn long_sequences_keep_the_most_recent_words()
    {
        let options = DecodeOptions { max_len: 2, ..DecodeOptions::default() };
        let predictor = ScriptedPredictor::new(&[2, 3], 5);
        greedy_decode(features().view(), &vocabulary(), &predictor, &options).unwrap();

        let sequences = predictor.sequences.lock().unwrap();
        assert_eq!(sequences[1], vec![1.0, 2.0]);
    }

    #[test]
    fn decoding_is_deterministic()
    {
        let run = || {
            let predictor = ScriptedPredictor::new(&[3, 2, 3, 4], 5);
            greedy_decode(features().view(), &vocabulary(), &predictor, &DecodeOptions::default()).unwrap()
        };
        assert_eq!(run(), "Dog a dog");
        assert_eq!(run(), run());
    }

    #[test]
    fn caption_never_contains_sentinels()
    {
        // The model may emit the start token again mid-sentence.
        let predictor = ScriptedPredictor::new(&[2, 1, 3, 4], 5);
        let caption = greedy_decode(features().view(), &vocabulary(), &predictor, &DecodeOptions::default()).unwrap();
        assert_eq!(caption, "A dog");
        assert!(!caption.contains("startseq"));
        assert!(!caption.contains("endseq"));
    }

    #[test]
    fn custom_sentinels()
    {
        let vocabulary = Vocabulary::from_word_index([
            ("<start>".to_string(), 1),
            ("cat".to_string(), 2),
            ("<end>".to_string(), 3),
        ]);
        let options = DecodeOptions {
            start_token: "<start>".to_string(),
            end_token: "<end>".to_string(),
            ..DecodeOptions::default()
        };
        let predictor = ScriptedPredictor::new(&[2, 3], 4);
        let caption = greedy_decode(features().view(), &vocabulary, &predictor, &options).unwrap();
        assert_eq!(caption, "Cat");
    }

    #[test]
    fn predictor_errors_propagate()
    {
        let result = greedy_decode(features().view(), &vocabulary(), &FailingPredictor, &DecodeOptions::default());
        assert!(matches!(result, Err(Error::Inference(_))));
    }

    #[test]
    fn argmax_prefers_first_maximum()
    {
        assert_eq!(argmax(arr1(&[0.1, 0.4, 0.4, 0.1]).view()), Some(1));
        assert_eq!(argmax(arr1(&[0.9, 0.05, 0.05]).view()), Some(0));
    }

    #[test]
    fn argmax_ignores_nan()
    {
        assert_eq!(argmax(arr1(&[f32::NAN, 0.2, 0.1]).view()), Some(1));
        assert_eq!(argmax(arr1(&[f32::NAN]).view()), None);
        assert_eq!(argmax(Array1::<f32>::zeros(0).view()), None);
    }

    #[test]
    fn capitalizes_like_a_sentence()
    {
        let words: Vec<String> = ["startseq", "a", "dog", "in", "NYC", "endseq"].iter().map(|w| w.to_string()).collect();
        assert_eq!(assemble_caption(&words, &DecodeOptions::default()), "A dog in nyc");
        assert_eq!(assemble_caption(&[], &DecodeOptions::default()), "");
    }
}
