use std::path::Path;

use anyhow::Context;
use log::debug;
use ndarray::{Array1, Array4, ArrayView1, Axis};
use ort::{self, inputs, GraphOptimizationLevel};

/// Maps a preprocessed image to its feature vector.
/// Use preprocessing::image_to_encoder_input() to build the input.
pub trait FeatureEncoder: Send + Sync
{
    fn encode(&self, input: Array4<f32>) -> anyhow::Result<Array1<f32>>;
}

/// Given the image features and the padded sequence of words generated so far,
/// returns a probability for every id in the vocabulary being the next word.
pub trait NextWordPredictor: Send + Sync
{
    fn predict(&self, features: ArrayView1<f32>, sequence: ArrayView1<f32>) -> anyhow::Result<Array1<f32>>;
}

fn build_session(path: &Path, intra_threads: usize) -> anyhow::Result<ort::Session>
{
    let session = ort::Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(path)
        .with_context(|| format!("Unable to load ONNX model {}", path.display()))?;

    debug!(
        "Loaded {} with inputs {:?} and outputs {:?}",
        path.display(),
        session.inputs.iter().map(|input| input.name.as_str()).collect::<Vec<_>>(),
        session.outputs.iter().map(|output| output.name.as_str()).collect::<Vec<_>>(),
    );

    Ok(session)
}

/// The convolutional image encoder (an EfficientNet with its classification head removed).
/// Takes a (1, size, size, 3) image and outputs a (1, feature_length) tensor; we squeeze the batch axis.
pub struct OnnxFeatureEncoder
{
    session: ort::Session,
}

impl OnnxFeatureEncoder
{
    pub fn new(path: &Path, intra_threads: usize) -> anyhow::Result<Self>
    {
        Ok(OnnxFeatureEncoder { session: build_session(path, intra_threads)? })
    }
}

impl FeatureEncoder for OnnxFeatureEncoder
{
    fn encode(&self, input: Array4<f32>) -> anyhow::Result<Array1<f32>>
    {
        let outputs = self.session.run(inputs![input]?)?;
        let features = outputs[0].try_extract_tensor::<f32>()?;

        // Output: [[0.1327, ..., -0.2274]], shape=[1, 1280]
        Ok(features.iter().copied().collect())
    }
}

/// The caption decoder. It has two inputs, in order: the image features (1, feature_length)
/// and the padded word ids (1, max_len). It outputs a softmax over the vocabulary, (1, vocabulary_size).
pub struct OnnxCaptionModel
{
    session: ort::Session,
}

impl OnnxCaptionModel
{
    pub fn new(path: &Path, intra_threads: usize) -> anyhow::Result<Self>
    {
        let session = build_session(path, intra_threads)?;
        if session.inputs.len() != 2 {
            anyhow::bail!(
                "Caption model {} should take 2 inputs (features, sequence) but takes {}",
                path.display(),
                session.inputs.len()
            );
        }
        Ok(OnnxCaptionModel { session })
    }
}

impl NextWordPredictor for OnnxCaptionModel
{
    fn predict(&self, features: ArrayView1<f32>, sequence: ArrayView1<f32>) -> anyhow::Result<Array1<f32>>
    {
        let features = features.insert_axis(Axis(0)).to_owned();
        let sequence = sequence.insert_axis(Axis(0)).to_owned();

        let outputs = self.session.run(inputs![features, sequence]?)?;
        let probabilities = outputs[0].try_extract_tensor::<f32>()?;

        Ok(probabilities.iter().copied().collect())
    }
}
