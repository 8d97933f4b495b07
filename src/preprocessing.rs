/// Preprocessing functions for the inputs of the captioning models.
/// Images are turned into the tensor layout the feature extractor expects,
/// and token ids into the fixed-length sequence the caption model expects.

use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, Array1, Array4};

use crate::error::Result;

/// EfficientNet default input resolution.
pub const IMAGE_INPUT_SIZE: u32 = 224;

/// Decodes an uploaded image, guessing the format from its contents.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage>
{
	Ok(image::load_from_memory(bytes)?)
}

/// Resizes to exactly `size` x `size`. The aspect ratio is not preserved;
/// the feature extractor was trained on squashed images.
pub fn resize_image(image: &DynamicImage, size: u32) -> DynamicImage
{
	image.resize_exact(size, size, FilterType::CatmullRom)
}

/// Converts the image to the 4D array expected by the feature extractor: (1, size, size, 3), channels last.
/// Pixel values are left in 0..=255; EfficientNet rescales internally.
/// The image is resized first if it is not already `size` x `size`.
pub fn image_to_encoder_input(image: &DynamicImage, size: u32) -> Array4<f32>
{
	let resized;
	let image = if image.width() == size && image.height() == size {
		image
	} else {
		resized = resize_image(image, size);
		&resized
	};

	let rgb = image.to_rgb8();
	let size = size as usize;
	let mut input = Array::zeros((1, size, size, 3));
	for (x, y, pixel) in rgb.enumerate_pixels() {
		let [r, g, b] = pixel.0;
		let (x, y) = (x as usize, y as usize);
		input[[0, y, x, 0]] = r as f32;
		input[[0, y, x, 1]] = g as f32;
		input[[0, y, x, 2]] = b as f32;
	}

	input
}

/// Pads the ids on the left with 0 up to `max_len`, or keeps only the last `max_len` ids.
/// The caption model takes the sequence as floats.
pub fn pad_sequence(ids: &[u32], max_len: usize) -> Array1<f32>
{
	let mut padded = Array1::zeros(max_len);
	let kept = &ids[ids.len().saturating_sub(max_len)..];
	let offset = max_len - kept.len();
	for (i, id) in kept.iter().enumerate() {
		padded[offset + i] = *id as f32;
	}

	padded
}
