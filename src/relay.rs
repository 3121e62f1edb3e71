use std::io::Cursor;

use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::{AnimationDecoder, Frame};
use tracing::debug;

use crate::config::ImageHandling;
use crate::error::PipelineError;

/// Produce the bytes to upload from the downloaded GIF.
pub fn relay(bytes: Vec<u8>, handling: ImageHandling) -> Result<Vec<u8>, PipelineError> {
    match handling {
        ImageHandling::Passthrough => Ok(bytes),
        ImageHandling::Reencode => reencode(&bytes),
    }
}

fn decode_frames(bytes: &[u8]) -> Result<Vec<Frame>, PipelineError> {
    let decoder =
        GifDecoder::new(Cursor::new(bytes)).map_err(|e| PipelineError::Codec(e.to_string()))?;
    decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| PipelineError::Codec(e.to_string()))
}

/// Decode every frame and write them back as an endlessly looping GIF.
fn reencode(bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let frames = decode_frames(bytes)?;
    if frames.is_empty() {
        return Err(PipelineError::Codec("animation has no frames".to_string()));
    }
    let frames_len = frames.len();

    let mut out = Vec::with_capacity(bytes.len());
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| PipelineError::Codec(e.to_string()))?;
        encoder
            .encode_frames(frames)
            .map_err(|e| PipelineError::Codec(e.to_string()))?;
    }

    debug!(
        "Re-encoded GIF: {} frames, {} -> {} bytes",
        frames_len,
        bytes.len(),
        out.len()
    );
    Ok(out)
}

/// Number of frames in a GIF payload.
#[cfg(test)]
pub fn frame_count(bytes: &[u8]) -> Result<usize, PipelineError> {
    decode_frames(bytes).map(|frames| frames.len())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Delay, Rgba, RgbaImage};

    /// A tiny two-frame animation.
    pub(crate) fn two_frame_gif() -> Vec<u8> {
        let frames = [Rgba([255, 0, 0, 255]), Rgba([0, 0, 255, 255])].map(|color| {
            Frame::from_parts(
                RgbaImage::from_pixel(4, 4, color),
                0,
                0,
                Delay::from_numer_denom_ms(100, 1),
            )
        });

        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            encoder.encode_frames(frames).unwrap();
        }
        out
    }

    #[test]
    fn test_passthrough_is_identity() {
        let input = b"anything at all".to_vec();
        let output = relay(input.clone(), ImageHandling::Passthrough).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_reencode_preserves_frame_count() {
        let input = two_frame_gif();
        assert_eq!(frame_count(&input).unwrap(), 2);

        let output = relay(input, ImageHandling::Reencode).unwrap();
        assert!(output.starts_with(b"GIF8"));
        assert_eq!(frame_count(&output).unwrap(), 2);
    }

    #[test]
    fn test_reencode_rejects_garbage() {
        let err = relay(b"not a gif".to_vec(), ImageHandling::Reencode).unwrap_err();
        assert!(matches!(err, PipelineError::Codec(_)));
    }

    #[test]
    fn test_reencode_rejects_empty_input() {
        let err = relay(Vec::new(), ImageHandling::Reencode).unwrap_err();
        assert!(matches!(err, PipelineError::Codec(_)));
    }
}
