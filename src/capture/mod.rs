//! Frame Source Layer
//!
//! Decodes stored inputs into frames with the `image` crate. Animated GIFs
//! yield one frame per animation frame; any other still image yields a single
//! frame. Full video decoding belongs to an external collaborator that can be
//! plugged in through `FrameSource`.

pub mod frame;

use image::codecs::gif::GifDecoder;
use image::{imageops, AnimationDecoder, DynamicImage, ImageReader, ImageResult, RgbImage};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::capture::frame::Frame;

/// A sequence of decoded frames
pub trait FrameSource {
    /// Capture rate reported by the input
    fn nominal_fps(&self) -> f64;

    /// Next frame, or `None` once the input is exhausted
    fn next_frame(&mut self) -> ImageResult<Option<Frame>>;

    /// Single-frame inputs are processed regardless of frame skipping
    fn is_still(&self) -> bool {
        false
    }
}

/// Whether a raw frame is kept when processing one of every `skip` frames
pub fn is_retained(index: u64, skip: u32) -> bool {
    let skip = u64::from(skip.max(1));
    index % skip == 0
}

/// Downscale frames wider than `max_width`, preserving aspect ratio
pub fn fit_width(image: RgbImage, max_width: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if max_width == 0 || width <= max_width {
        return image;
    }

    let scale = max_width as f64 / width as f64;
    let new_height = ((height as f64 * scale) as u32).max(1);
    imageops::resize(&image, max_width, new_height, imageops::FilterType::Triangle)
}

/// Open a stored input as a frame source
pub fn open_source(path: &Path, default_fps: f64) -> ImageResult<Box<dyn FrameSource>> {
    if is_gif(path)? {
        let source = AnimationSource::open(path, default_fps)?;
        info!(
            "Opened animated input {:?} @ {:.1} FPS",
            path,
            source.nominal_fps()
        );
        Ok(Box::new(source))
    } else {
        // Stored names may lack a usable extension
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?.to_rgb8();
        info!(
            "Opened still input {:?} ({}x{})",
            path,
            image.width(),
            image.height()
        );
        Ok(Box::new(StillSource::new(image, default_fps)))
    }
}

fn is_gif(path: &Path) -> ImageResult<bool> {
    let mut magic = [0u8; 6];
    let mut file = File::open(path)?;
    let read = file.read(&mut magic)?;
    Ok(read == 6 && (&magic == b"GIF87a" || &magic == b"GIF89a"))
}

fn timestamp(index: u64, fps: f64) -> Duration {
    if fps > 0.0 {
        Duration::from_secs_f64(index as f64 / fps)
    } else {
        Duration::ZERO
    }
}

/// Single still image
pub struct StillSource {
    image: Option<RgbImage>,
    fps: f64,
}

impl StillSource {
    pub fn new(image: RgbImage, fps: f64) -> Self {
        Self {
            image: Some(image),
            fps,
        }
    }
}

impl FrameSource for StillSource {
    fn nominal_fps(&self) -> f64 {
        self.fps
    }

    fn is_still(&self) -> bool {
        true
    }

    fn next_frame(&mut self) -> ImageResult<Option<Frame>> {
        Ok(self
            .image
            .take()
            .map(|image| Frame::new(image, 1, timestamp(1, self.fps))))
    }
}

/// Animated GIF decoded frame by frame
pub struct AnimationSource {
    frames: image::Frames<'static>,
    pending: Option<RgbImage>,
    fps: f64,
    next_index: u64,
}

impl AnimationSource {
    pub fn open(path: &Path, default_fps: f64) -> ImageResult<Self> {
        let decoder = GifDecoder::new(BufReader::new(File::open(path)?))?;
        let mut frames = decoder.into_frames();

        // The first frame's delay sets the nominal rate
        let (pending, fps) = match frames.next() {
            Some(first) => {
                let first = first?;
                let (numer, denom) = first.delay().numer_denom_ms();
                let fps = if numer > 0 {
                    1000.0 * denom as f64 / numer as f64
                } else {
                    default_fps
                };
                let image = DynamicImage::ImageRgba8(first.into_buffer()).to_rgb8();
                (Some(image), fps)
            }
            None => (None, default_fps),
        };

        Ok(Self {
            frames,
            pending,
            fps,
            next_index: 1,
        })
    }
}

impl FrameSource for AnimationSource {
    fn nominal_fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> ImageResult<Option<Frame>> {
        let image = match self.pending.take() {
            Some(image) => image,
            None => match self.frames.next() {
                Some(frame) => DynamicImage::ImageRgba8(frame?.into_buffer()).to_rgb8(),
                None => {
                    debug!("Animation exhausted after {} frames", self.next_index - 1);
                    return Ok(None);
                }
            },
        };

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame::new(image, index, timestamp(index, self.fps))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Rgb, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_gif(path: &Path, frames: usize, delay_ms: u32) {
        let file = File::create(path).unwrap();
        let mut encoder = GifEncoder::new(file);
        let frames: Vec<image::Frame> = (0..frames)
            .map(|i| {
                let buffer = RgbaImage::from_pixel(8, 6, Rgba([i as u8 * 40, 0, 0, 255]));
                image::Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1))
            })
            .collect();
        encoder.encode_frames(frames).unwrap();
    }

    #[test]
    fn test_retention_every_third_frame() {
        let kept: Vec<u64> = (1..=9).filter(|&i| is_retained(i, 3)).collect();
        assert_eq!(kept, vec![3, 6, 9]);
        assert!(is_retained(5, 1));
        assert!(is_retained(5, 0));
    }

    #[test]
    fn test_fit_width_downscales() {
        let image = RgbImage::from_pixel(1280, 720, Rgb([1, 2, 3]));
        let resized = fit_width(image, 640);
        assert_eq!(resized.dimensions(), (640, 360));
    }

    #[test]
    fn test_fit_width_keeps_small_frames() {
        let image = RgbImage::from_pixel(320, 240, Rgb([1, 2, 3]));
        assert_eq!(fit_width(image.clone(), 640).dimensions(), (320, 240));
        assert_eq!(fit_width(image, 0).dimensions(), (320, 240));
    }

    #[test]
    fn test_animation_source_yields_all_frames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.gif");
        write_gif(&path, 4, 100);

        let mut source = open_source(&path, 30.0).unwrap();
        assert!((source.nominal_fps() - 10.0).abs() < 0.5);

        let mut indices = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.dimensions(), (8, 6));
            indices.push(frame.index);
        }
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_still_source_yields_one_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("still.png");
        RgbImage::from_pixel(5, 5, Rgb([9, 9, 9])).save(&path).unwrap();

        let mut source = open_source(&path, 25.0).unwrap();
        assert_eq!(source.nominal_fps(), 25.0);
        assert!(source.is_still());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_still_format_detected_from_content() {
        let dir = TempDir::new().unwrap();
        let png = dir.path().join("still.png");
        RgbImage::from_pixel(7, 3, Rgb([1, 2, 3])).save(&png).unwrap();
        let bare = dir.path().join("upload.bin");
        std::fs::rename(&png, &bare).unwrap();

        let mut source = open_source(&bare, 30.0).unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (7, 3));
    }

    #[test]
    fn test_unreadable_input_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.mp4");
        std::fs::write(&path, b"definitely not media").unwrap();

        assert!(open_source(&path, 30.0).is_err());
    }
}
