//! Raw video frames grabbed from a playback surface.

use crate::options::Dimension;
use image::RgbaImage;

/// Pixel layouts a playback surface may hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// RGB with 8 bits per channel (24 bits per pixel)
    Rgb,
    /// RGBA with 8 bits per channel (32 bits per pixel)
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// A single decoded video frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format of the frame data
    pub format: PixelFormat,
    /// Raw pixel data
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Creates a frame filled with zeros.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let size = (width as usize) * (height as usize) * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: vec![0; size],
        }
    }

    /// Creates a video frame from existing data.
    pub fn from_data(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn dimension(&self) -> Dimension {
        Dimension::new(self.width, self.height)
    }

    /// Whether `data` holds exactly one frame of `format` at this size.
    pub fn is_complete(&self) -> bool {
        let expected = (self.width as usize) * (self.height as usize) * self.format.bytes_per_pixel();
        self.data.len() == expected
    }

    /// Converts this frame to RGBA format.
    pub fn to_rgba(&self) -> VideoFrame {
        if self.format == PixelFormat::Rgba {
            return self.clone();
        }

        let pixel_count = (self.width as usize) * (self.height as usize);
        let mut rgba_data = vec![0u8; pixel_count * 4];

        // RGB -> RGBA: just add alpha=255
        for (src, dst) in self.data.chunks_exact(3).zip(rgba_data.chunks_exact_mut(4)) {
            dst[..3].copy_from_slice(src);
            dst[3] = 255;
        }

        VideoFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgba,
            data: rgba_data,
        }
    }

    /// Consumes the frame into an RGBA image buffer.
    ///
    /// Returns `None` when the data length does not match the dimensions.
    pub fn into_rgba_image(self) -> Option<RgbaImage> {
        if !self.is_complete() {
            return None;
        }
        let rgba = match self.format {
            PixelFormat::Rgba => self,
            PixelFormat::Rgb => self.to_rgba(),
        };
        RgbaImage::from_raw(rgba.width, rgba.height, rgba.data)
    }
}
