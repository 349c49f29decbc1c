//! Roles of the presentation assets of a container and conversions between decoded images and
//! the PNG bytes stored on the console.

use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::{fmt, io::Cursor, str::FromStr};
use thiserror::Error;

/// An error which may occur while decoding or encoding an asset.
#[derive(Error, Debug)]
pub enum AssetError {
    /// The bytes are not an image or the image couldn't be encoded as PNG.
    #[error("image encoding failed: {0}")]
    Encoding(#[from] image::ImageError),
    /// The asset is not an image.
    #[error("{0} is not an image asset")]
    NotAnImage(AssetKind),
    /// The file name doesn't name a known asset.
    #[error("unknown asset '{0}', expected one of icon0.png, pic0.png, pic1.png, snd0.at9")]
    UnknownAsset(String),
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AssetKind {
    /// `icon0.png`, the tile on the home screen.
    Icon,
    /// `pic0.png`, the secondary background.
    Background,
    /// `pic1.png`, the cover shown behind the focused tile.
    Cover,
    /// `snd0.at9`, the background music.
    Sound,
}

impl AssetKind {
    pub const ALL: [AssetKind; 4] = [
        AssetKind::Icon,
        AssetKind::Background,
        AssetKind::Cover,
        AssetKind::Sound,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            AssetKind::Icon => "icon0.png",
            AssetKind::Background => "pic0.png",
            AssetKind::Cover => "pic1.png",
            AssetKind::Sound => "snd0.at9",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.file_name() == name)
    }

    /// Returns the pixel size the console expects, or `None` for the sound.
    pub fn dimensions(self) -> Option<(u32, u32)> {
        match self {
            AssetKind::Icon => Some((512, 512)),
            AssetKind::Background | AssetKind::Cover => Some((1920, 1080)),
            AssetKind::Sound => None,
        }
    }

    #[inline]
    pub fn is_image(self) -> bool {
        self.dimensions().is_some()
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

impl FromStr for AssetKind {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "icon" => Ok(AssetKind::Icon),
            "background" => Ok(AssetKind::Background),
            "cover" => Ok(AssetKind::Cover),
            "sound" => Ok(AssetKind::Sound),
            _ => Self::from_file_name(s).ok_or_else(|| AssetError::UnknownAsset(s.to_owned())),
        }
    }
}

/// Decodes image bytes in any supported format.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, AssetError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Encodes an image as PNG, the format the console stores assets in.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, AssetError> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// Resizes an image to exactly the size the console expects for the role. Images that already
/// have that size are returned as they are.
pub fn fit_to_role(image: DynamicImage, kind: AssetKind) -> Result<DynamicImage, AssetError> {
    let (width, height) = kind.dimensions().ok_or(AssetError::NotAnImage(kind))?;
    if image.width() == width && image.height() == height {
        return Ok(image);
    }

    debug!(
        "Resizing {}x{} image to {}x{} for {}.",
        image.width(),
        image.height(),
        width,
        height,
        kind
    );

    Ok(image.resize_exact(width, height, FilterType::Lanczos3))
}
