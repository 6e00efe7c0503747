use image::{DynamicImage, ImageReader};
use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Cursor;

use crate::error::Result;
use crate::scanner::ImageFile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    /// Horizontal gradient (dHash)
    #[default]
    Gradient,
    VertGradient,
    DoubleGradient,
    /// Mean luminance (aHash)
    Mean,
    Blockhash,
    /// Mean over DCT coefficients (pHash)
    Phash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashSettings {
    pub algorithm: HashAlgorithm,
    /// Width and height of the hash grid. The bit length depends on the
    /// algorithm as well; see [`PerceptualHasher::bit_len`].
    pub size: u32,
}

impl Default for HashSettings {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            size: 8,
        }
    }
}

/// Largest accepted `HashSettings::size`.
pub const MAX_HASH_SIZE: u32 = 64;

/// An image together with everything needed to compare it to others.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub file: ImageFile,
    pub hash: ImageHash,
    pub width: u32,
    pub height: u32,
    /// blake3 of the raw file bytes; equal digests mean byte-identical files.
    pub digest: blake3::Hash,
}

impl Fingerprint {
    pub fn name(&self) -> &str {
        &self.file.name
    }

    pub fn distance(&self, other: &Fingerprint) -> u32 {
        self.hash.dist(&other.hash)
    }

    pub fn is_identical_to(&self, other: &Fingerprint) -> bool {
        self.digest == other.digest
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A file that could not be fingerprinted and was left out of clustering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedImage {
    pub name: String,
    pub reason: String,
}

pub struct PerceptualHasher {
    hasher: Hasher,
    bit_len: u32,
}

impl PerceptualHasher {
    pub fn new(settings: &HashSettings) -> Self {
        let alg = match settings.algorithm {
            HashAlgorithm::Gradient => HashAlg::Gradient,
            HashAlgorithm::VertGradient => HashAlg::VertGradient,
            HashAlgorithm::DoubleGradient => HashAlg::DoubleGradient,
            HashAlgorithm::Mean | HashAlgorithm::Phash => HashAlg::Mean,
            HashAlgorithm::Blockhash => HashAlg::Blockhash,
        };

        let mut config = HasherConfig::new()
            .hash_size(settings.size, settings.size)
            .hash_alg(alg);
        if settings.algorithm == HashAlgorithm::Phash {
            config = config.preproc_dct();
        }

        let hasher = config.to_hasher();
        let side = settings.size.max(8) * 2;
        let blank = hasher.hash_image(&DynamicImage::new_luma8(side, side));
        let bit_len = blank.as_bytes().len() as u32 * 8;
        Self { hasher, bit_len }
    }

    /// Bits in every hash this hasher produces, the largest possible distance.
    pub fn bit_len(&self) -> u32 {
        self.bit_len
    }

    /// Decode `file` and compute its perceptual hash and content digest.
    pub fn fingerprint(&self, file: &ImageFile) -> Result<Fingerprint> {
        let bytes = fs::read(&file.path)?;
        let digest = blake3::hash(&bytes);
        let img = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()?
            .decode()?;
        let hash = self.hasher.hash_image(&img);

        Ok(Fingerprint {
            file: file.clone(),
            hash,
            width: img.width(),
            height: img.height(),
            digest,
        })
    }
}
