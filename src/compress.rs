//! Thin facade over general-purpose byte compressors.
//!
//! Block-codec output is often recompressed with a general-purpose
//! algorithm when comparing pipelines; this module resolves an algorithm
//! tag to a boxed byte-array codec so callers can treat every backend the
//! same way. Nothing here inspects the bytes it is given.

use std::fmt;
use std::io::Read;
use std::io::Write;

/// Errors surfaced by the compressor facade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The tag does not name a registered algorithm.
    #[error("unknown compressor tag {0:?}")]
    UnknownAlgorithm(String),

    /// A streaming backend failed.
    #[error("compressor backend error: {0}")]
    Io(#[from] std::io::Error),

    /// The Snappy backend rejected its input.
    #[error("snappy error: {0}")]
    Snappy(#[from] snap::Error),

    /// The LZ4 backend rejected its input.
    #[error("lz4 error: {0}")]
    Lz4(#[from] lz4_flex::block::DecompressError),
}

/// Registered general-purpose algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Pass-through; data is returned unchanged.
    Uncompressed,
    Snappy,
    Lz4,
    Gzip,
    Zstd,
    Lzma2,
}

impl Algorithm {
    /// Resolves an algorithm by its tag name.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "UNCOMPRESSED" => Ok(Self::Uncompressed),
            "SNAPPY" => Ok(Self::Snappy),
            "LZ4" => Ok(Self::Lz4),
            "GZIP" => Ok(Self::Gzip),
            "ZSTD" => Ok(Self::Zstd),
            "LZMA2" => Ok(Self::Lzma2),
            other => Err(Error::UnknownAlgorithm(other.to_owned())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uncompressed => "UNCOMPRESSED",
            Self::Snappy => "SNAPPY",
            Self::Lz4 => "LZ4",
            Self::Gzip => "GZIP",
            Self::Zstd => "ZSTD",
            Self::Lzma2 => "LZMA2",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A byte-array compressor.
pub trait ByteCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Error>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Upper bound on the compressed size of `uncompressed` input bytes.
    fn max_compressed_len(&self, uncompressed: usize) -> usize;
}

/// Resolves an algorithm tag to its codec.
pub fn codec_for(algorithm: Algorithm) -> Box<dyn ByteCodec> {
    match algorithm {
        Algorithm::Uncompressed => Box::new(PassthroughCodec),
        Algorithm::Snappy => Box::new(SnappyCodec),
        Algorithm::Lz4 => Box::new(Lz4Codec),
        Algorithm::Gzip => Box::new(GzipCodec),
        Algorithm::Zstd => Box::new(ZstdCodec),
        Algorithm::Lzma2 => Box::new(XzCodec),
    }
}

/// Returns input bytes unchanged in both directions.
pub struct PassthroughCodec;

impl ByteCodec for PassthroughCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(data.to_vec())
    }

    fn max_compressed_len(&self, uncompressed: usize) -> usize {
        uncompressed
    }
}

pub struct SnappyCodec;

impl ByteCodec for SnappyCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(snap::raw::Encoder::new().compress_vec(data)?)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(snap::raw::Decoder::new().decompress_vec(data)?)
    }

    fn max_compressed_len(&self, uncompressed: usize) -> usize {
        snap::raw::max_compress_len(uncompressed)
    }
}

/// LZ4 block format with the uncompressed size prepended, so decompression
/// can size its buffer without a side channel.
pub struct Lz4Codec;

impl ByteCodec for Lz4Codec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(lz4_flex::decompress_size_prepended(data)?)
    }

    fn max_compressed_len(&self, uncompressed: usize) -> usize {
        lz4_flex::block::get_maximum_output_size(uncompressed) + 4
    }
}

pub struct GzipCodec;

impl ByteCodec for GzipCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }

    fn max_compressed_len(&self, uncompressed: usize) -> usize {
        // Stored deflate blocks cost ~5 bytes per 16 KiB plus the gzip
        // header and trailer.
        uncompressed + uncompressed / 16_384 * 5 + 64
    }
}

pub struct ZstdCodec;

impl ByteCodec for ZstdCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(zstd::encode_all(data, 3)?)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(zstd::decode_all(data)?)
    }

    fn max_compressed_len(&self, uncompressed: usize) -> usize {
        zstd::zstd_safe::compress_bound(uncompressed)
    }
}

/// LZMA2 inside the xz container.
pub struct XzCodec;

impl ByteCodec for XzCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        xz2::read::XzEncoder::new(data, 6).read_to_end(&mut out)?;
        Ok(out)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        xz2::read::XzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }

    fn max_compressed_len(&self, uncompressed: usize) -> usize {
        // Hard to bound tightly; container overhead dominates small inputs.
        uncompressed + 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Algorithm::Uncompressed)]
    #[test_case(Algorithm::Snappy)]
    #[test_case(Algorithm::Lz4)]
    #[test_case(Algorithm::Gzip)]
    #[test_case(Algorithm::Zstd)]
    #[test_case(Algorithm::Lzma2)]
    fn backend_roundtrip(algorithm: Algorithm) {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let codec = codec_for(algorithm);
        let compressed = codec.compress(&data).unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }

    #[test_case(Algorithm::Snappy)]
    #[test_case(Algorithm::Lz4)]
    #[test_case(Algorithm::Gzip)]
    #[test_case(Algorithm::Zstd)]
    #[test_case(Algorithm::Lzma2)]
    fn empty_input_roundtrip(algorithm: Algorithm) {
        let codec = codec_for(algorithm);
        let compressed = codec.compress(&[]).unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn tags_resolve_both_ways() {
        for algorithm in [
            Algorithm::Uncompressed,
            Algorithm::Snappy,
            Algorithm::Lz4,
            Algorithm::Gzip,
            Algorithm::Zstd,
            Algorithm::Lzma2,
        ] {
            assert_eq!(Algorithm::from_name(algorithm.name()).unwrap(), algorithm);
        }
        assert!(matches!(
            Algorithm::from_name("BROTLI"),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn compressed_size_stays_within_bound() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
        for algorithm in [Algorithm::Snappy, Algorithm::Lz4, Algorithm::Gzip, Algorithm::Zstd] {
            let codec = codec_for(algorithm);
            let compressed = codec.compress(&data).unwrap();
            assert!(
                compressed.len() <= codec.max_compressed_len(data.len()),
                "{algorithm} exceeded its own bound"
            );
        }
    }
}
