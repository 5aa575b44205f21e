//! Decoders turning encoded fragments into interleaved f32 samples
//!
//! The player only depends on the [`Decoder`] trait. Two implementations ship
//! with the crate:
//! - [`PcmDecoder`]: raw little-endian PCM, the usual TTS wire payload
//! - [`SymphoniaDecoder`]: each fragment is a self-contained encoded segment
//!   (WAV, MP3, FLAC, Ogg Vorbis, AAC) decoded via symphonia

use crate::audio::format::AudioFormat;
use crate::audio::resampler::Resampler;
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Turns encoded bytes into interleaved f32 samples in the player's format.
///
/// Called only from the player's serialized queue, one fragment at a time and
/// in arrival order, so implementations may keep state between calls.
pub trait Decoder: Send {
    /// Decode one fragment. May return an empty vector when the fragment only
    /// completes a partial sample held from the previous call.
    fn decode(&mut self, bytes: &[u8]) -> Result<Vec<f32>>;

    /// Format of the samples this decoder produces, if known up front
    fn native_format(&self) -> Option<AudioFormat>;

    /// Drop any carried state before a new stream
    fn reset(&mut self) {}
}

/// Raw PCM sample encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmEncoding {
    /// Signed 16-bit little-endian
    S16Le,
    /// IEEE float 32-bit little-endian
    F32Le,
}

impl PcmEncoding {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            PcmEncoding::S16Le => 2,
            PcmEncoding::F32Le => 4,
        }
    }
}

impl std::str::FromStr for PcmEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s16le" | "s16" => Ok(PcmEncoding::S16Le),
            "f32le" | "f32" => Ok(PcmEncoding::F32Le),
            other => Err(Error::UnsupportedFormat(format!("unknown PCM encoding '{}'", other))),
        }
    }
}

/// Decoder for raw interleaved PCM.
///
/// Network fragments rarely end on a sample boundary; trailing bytes are held
/// and prefixed to the next fragment.
pub struct PcmDecoder {
    format: AudioFormat,
    encoding: PcmEncoding,
    pending: Vec<u8>,
}

impl PcmDecoder {
    pub fn new(format: AudioFormat, encoding: PcmEncoding) -> Self {
        Self {
            format,
            encoding,
            pending: Vec::new(),
        }
    }

    /// Bytes held back waiting for the rest of a sample
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}

impl Decoder for PcmDecoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<Vec<f32>> {
        let width = self.encoding.bytes_per_sample();

        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(bytes);

        let whole = data.len() - data.len() % width;
        let mut samples = Vec::with_capacity(whole / width);

        for raw in data[..whole].chunks_exact(width) {
            let sample = match self.encoding {
                PcmEncoding::S16Le => i16::from_le_bytes([raw[0], raw[1]]) as f32 / 32768.0,
                PcmEncoding::F32Le => {
                    let value = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                    if !value.is_finite() {
                        return Err(Error::Decode(format!(
                            "non-finite f32 sample at byte {}",
                            samples.len() * width
                        )));
                    }
                    value
                }
            };
            samples.push(sample);
        }

        self.pending = data[whole..].to_vec();
        Ok(samples)
    }

    fn native_format(&self) -> Option<AudioFormat> {
        Some(self.format)
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Decoder for self-contained encoded segments via symphonia.
///
/// Output is converted to `output` (channel remap, then rubato resampling when
/// the segment's rate differs).
pub struct SymphoniaDecoder {
    output: AudioFormat,
    hint_extension: Option<String>,
}

impl SymphoniaDecoder {
    pub fn new(output: AudioFormat) -> Self {
        Self {
            output,
            hint_extension: None,
        }
    }

    /// Container extension hint (e.g. "mp3") to speed up probing
    pub fn with_hint(mut self, extension: impl Into<String>) -> Self {
        self.hint_extension = Some(extension.into());
        self
    }

    /// Read the native format of an encoded segment without decoding it.
    pub fn probe_format(bytes: &[u8], hint_extension: Option<&str>) -> Result<AudioFormat> {
        let format = open_reader(bytes.to_vec(), hint_extension)?;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::UnsupportedFormat("sample rate not found".to_string()))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::UnsupportedFormat("channel count not found".to_string()))?;

        Ok(AudioFormat::new(sample_rate, channels))
    }

    fn decode_segment(&self, bytes: &[u8]) -> Result<(Vec<f32>, AudioFormat)> {
        let mut format = open_reader(bytes.to_vec(), self.hint_extension.as_deref())?;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();
        let mut source: Option<AudioFormat> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    source.get_or_insert(AudioFormat::new(spec.rate, spec.channels.count() as u16));
                    let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(sample_buf.samples());
                }
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            }
        }

        let source = source.ok_or_else(|| Error::Decode("segment contained no audio".to_string()))?;
        Ok((samples, source))
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<Vec<f32>> {
        let (samples, source) = self.decode_segment(bytes)?;

        let remapped = remap_channels(&samples, source.channels, self.output.channels);
        let converted = if source.sample_rate == self.output.sample_rate {
            remapped
        } else {
            Resampler::resample(
                &remapped,
                source.sample_rate,
                self.output.sample_rate,
                self.output.channels,
            )?
        };

        debug!(
            "Decoded segment: {} bytes, source {}, {} output samples",
            bytes.len(),
            source,
            converted.len()
        );
        Ok(converted)
    }

    fn native_format(&self) -> Option<AudioFormat> {
        Some(self.output)
    }
}

fn open_reader(bytes: Vec<u8>, hint_extension: Option<&str>) -> Result<Box<dyn FormatReader>> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = hint_extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

    Ok(probed.format)
}

/// Convert interleaved samples between channel counts.
///
/// Mono is duplicated into every output channel; extra input channels beyond
/// the output count are dropped; downmix to mono averages.
pub fn remap_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    let (from, to) = (from.max(1) as usize, to.max(1) as usize);
    if from == to {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else {
            for ch in 0..to {
                out.push(frame.get(ch).copied().unwrap_or(0.0));
            }
        }
    }
    out
}
