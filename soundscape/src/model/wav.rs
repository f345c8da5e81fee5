//! RIFF/WAVE helpers on top of `hound`.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{ModelError, ModelResult};

/// MIME type of every asset the pipeline stores.
pub const WAV_CONTENT_TYPE: &str = "audio/wav";

const HEADER_LEN: usize = 44;

/// Whether `bytes` starts with a RIFF/WAVE magic.
///
/// This is only a cheap sniff; [`verify`] parses the chunks.
#[must_use]
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Reject payloads that are not decodable WAV audio.
///
/// The `fmt ` and `data` chunks must both be present and well formed.
///
/// # Errors
///
/// Returns [`ModelError::InvalidOutput`] for empty payloads, a missing
/// RIFF/WAVE magic, or a header `hound` cannot read.
pub fn verify(bytes: &[u8]) -> ModelResult<WavSpec> {
    if bytes.is_empty() {
        return Err(ModelError::InvalidOutput("empty payload".to_string()));
    }
    if !is_wav(bytes) {
        let preview = String::from_utf8_lossy(&bytes[..bytes.len().min(16)]).into_owned();
        return Err(ModelError::InvalidOutput(format!(
            "missing RIFF/WAVE header (starts with {preview:?})"
        )));
    }

    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| ModelError::InvalidOutput(format!("unreadable WAV: {e}")))?;
    Ok(reader.spec())
}

/// Encode 16-bit mono PCM samples as a WAV file.
///
/// # Errors
///
/// Returns [`ModelError::InvalidOutput`] if the writer rejects the samples.
pub fn encode_pcm16_mono(samples: &[i16], sample_rate: u32) -> ModelResult<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let encode_err = |e: hound::Error| ModelError::InvalidOutput(format!("WAV encode: {e}"));

    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LEN + samples.len() * 2));
    let mut writer = WavWriter::new(&mut cursor, spec).map_err(encode_err)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(encode_err)?;
    }
    writer.finalize().map_err(encode_err)?;

    Ok(cursor.into_inner())
}
