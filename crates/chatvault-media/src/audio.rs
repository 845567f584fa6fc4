//! Ogg/Opus container analysis for outbound voice notes.
//!
//! Only enough of the container is parsed to derive a playback duration:
//! page headers, the segment table and the `OpusHead` identification header.
//! Packet payloads are never decoded.

use thiserror::Error;
use tracing::{debug, warn};

use crate::waveform::{synthesize_waveform, WAVEFORM_LEN};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Not an Ogg stream")]
    UnsupportedFormat,
}

pub const OGG_MAGIC: &[u8; 4] = b"OggS";
const OPUS_HEAD: &[u8; 8] = b"OpusHead";

/// Fixed part of an Ogg page header, up to and including the segment count.
const PAGE_HEADER_LEN: usize = 27;

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const MIN_DURATION_SECS: u32 = 1;
pub const MAX_DURATION_SECS: u32 = 300;

/// Bytes per second assumed when no granule position is present.
const FALLBACK_BYTES_PER_SEC: usize = 2_000;

/// Result of analysing a voice note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceAnalysis {
    pub seconds: u32,
    pub waveform: [u8; WAVEFORM_LEN],
}

/// Duration and waveform for an Ogg/Opus buffer.
pub fn analyze(data: &[u8]) -> Result<VoiceAnalysis, AudioError> {
    let seconds = ogg_opus_duration(data)?;
    Ok(VoiceAnalysis {
        seconds,
        waveform: synthesize_waveform(seconds),
    })
}

#[derive(Debug, Clone, Copy)]
struct OpusHeader {
    pre_skip: u16,
    sample_rate: u32,
}

/// Playback duration in whole seconds, clamped to
/// [`MIN_DURATION_SECS`]..=[`MAX_DURATION_SECS`].
pub fn ogg_opus_duration(data: &[u8]) -> Result<u32, AudioError> {
    if !data.starts_with(OGG_MAGIC) {
        return Err(AudioError::UnsupportedFormat);
    }

    let mut header: Option<OpusHeader> = None;
    let mut last_granule: u64 = 0;

    let mut i = 0;
    while i + PAGE_HEADER_LEN < data.len() {
        if &data[i..i + 4] != OGG_MAGIC {
            // Lost sync, scan forward for the next capture pattern.
            i += 1;
            continue;
        }

        let granule = read_u64_le(data, i + 6);
        let sequence = read_u32_le(data, i + 18);
        let segments = data[i + 26] as usize;

        if i + PAGE_HEADER_LEN + segments >= data.len() {
            break;
        }

        let table = &data[i + PAGE_HEADER_LEN..i + PAGE_HEADER_LEN + segments];
        let body_len: usize = table.iter().map(|&b| b as usize).sum();
        let page_len = PAGE_HEADER_LEN + segments + body_len;
        let page = &data[i..(i + page_len).min(data.len())];

        if header.is_none() && sequence <= 1 {
            header = find_opus_head(page);
            if let Some(h) = header {
                debug!(sample_rate = h.sample_rate, pre_skip = h.pre_skip, "found OpusHead");
            }
        }

        // All-ones means no packet finishes on this page.
        if granule != 0 && granule != u64::MAX {
            last_granule = granule;
        }

        i += page_len;
    }

    let seconds = if last_granule > 0 {
        let (pre_skip, sample_rate) = header
            .map(|h| (u64::from(h.pre_skip), h.sample_rate))
            .unwrap_or((0, DEFAULT_SAMPLE_RATE));
        let rate = if sample_rate == 0 {
            DEFAULT_SAMPLE_RATE
        } else {
            sample_rate
        };
        let samples = last_granule.saturating_sub(pre_skip);
        u32::try_from(samples.div_ceil(u64::from(rate))).unwrap_or(u32::MAX)
    } else {
        // Rough bitrate guess, no accuracy guarantee.
        let estimate = u32::try_from(data.len() / FALLBACK_BYTES_PER_SEC).unwrap_or(u32::MAX);
        warn!(bytes = data.len(), estimate, "no granule position, estimating duration from size");
        estimate
    };

    Ok(seconds.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS))
}

/// Identification header layout: magic (8), version (1), channels (1),
/// pre-skip (u16 LE), input sample rate (u32 LE).
fn find_opus_head(page: &[u8]) -> Option<OpusHeader> {
    let pos = page.windows(OPUS_HEAD.len()).position(|w| w == OPUS_HEAD)?;
    let head = &page[pos..];
    if head.len() < 16 {
        return None;
    }
    Some(OpusHeader {
        pre_skip: u16::from_le_bytes([head[10], head[11]]),
        sample_rate: read_u32_le(head, 12),
    })
}

fn read_u32_le(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64_le(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One Ogg page with a single segment carrying `body` (at most 255 bytes).
    pub(crate) fn page(sequence: u32, granule: u64, body: &[u8]) -> Vec<u8> {
        assert!(body.len() <= 255);
        let mut out = Vec::new();
        out.extend_from_slice(OGG_MAGIC);
        out.push(0); // version
        out.push(if sequence == 0 { 0x02 } else { 0x00 });
        out.extend_from_slice(&granule.to_le_bytes());
        out.extend_from_slice(&0x1234_5678u32.to_le_bytes()); // serial
        out.extend_from_slice(&sequence.to_le_bytes());
        out.extend_from_slice(&[0; 4]); // crc, not checked
        out.push(1);
        out.push(body.len() as u8);
        out.extend_from_slice(body);
        out
    }

    pub(crate) fn opus_head(pre_skip: u16, sample_rate: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(OPUS_HEAD);
        out.push(1); // version
        out.push(1); // channels
        out.extend_from_slice(&pre_skip.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&[0, 0, 0]); // gain, mapping family
        out
    }

    /// Five-page voice note: OpusHead, OpusTags and three audio pages.
    pub(crate) fn voice_note(pre_skip: u16, sample_rate: u32, final_granule: u64) -> Vec<u8> {
        let mut data = page(0, 0, &opus_head(pre_skip, sample_rate));
        data.extend(page(1, 0, b"OpusTags\0\0\0\0\0\0\0\0"));
        data.extend(page(2, final_granule / 3, &[0xAA; 120]));
        data.extend(page(3, final_granule / 3 * 2, &[0xBB; 120]));
        data.extend(page(4, final_granule, &[0xCC; 60]));
        data
    }

    #[test]
    fn rejects_non_ogg_input() {
        assert_eq!(analyze(b"RIFF....WAVE"), Err(AudioError::UnsupportedFormat));
        assert_eq!(analyze(b""), Err(AudioError::UnsupportedFormat));
        assert_eq!(analyze(b"Ogg"), Err(AudioError::UnsupportedFormat));
    }

    #[test]
    fn duration_from_final_granule() {
        let data = voice_note(312, 48_000, 240_000);
        assert_eq!(ogg_opus_duration(&data).unwrap(), 5);
    }

    #[test]
    fn duration_rounds_up() {
        let data = voice_note(0, 48_000, 48_001);
        assert_eq!(ogg_opus_duration(&data).unwrap(), 2);
    }

    #[test]
    fn uses_header_sample_rate() {
        let data = voice_note(0, 16_000, 160_000);
        assert_eq!(ogg_opus_duration(&data).unwrap(), 10);
    }

    #[test]
    fn zero_sample_rate_falls_back_to_default() {
        let data = voice_note(0, 0, 96_000);
        assert_eq!(ogg_opus_duration(&data).unwrap(), 2);
    }

    #[test]
    fn trailing_zero_granule_keeps_last_real_one() {
        let mut data = voice_note(0, 48_000, 144_000);
        data.extend(page(5, 0, &[0xDD; 10]));
        data.extend(page(6, u64::MAX, &[0xEE; 10]));
        assert_eq!(ogg_opus_duration(&data).unwrap(), 3);
    }

    #[test]
    fn resyncs_after_garbage() {
        let mut data = page(0, 0, &opus_head(0, 48_000));
        data.extend_from_slice(b"garbage between pages");
        data.extend(page(1, 240_000, &[0x11; 50]));
        assert_eq!(ogg_opus_duration(&data).unwrap(), 5);
    }

    #[test]
    fn duration_is_clamped() {
        let long = voice_note(0, 48_000, 48_000 * 1_000);
        assert_eq!(ogg_opus_duration(&long).unwrap(), MAX_DURATION_SECS);

        let short = voice_note(0, 48_000, 10);
        assert_eq!(ogg_opus_duration(&short).unwrap(), MIN_DURATION_SECS);
    }

    #[test]
    fn size_estimate_without_granule() {
        // Header page followed by 20 kB of pages that never carry a granule.
        let mut data = page(0, 0, &opus_head(0, 48_000));
        let mut seq = 1;
        while data.len() < 20_000 {
            data.extend(page(seq, 0, &[0x55; 255]));
            seq += 1;
        }
        let expected = (data.len() / 2_000) as u32;
        assert_eq!(ogg_opus_duration(&data).unwrap(), expected);
    }

    #[test]
    fn truncated_page_does_not_panic() {
        let mut data = voice_note(312, 48_000, 240_000);
        data.truncate(data.len() - 30);
        assert!(ogg_opus_duration(&data).is_ok());

        let header_only = &OGG_MAGIC[..];
        assert_eq!(ogg_opus_duration(header_only).unwrap(), MIN_DURATION_SECS);
    }

    #[test]
    fn analysis_includes_waveform() {
        let a = analyze(&voice_note(312, 48_000, 240_000)).unwrap();
        assert_eq!(a.seconds, 5);
        assert_eq!(a.waveform, synthesize_waveform(5));
    }
}
