use super::{ModInfo, ModuleProber, ModuleSource};
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

// MOD signatures sit right after 31 sample headers and the order table
const MOD_SIGNATURE_OFFSET: usize = 1080;
const HEADER_LEN: usize = MOD_SIGNATURE_OFFSET + 4;

const XM_MAGIC: &[u8] = b"Extended Module: ";
const IT_MAGIC: &[u8] = b"IMPM";
const S3M_MAGIC: &[u8] = b"SCRM";
const S3M_MAGIC_OFFSET: usize = 44;

/// Recognizes the common tracker formats from their headers alone.
///
/// Cheap stand-in for a full native loader: it only answers "does this
/// look like a module" and pulls the title, it never decodes patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderProber;

impl HeaderProber {
    pub fn new() -> Self {
        Self
    }

    /// Identify a module from its first bytes.
    pub fn identify(header: &[u8]) -> Option<ModInfo> {
        if header.starts_with(IT_MAGIC) {
            return Some(ModInfo::new(text_field(header, 4, 26), "Impulse Tracker"));
        }

        if header.starts_with(XM_MAGIC) {
            let tracker = text_field(header, 38, 20);
            let module_type = if tracker.is_empty() {
                "FastTracker II".to_string()
            } else {
                tracker
            };
            return Some(ModInfo::new(text_field(header, 17, 20), module_type));
        }

        if header.get(S3M_MAGIC_OFFSET..S3M_MAGIC_OFFSET + 4) == Some(S3M_MAGIC) {
            return Some(ModInfo::new(text_field(header, 0, 28), "Scream Tracker 3"));
        }

        let signature = header.get(MOD_SIGNATURE_OFFSET..HEADER_LEN)?;
        let tracker = mod_tracker(signature)?;
        let module_type = format!("{} ({})", tracker, String::from_utf8_lossy(signature));
        Some(ModInfo::new(text_field(header, 0, 20), module_type))
    }
}

impl ModuleProber for HeaderProber {
    fn test_module(&self, source: &mut dyn ModuleSource) -> Option<ModInfo> {
        if let Err(e) = source.seek(SeekFrom::Start(0)) {
            debug!("Header probe could not rewind source: {}", e);
            return None;
        }

        let mut header = Vec::with_capacity(HEADER_LEN);
        if let Err(e) = (&mut *source).take(HEADER_LEN as u64).read_to_end(&mut header) {
            debug!("Header probe read failed: {}", e);
            return None;
        }

        Self::identify(&header)
    }
}

fn mod_tracker(signature: &[u8]) -> Option<&'static str> {
    match signature {
        b"M.K." | b"M!K!" | b"M&K!" => Some("Protracker"),
        b"N.T." => Some("Noisetracker"),
        b"FLT4" | b"FLT8" => Some("Startrekker"),
        b"CD81" | b"OKTA" => Some("Octalyser"),
        [n, b'C', b'H', b'N'] if n.is_ascii_digit() => Some("Fast Tracker"),
        [tens, ones, b'C', b'H'] if tens.is_ascii_digit() && ones.is_ascii_digit() => {
            Some("Fast Tracker")
        }
        _ => None,
    }
}

// Fixed-width, NUL-padded title field; missing bytes read as empty
fn text_field(header: &[u8], offset: usize, len: usize) -> String {
    let end = (offset + len).min(header.len());
    let raw = header.get(offset..end).unwrap_or_default();
    let raw = raw.split(|&b| b == 0).next().unwrap_or_default();
    String::from_utf8_lossy(raw).trim().to_string()
}
