//! Collaborators consulted while entries are imported.
//!
//! Both are passed explicitly through [`crate::ArchiveOptions`] rather than living in a process
//! wide registry.

use std::borrow::Cow;
use std::fmt::{self, Debug};

use derive_more::Display;

use crate::entry::EntryRecord;

/// Identifier of a detected entry type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{_0}")]
pub struct TypeId(Cow<'static, str>);

impl TypeId {
    pub const UNKNOWN: TypeId = TypeId::from_static("unknown");
    pub const FOLDER: TypeId = TypeId::from_static("folder");
    pub const MARKER: TypeId = TypeId::from_static("marker");
    pub const TEXT: TypeId = TypeId::from_static("text");
    pub const WAD: TypeId = TypeId::from_static("wad");
    pub const WAV: TypeId = TypeId::from_static("wav");
    pub const PNG: TypeId = TypeId::from_static("png");
    pub const ZIP: TypeId = TypeId::from_static("zip");
    pub const RFF: TypeId = TypeId::from_static("rff");
    pub const MIDI: TypeId = TypeId::from_static("midi");
    pub const VOC: TypeId = TypeId::from_static("voc");

    pub const fn from_static(id: &'static str) -> Self {
        TypeId(Cow::Borrowed(id))
    }

    pub fn new(id: impl Into<String>) -> Self {
        TypeId(Cow::Owned(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sniffs the type of an entry from its name and bytes
pub trait TypeDetector: Send + Sync {
    fn detect(&self, entry: &EntryRecord) -> TypeId;
}

/// Signature based detection of the formats commonly found in game data
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicTypeDetector;

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"IWAD", "wad"),
    (b"PWAD", "wad"),
    (b"\x89PNG\r\n\x1a\n", "png"),
    (b"PK\x03\x04", "zip"),
    (b"MThd", "midi"),
    (b"Creative Voice File", "voc"),
    (b"RFF\x1a", "rff"),
];

impl TypeDetector for BasicTypeDetector {
    fn detect(&self, entry: &EntryRecord) -> TypeId {
        if entry.is_folder() {
            return TypeId::FOLDER;
        }
        if entry.size() == 0 {
            return TypeId::MARKER;
        }
        let Some(data) = entry.data() else {
            return entry.type_id().clone();
        };

        if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WAVE" {
            return TypeId::WAV;
        }
        if let Some((_, id)) = SIGNATURES.iter().find(|(magic, _)| data.starts_with(magic)) {
            return TypeId::from_static(*id);
        }

        match std::str::from_utf8(data) {
            Ok(text) if text.chars().all(|c| !c.is_control() || c.is_ascii_whitespace()) => {
                TypeId::TEXT
            }
            _ => TypeId::UNKNOWN,
        }
    }
}

/// Receives coarse progress of long running scans
pub trait ProgressSink: Send + Sync {
    fn report_progress(&self, message: &str, fraction: f32);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, f32) + Send + Sync,
{
    fn report_progress(&self, message: &str, fraction: f32) {
        self(message, fraction)
    }
}

impl Debug for dyn ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProgressSink")
    }
}

impl Debug for dyn TypeDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDetector")
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use crate::detect::{BasicTypeDetector, ProgressSink, TypeDetector, TypeId};
    use crate::entry::EntryRecord;

    fn detect(data: &[u8]) -> TypeId {
        BasicTypeDetector.detect(&EntryRecord::with_data("X", data.to_vec()))
    }

    #[test]
    fn signatures() {
        assert_eq!(detect(b"PWAD\x00\x00\x00\x00"), TypeId::WAD);
        assert_eq!(detect(b"RIFF\x24\x00\x00\x00WAVEfmt "), TypeId::WAV);
        assert_eq!(detect(b"\x89PNG\r\n\x1a\n...."), TypeId::PNG);
        assert_eq!(detect(b"MThd\x00\x00\x00\x06"), TypeId::MIDI);
        assert_eq!(detect(b"RFF\x1a\x01\x03\x00\x00"), TypeId::RFF);
    }

    #[test]
    fn text_marker_and_unknown() {
        assert_eq!(detect(b"[level]\nname = e1m1\n"), TypeId::TEXT);
        assert_eq!(detect(b""), TypeId::MARKER);
        assert_eq!(detect(&[0x00, 0x01, 0xFE, 0xFF]), TypeId::UNKNOWN);
    }

    #[test]
    fn unloaded_entry_keeps_its_type() {
        let mut entry = EntryRecord::with_data("A", b"PWAD....".to_vec());
        entry.set_type(TypeId::WAD);
        entry.unload_data();

        assert_eq!(BasicTypeDetector.detect(&entry), TypeId::WAD);
    }

    #[test]
    fn closures_are_progress_sinks() {
        let calls = AtomicUsize::new(0);
        let sink = |_: &str, _: f32| {
            calls.fetch_add(1, Ordering::Relaxed);
        };
        sink.report_progress("scan", 0.5);
        sink.report_progress("scan", 1.0);

        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
