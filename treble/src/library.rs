//! Ingestion of zipped text method libraries.
//!
//! A library is a zip archive of plain text.  Outside its header, each line reads
//! `<Name> <Code> <PlaceNotation>` (names may contain spaces; the code and notation are the last
//! two fields).  Lines starting `**` are comments, and a line whose name is `Zzz` terminates the
//! list.

use std::{fmt::Display, fs::File, io::Read, path::Path};

use itertools::Itertools;

/// Method names longer than this are truncated for display.
pub const DISPLAY_NAME_LEN: usize = 28;

/// The sentinel name which ends the logical method list.
const TERMINATOR: &str = "Zzz";

/// An error created when a method library can't be loaded.
#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Zip(zip::result::ZipError),
    /// The archive contained no method lines at all
    Empty,
}

impl Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(e) => write!(f, "error reading library: {}", e),
            LibraryError::Zip(e) => write!(f, "error unzipping library: {}", e),
            LibraryError::Empty => write!(f, "library contains no methods"),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(e: std::io::Error) -> Self {
        LibraryError::Io(e)
    }
}

impl From<zip::result::ZipError> for LibraryError {
    fn from(e: zip::result::ZipError) -> Self {
        LibraryError::Zip(e)
    }
}

/// One method listed in a library.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LibraryMethod {
    pub name: String,
    pub code: String,
    pub place_notation: String,
}

impl LibraryMethod {
    /// The method's name, truncated to [`DISPLAY_NAME_LEN`] characters for display.
    pub fn display_name(&self) -> &str {
        match self.name.char_indices().nth(DISPLAY_NAME_LEN) {
            Some((idx, _)) => &self.name[..idx],
            None => &self.name,
        }
    }
}

/// A library of named methods, loaded from a zipped text file.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct MethodLibrary {
    methods: Vec<LibraryMethod>,
}

impl MethodLibrary {
    /// Loads a library from a zip archive on disk.
    pub fn from_zip_path(path: &Path) -> Result<Self, LibraryError> {
        Self::from_zip(File::open(path)?)
    }

    /// Loads a library from any seekable zip archive.
    pub fn from_zip<R: Read + std::io::Seek>(reader: R) -> Result<Self, LibraryError> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut text = String::new();
        for idx in 0..archive.len() {
            archive.by_index(idx)?.read_to_string(&mut text)?;
            text.push('\n');
        }
        Self::from_text(&text)
    }

    /// Parses a library from its unzipped text.
    pub fn from_text(text: &str) -> Result<Self, LibraryError> {
        let mut methods = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.starts_with("**") {
                continue;
            }
            let fields = line.split_whitespace().collect_vec();
            // Header and blank lines don't have all three fields
            if fields.len() < 3 {
                continue;
            }
            let name = fields[..fields.len() - 2].join(" ");
            if name == TERMINATOR {
                break;
            }
            // Header lines can have three or more words too; a real method line always ends in
            // place notation
            if !looks_like_notation(fields[fields.len() - 1]) {
                continue;
            }
            methods.push(LibraryMethod {
                name,
                code: fields[fields.len() - 2].to_owned(),
                place_notation: fields[fields.len() - 1].to_owned(),
            });
        }
        if methods.is_empty() {
            return Err(LibraryError::Empty);
        }
        Ok(MethodLibrary { methods })
    }

    /// The methods in this library, in file order.
    pub fn methods(&self) -> &[LibraryMethod] {
        &self.methods
    }

    /// Looks a method up by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&LibraryMethod> {
        self.methods
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// The library name closest to `name`, for "did you mean ...?" suggestions after a failed
    /// [`get`](Self::get).
    pub fn nearest_name(&self, name: &str) -> Option<&str> {
        self.methods
            .iter()
            .min_by_key(|m| edit_distance::edit_distance(&m.name.to_lowercase(), &name.to_lowercase()))
            .map(|m| m.name.as_str())
    }
}

/// `true` if `s` could be place notation: bell names plus the structural characters of any of
/// the accepted formats.
fn looks_like_notation(s: &str) -> bool {
    s.chars().all(|c| {
        crate::BELL_NAMES.contains(c.to_ascii_uppercase()) || "X-.&,+L".contains(c.to_ascii_uppercase())
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use super::*;

    const LIBRARY_TEXT: &str = "\
Eight bell methods collection
** comment lines are ignored
Cambridge S8 b x38x14x1258x36x14x58x16x78
Yorkshire S8 b x38x14x58x16x12x38x14x78
Lincolnshire S8 b x38x14x58x16x14x58x36x78
Zzz zz xxxxxxxx
Ignored After Terminator b x18x18x18x18
";

    fn zipped(text: &str) -> Cursor<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("methods.txt", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(text.as_bytes()).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn parses_fields_and_terminator() {
        let lib = MethodLibrary::from_text(LIBRARY_TEXT).unwrap();
        assert_eq!(lib.methods().len(), 3);
        let cambridge = lib.get("cambridge s8").unwrap();
        assert_eq!(cambridge.code, "b");
        assert_eq!(cambridge.place_notation, "x38x14x1258x36x14x58x16x78");
        assert!(lib.get("Ignored After Terminator").is_none());
    }

    #[test]
    fn round_trips_through_zip() {
        let lib = MethodLibrary::from_zip(zipped(LIBRARY_TEXT)).unwrap();
        assert_eq!(lib, MethodLibrary::from_text(LIBRARY_TEXT).unwrap());
    }

    #[test]
    fn suggests_near_misses() {
        let lib = MethodLibrary::from_text(LIBRARY_TEXT).unwrap();
        assert_eq!(lib.get("Yorksire S8"), None);
        assert_eq!(lib.nearest_name("Yorksire S8"), Some("Yorkshire S8"));
    }

    #[test]
    fn display_name_truncates() {
        let method = LibraryMethod {
            name: "A".repeat(DISPLAY_NAME_LEN + 10),
            code: "b".to_owned(),
            place_notation: "x18".to_owned(),
        };
        assert_eq!(method.display_name().len(), DISPLAY_NAME_LEN);
    }
}
