//! File classification: which storage strategy a name/size pair gets.
//!
//! The decision is advisory; the engine may still downgrade a delta
//! candidate to direct storage when the produced delta is too large.

use deltaglider_common::MIN_DELTA_SIZE;

/// Storage strategy suggested for an incoming object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// Versioned archive; worth encoding against a group reference.
    DeltaCandidate,
    /// Stored verbatim; delta yield known to be poor for this family.
    Direct,
    /// Below the minimum size floor; delta overhead dominates.
    SkipSmall,
}

/// Extension families that delta-compress well (versioned archive formats).
const ARCHIVE_EXTENSIONS: &[&str] = &[
    "zip", "tar", "tar.gz", "tgz", "tar.bz2", "tbz2", "tar.xz", "txz", "7z", "jar", "war", "ear",
    "apk", "ipa", "dmg", "deb", "rpm", "msi", "nupkg", "whl",
];

/// Text and metadata families stored verbatim.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "json", "yaml", "yml", "xml", "csv", "log", "sha1", "sha256", "sha512", "md5",
    "asc", "sig",
];

/// Raw executable formats; empirically poor delta yield.
const EXECUTABLE_EXTENSIONS: &[&str] = &["exe", "dll", "so", "dylib"];

/// Classify a file by name and size.
///
/// # Arguments
/// * `filename` - Bare filename (no path components required)
/// * `size` - Original byte length
pub fn classify(filename: &str, size: u64) -> FileClass {
    if size < MIN_DELTA_SIZE {
        return FileClass::SkipSmall;
    }

    let ext: String = extension_cluster(filename);
    if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) {
        return FileClass::DeltaCandidate;
    }
    if TEXT_EXTENSIONS.contains(&ext.as_str()) || EXECUTABLE_EXTENSIONS.contains(&ext.as_str()) {
        return FileClass::Direct;
    }

    // Unknown extension at or above the floor: assume versioned binary.
    FileClass::DeltaCandidate
}

/// Normalized extension cluster of a filename, lowercased.
///
/// Compound archive extensions resolve as a unit (`tar.gz`, not `gz`), and
/// the short forms normalize onto them (`tgz` -> `tar.gz`).
pub fn extension_cluster(filename: &str) -> String {
    let lower: String = filename.to_ascii_lowercase();

    for (compound, _canonical) in COMPOUND_EXTENSIONS {
        if lower.ends_with(&format!(".{compound}")) {
            return (*compound).to_string();
        }
    }

    match lower.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_string(),
        _ => String::new(),
    }
}

/// Canonical family of a filename, for grouping.
///
/// Short archive forms map onto their compound cluster so `app.tgz` and
/// `app.tar.gz` land in one group. Files with no extension family as "bin".
pub fn family(filename: &str) -> String {
    let ext: String = extension_cluster(filename);
    if ext.is_empty() {
        return "bin".to_string();
    }
    for (variant, canonical) in COMPOUND_EXTENSIONS {
        if ext == *variant {
            return (*canonical).to_string();
        }
    }
    match ext.as_str() {
        "tgz" => "tar.gz".to_string(),
        "tbz2" => "tar.bz2".to_string(),
        "txz" => "tar.xz".to_string(),
        other => other.to_string(),
    }
}

/// Compound extensions and the canonical family each maps to.
const COMPOUND_EXTENSIONS: &[(&str, &str)] = &[
    ("tar.gz", "tar.gz"),
    ("tar.bz2", "tar.bz2"),
    ("tar.xz", "tar.xz"),
];

#[cfg(test)]
mod tests {
    use super::*;

    const BIG: u64 = 10 * 1024 * 1024;

    #[test]
    fn test_small_files_skip_delta() {
        assert_eq!(classify("release.zip", 1024), FileClass::SkipSmall);
        assert_eq!(classify("release.zip", MIN_DELTA_SIZE - 1), FileClass::SkipSmall);
        assert_eq!(classify("release.zip", MIN_DELTA_SIZE), FileClass::DeltaCandidate);
    }

    #[test]
    fn test_archive_families_are_candidates() {
        for name in [
            "v1.0.0.zip",
            "bundle.tar.gz",
            "bundle.tgz",
            "installer.msi",
            "pkg.deb",
            "lib.whl",
            "app.apk",
        ] {
            assert_eq!(classify(name, BIG), FileClass::DeltaCandidate, "{name}");
        }
    }

    #[test]
    fn test_text_and_executables_direct() {
        for name in ["notes.txt", "build.log", "manifest.json", "sums.sha256"] {
            assert_eq!(classify(name, BIG), FileClass::Direct, "{name}");
        }
        for name in ["app.exe", "libfoo.so", "core.dll", "libbar.dylib"] {
            assert_eq!(classify(name, BIG), FileClass::Direct, "{name}");
        }
    }

    #[test]
    fn test_unknown_large_defaults_to_candidate() {
        assert_eq!(classify("firmware.img", BIG), FileClass::DeltaCandidate);
        assert_eq!(classify("blob", BIG), FileClass::DeltaCandidate);
    }

    #[test]
    fn test_extension_cluster_compound() {
        assert_eq!(extension_cluster("a.tar.gz"), "tar.gz");
        assert_eq!(extension_cluster("a.tar.bz2"), "tar.bz2");
        assert_eq!(extension_cluster("A.ZIP"), "zip");
        assert_eq!(extension_cluster("noext"), "");
        assert_eq!(extension_cluster(".hidden"), "");
    }

    #[test]
    fn test_family_normalizes_short_forms() {
        assert_eq!(family("a.tgz"), "tar.gz");
        assert_eq!(family("a.tar.gz"), "tar.gz");
        assert_eq!(family("a.tbz2"), "tar.bz2");
        assert_eq!(family("a.txz"), "tar.xz");
        assert_eq!(family("a.zip"), "zip");
        assert_eq!(family("blob"), "bin");
    }
}
