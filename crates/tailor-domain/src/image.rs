//! Image file names of the form `<name>_<YYYYMMDD.HHMMSS>.<extension>`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ImageEntry {
    pub name: String,
    pub version: String,
    pub extension: String,
}

impl ImageEntry {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            extension: extension.into(),
        }
    }
}

impl fmt::Display for ImageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}.{}", self.name, self.version, self.extension)
    }
}

/// `<name>_<YYYYMMDD><sep><HHMMSS><sep><extension>`, searched anywhere in a key.
static IMAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\w.-]+)_(\d{8}.\d{6}).(.*)").expect("image name regex is valid")
});

/// Finds an image name anywhere in `key`, typically an object key such as
/// `release/images/org/desktop_20240105.093000.img`.
///
/// The separators around the time part are any single character, and the
/// leftmost match wins.
pub fn parse_image_name(key: &str) -> Option<ImageEntry> {
    let captures = IMAGE_REGEX.captures(key)?;
    Some(ImageEntry::new(&captures[1], &captures[2], &captures[3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_keys() {
        let entry = parse_image_name("ros/images/acme/desktop-focal_20240105.093000.img.gz")
            .expect("entry");
        assert_eq!(
            entry,
            ImageEntry::new("desktop-focal", "20240105.093000", "img.gz")
        );
        assert_eq!(entry.to_string(), "desktop-focal_20240105.093000.img.gz");
    }

    #[test]
    fn name_may_contain_underscores() {
        let entry = parse_image_name("acme_robot_base_20231231.235959.tar").expect("entry");
        assert_eq!(entry.name, "acme_robot_base");
        assert_eq!(entry.version, "20231231.235959");
        assert_eq!(entry.extension, "tar");
    }

    #[test]
    fn empty_extension_is_allowed() {
        let entry = parse_image_name("img_20231231.235959.").expect("entry");
        assert_eq!(entry.extension, "");
    }

    #[test]
    fn keys_without_versions_are_skipped() {
        assert_eq!(parse_image_name("ros/images/index"), None);
        assert_eq!(parse_image_name("ros/images/acme/notes_2023.txt"), None);
        assert_eq!(parse_image_name("_20231231.235959.img"), None);
    }

    #[test]
    fn separators_are_any_single_character() {
        let entry = parse_image_name("a_20240105/093000.img").expect("entry");
        assert_eq!(entry, ImageEntry::new("a", "20240105/093000", "img"));
    }

    #[test]
    fn first_match_in_key_wins() {
        let entry =
            parse_image_name("rel_20240101.000000x/images/acme/desk_20240102.000000.img")
                .expect("entry");
        assert_eq!(entry.name, "rel");
        assert_eq!(entry.version, "20240101.000000");
        assert_eq!(entry.extension, "/images/acme/desk_20240102.000000.img");
    }
}
