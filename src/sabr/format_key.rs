use std::fmt;

use super::context::RequestedFormat;
use super::structs::MediaHeader;

/// Identity of one elementary stream: itag, last-modified and xtags.
///
/// Used to tell whether a media header belongs to the format the caller
/// asked for. Two keys are equal only when every field is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormatKey {
    itag: i32,
    last_modified: Option<u64>,
    xtags: Option<String>,
}

impl FormatKey {
    pub fn new(itag: i32, last_modified: Option<u64>, xtags: Option<&str>) -> Self {
        Self {
            itag,
            last_modified,
            xtags: xtags.filter(|x| !x.is_empty()).map(str::to_owned),
        }
    }

    /// The player API reports last-modified as a decimal string.
    pub fn from_format(format: &RequestedFormat) -> Self {
        let last_modified = format
            .last_modified
            .as_deref()
            .and_then(|lm| lm.parse::<u64>().ok());
        Self::new(format.itag, last_modified, format.xtags.as_deref())
    }

    /// Prefers the nested format id and falls back to the header's own
    /// itag/lmt/xtags fields.
    pub fn from_media_header(header: &MediaHeader) -> Self {
        match &header.format_id {
            Some(fid) => Self::new(
                fid.itag,
                fid.last_modified.or(header.lmt),
                fid.xtags.as_deref().or(header.xtags.as_deref()),
            ),
            None => Self::new(header.itag, header.lmt, header.xtags.as_deref()),
        }
    }

    pub fn itag(&self) -> i32 {
        self.itag
    }
}

impl fmt::Display for FormatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.itag)?;
        if let Some(lm) = self.last_modified {
            write!(f, ";{lm}")?;
        }
        if let Some(xtags) = &self.xtags {
            write!(f, ":{xtags}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sabr::structs::FormatId;

    fn format(itag: i32, lm: Option<&str>, xtags: Option<&str>) -> RequestedFormat {
        RequestedFormat {
            itag,
            last_modified: lm.map(str::to_owned),
            xtags: xtags.map(str::to_owned),
            ..Default::default()
        }
    }

    #[test]
    fn test_requested_format_matches_header_format_id() {
        let header = MediaHeader {
            header_id: 1,
            itag: 0,
            format_id: Some(FormatId {
                itag: 251,
                last_modified: Some(1_714_000_000_000),
                xtags: None,
            }),
            ..Default::default()
        };
        assert_eq!(
            FormatKey::from_format(&format(251, Some("1714000000000"), None)),
            FormatKey::from_media_header(&header)
        );
    }

    #[test]
    fn test_any_field_difference_breaks_equality() {
        let base = FormatKey::from_format(&format(251, Some("1"), Some("drc=1")));
        assert_ne!(base, FormatKey::from_format(&format(250, Some("1"), Some("drc=1"))));
        assert_ne!(base, FormatKey::from_format(&format(251, Some("2"), Some("drc=1"))));
        assert_ne!(base, FormatKey::from_format(&format(251, Some("1"), None)));
    }

    #[test]
    fn test_empty_xtags_is_absent() {
        assert_eq!(FormatKey::new(18, None, Some("")), FormatKey::new(18, None, None));
        assert_eq!(FormatKey::new(18, Some(5), Some("a")).to_string(), "18;5:a");
    }
}
