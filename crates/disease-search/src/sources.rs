//! Parsing of the `incl`/`excl` source filters.

use std::collections::BTreeSet;

use disease_core::{Error, Result, SourceName};

/// The sources a search should report on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFilter {
    sources: BTreeSet<SourceName>,
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl SourceFilter {
    pub fn all() -> Self {
        Self {
            sources: SourceName::ALL.into_iter().collect(),
        }
    }

    /// Build a filter from comma-separated, case-insensitive source names.
    ///
    /// Blank values count as absent. Supplying both lists, or any unknown
    /// name, is an [`Error::InvalidParameter`].
    pub fn parse(incl: Option<&str>, excl: Option<&str>) -> Result<Self> {
        let incl = incl.filter(|s| !s.trim().is_empty());
        let excl = excl.filter(|s| !s.trim().is_empty());
        match (incl, excl) {
            (None, None) => Ok(Self::all()),
            (Some(_), Some(_)) => Err(Error::InvalidParameter(
                "Cannot request both source inclusions and exclusions.".to_string(),
            )),
            (Some(incl), None) => Ok(Self {
                sources: parse_names(incl)?,
            }),
            (None, Some(excl)) => {
                let excluded = parse_names(excl)?;
                Ok(Self {
                    sources: SourceName::ALL
                        .into_iter()
                        .filter(|s| !excluded.contains(s))
                        .collect(),
                })
            }
        }
    }

    pub fn sources(&self) -> &BTreeSet<SourceName> {
        &self.sources
    }

    pub fn contains(&self, src: SourceName) -> bool {
        self.sources.contains(&src)
    }
}

fn parse_names(list: &str) -> Result<BTreeSet<SourceName>> {
    let mut sources = BTreeSet::new();
    let mut invalid = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        match name.parse::<SourceName>() {
            Ok(src) => {
                sources.insert(src);
            }
            Err(_) => invalid.push(name.to_string()),
        }
    }
    if invalid.is_empty() {
        Ok(sources)
    } else {
        Err(Error::InvalidParameter(format!(
            "Invalid source name(s): {:?}",
            invalid
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filters_selects_everything() {
        assert_eq!(SourceFilter::parse(None, None).unwrap(), SourceFilter::all());
        assert_eq!(SourceFilter::parse(Some(" "), Some("")).unwrap(), SourceFilter::all());
    }

    #[test]
    fn test_include() {
        let filter = SourceFilter::parse(Some("ncit, MONDO"), None).unwrap();
        assert_eq!(filter.sources().len(), 2);
        assert!(filter.contains(SourceName::Ncit));
        assert!(filter.contains(SourceName::Mondo));
    }

    #[test]
    fn test_exclude() {
        let filter = SourceFilter::parse(None, Some("do,omim")).unwrap();
        assert_eq!(
            filter.sources().iter().copied().collect::<Vec<_>>(),
            vec![SourceName::Ncit, SourceName::Mondo, SourceName::OncoTree]
        );
    }

    #[test]
    fn test_both_lists_rejected() {
        let err = SourceFilter::parse(Some("ncit"), Some("do")).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn test_unknown_names_rejected() {
        let err = SourceFilter::parse(Some("ncit,snomed,icd"), None).unwrap_err();
        match err {
            Error::InvalidParameter(msg) => {
                assert!(msg.contains("snomed"));
                assert!(msg.contains("icd"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(SourceFilter::parse(None, Some("nope")).is_err());
    }
}
