use crate::message::Message;
use crate::state::State;
use crate::usage::UsageTerm;

/// How much run context is available when rendering help fragments.
///
/// Inside an unselected alternative there is no meaningful state to draw
/// concrete values from; fragments are rendered generically instead.
#[derive(Debug, Clone, Copy)]
pub enum DocState<'a> {
    Available(&'a State),
    Unavailable,
}

impl<'a> DocState<'a> {
    pub(crate) fn is_available(&self) -> bool {
        matches!(self, DocState::Available(_))
    }
}

/// One help entry: the term it documents, its prose, and (when the doc state
/// allows) the default shown alongside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocEntry {
    pub term: UsageTerm,
    pub description: Option<Message>,
    pub default: Option<String>,
}

/// A run of entries under an optional label (from `group` or a labeled
/// `object`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocSection {
    pub title: Option<String>,
    pub entries: Vec<DocEntry>,
}

/// The help-text contribution of a parser subtree, consumed by an external
/// renderer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocFragments {
    pub sections: Vec<DocSection>,
}

impl DocFragments {
    pub(crate) fn entry(entry: DocEntry) -> Self {
        DocFragments {
            sections: vec![DocSection {
                title: None,
                entries: vec![entry],
            }],
        }
    }

    /// Merge several children: untitled entries coalesce into one leading
    /// untitled section, titled sections pass through in order.
    pub(crate) fn combine(children: Vec<DocFragments>) -> Self {
        let mut untitled = Vec::default();
        let mut titled = Vec::default();

        for child in children {
            for section in child.sections {
                if section.title.is_none() {
                    untitled.extend(section.entries);
                } else {
                    titled.push(section);
                }
            }
        }

        let mut sections = Vec::default();
        if !untitled.is_empty() {
            sections.push(DocSection {
                title: None,
                entries: untitled,
            });
        }
        sections.extend(titled);
        DocFragments { sections }
    }

    /// Put every untitled entry under `title`. Used by `group` and labeled
    /// `object`s.
    pub(crate) fn labeled(self, title: &str) -> Self {
        let mut combined = DocFragments::combine(vec![self]);
        for section in &mut combined.sections {
            if section.title.is_none() {
                section.title = Some(title.to_string());
            }
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(metavar: &str) -> DocEntry {
        DocEntry {
            term: UsageTerm::Argument {
                metavar: metavar.to_string(),
            },
            description: None,
            default: None,
        }
    }

    #[test]
    fn combine_coalesces_untitled() {
        let combined = DocFragments::combine(vec![
            DocFragments::entry(entry("A")),
            DocFragments::entry(entry("B")),
            DocFragments {
                sections: vec![DocSection {
                    title: Some("extras".to_string()),
                    entries: vec![entry("C")],
                }],
            },
        ]);
        assert_eq!(combined.sections.len(), 2);
        assert_eq!(combined.sections[0].title, None);
        assert_eq!(combined.sections[0].entries.len(), 2);
        assert_eq!(combined.sections[1].title, Some("extras".to_string()));
    }

    #[test]
    fn labeled_titles_untitled_only() {
        let fragments = DocFragments::combine(vec![
            DocFragments::entry(entry("A")),
            DocFragments {
                sections: vec![DocSection {
                    title: Some("extras".to_string()),
                    entries: vec![entry("C")],
                }],
            },
        ])
        .labeled("main");
        assert_eq!(fragments.sections[0].title, Some("main".to_string()));
        assert_eq!(fragments.sections[1].title, Some("extras".to_string()));
    }
}
