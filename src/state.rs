//! Per-translation state: retained raw sources, accumulated diagnostics, the
//! object-key rewriting switch, and the bidirectional maps for names that had
//! to move out of the way of PCL keywords.

use crate::diag::{Diagnostic, Diagnostics, Range, Severity};
use crate::lexer::Sources;
use std::collections::HashMap;

pub fn is_pcl_keyword(s: &str) -> bool {
    matches!(s, "for" | "if" | "else")
}

#[derive(Default)]
struct OverlapRenames {
    name_to_rename: HashMap<String, String>,
    rename_to_name: HashMap<String, String>,
}

pub struct ConvertState {
    pub sources: Sources,
    pub diagnostics: Diagnostics,

    /// Whether object construction should rewrite keys to camelCase.
    /// Disabled inside `jsonencode(...)` arguments and sandboxed module
    /// bodies so embedded documents keep their verbatim keys.
    pub rewrite_object_keys: bool,

    renames: OverlapRenames,
    type_renames: OverlapRenames,

    pub sandboxed_module_names: HashMap<String, String>,

    /// The declaration or attribute currently being translated; expression
    /// diagnostics anchor here because sub-expressions carry no ranges.
    pub current_subject: Option<Range>,
}

impl ConvertState {
    pub fn new(sources: Sources) -> Self {
        Self {
            sources,
            diagnostics: Diagnostics::new(),
            rewrite_object_keys: true,
            renames: OverlapRenames::default(),
            type_renames: OverlapRenames::default(),
            sandboxed_module_names: HashMap::new(),
            current_subject: None,
        }
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Push a diagnostic anchored at the declaration currently translating.
    pub fn diag_at_current(&mut self, severity: Severity, summary: &str, detail: String) {
        let mut diagnostic = match severity {
            Severity::Error => Diagnostic::error(summary, detail),
            Severity::Warning => Diagnostic::warning(summary, detail),
        };
        diagnostic.subject = self.current_subject.clone();
        self.diagnostics.push(diagnostic);
    }

    /// The original bytes for `range`, line endings normalized.
    pub fn source_code(&self, range: &Range) -> String {
        self.sources.source_code(range)
    }

    pub fn with_object_keys_disabled<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.rewrite_object_keys;
        self.rewrite_object_keys = false;
        let result = f(self);
        self.rewrite_object_keys = previous;
        result
    }

    /// Screen a declaration name (and optional type) against PCL keywords,
    /// renaming with a kind-specific suffix and recording the rename so later
    /// references can be rewritten and `__logicalName` restored.
    pub fn rename_pcl_overlap(
        &mut self,
        kind: &str,
        hcl_type: Option<&str>,
        name: &str,
        range: &Range,
    ) -> (Option<String>, String) {
        let mut new_type = hcl_type.map(|t| t.to_string());
        let mut new_name = name.to_string();

        if let Some(t) = hcl_type {
            if is_pcl_keyword(t) {
                let renamed = format!("{t}_{kind}Type_");
                self.type_renames
                    .name_to_rename
                    .insert(name.to_string(), renamed.clone());
                self.type_renames
                    .rename_to_name
                    .insert(new_name.clone(), name.to_string());
                self.push_diagnostic(
                    Diagnostic::warning(
                        format!("{kind} type renamed to prevent keyword overlap"),
                        format!("Renaming {kind} type {t} to {renamed} to prevent overlap"),
                    )
                    .with_subject(range),
                );
                new_type = Some(renamed);
            }
        }

        if is_pcl_keyword(name) {
            let renamed = format!("{name}_{kind}_");
            self.renames
                .name_to_rename
                .insert(name.to_string(), renamed.clone());
            self.renames
                .rename_to_name
                .insert(renamed.clone(), name.to_string());
            self.push_diagnostic(
                Diagnostic::warning(
                    format!("{kind} renamed to prevent keyword overlap"),
                    format!("Renaming {kind} {name} to {renamed} to prevent overlap"),
                )
                .with_subject(range),
            );
            new_name = renamed;
        }

        (new_type, new_name)
    }

    /// The forward rename for `name`, if one was recorded.
    pub fn renamed_name(&self, name: &str) -> String {
        self.renames
            .name_to_rename
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// The original spelling behind a rename, for `__logicalName`.
    pub fn original_name(&self, name: &str) -> String {
        self.renames
            .rename_to_name
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Pos;

    fn state() -> ConvertState {
        ConvertState::new(Sources::new())
    }

    #[test]
    fn keywords() {
        assert!(is_pcl_keyword("for"));
        assert!(is_pcl_keyword("if"));
        assert!(is_pcl_keyword("else"));
        assert!(!is_pcl_keyword("range"));
    }

    #[test]
    fn renames_keyword_overlaps_and_remembers_both_directions() {
        let mut state = state();
        let range = Range::new("main.tf", Pos::default(), Pos::default());
        let (_, renamed) = state.rename_pcl_overlap("resource", None, "for", &range);
        assert_eq!(renamed, "for_resource_");
        assert_eq!(state.renamed_name("for"), "for_resource_");
        assert_eq!(state.original_name("for_resource_"), "for");
        assert_eq!(state.diagnostics.len(), 1);
    }

    #[test]
    fn non_keywords_pass_through() {
        let mut state = state();
        let range = Range::new("main.tf", Pos::default(), Pos::default());
        let (new_type, name) =
            state.rename_pcl_overlap("resource", Some("aws_instance"), "web", &range);
        assert_eq!(new_type.as_deref(), Some("aws_instance"));
        assert_eq!(name, "web");
        assert!(state.diagnostics.is_empty());
    }

    #[test]
    fn object_key_rewriting_nests() {
        let mut state = state();
        assert!(state.rewrite_object_keys);
        state.with_object_keys_disabled(|state| {
            assert!(!state.rewrite_object_keys);
            state.with_object_keys_disabled(|state| {
                assert!(!state.rewrite_object_keys);
            });
            assert!(!state.rewrite_object_keys);
        });
        assert!(state.rewrite_object_keys);
    }
}
