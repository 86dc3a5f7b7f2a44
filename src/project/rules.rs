//! Build rules: mapping changed source entries to output targets.

use crate::content::ContentKind;
use crate::path::{Filter, Ident};

use super::RootId;

/// A rule bound to registered roots: sources in `source_root` matching
/// `includes` produce compiled units in `output_root` (when set).
#[derive(Debug, Clone)]
pub struct ResolvedRule {
    pub source_root: RootId,
    pub includes: Filter,
    pub output_root: Option<RootId>,
}

/// One output the builder must (re)produce for a source entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub source_root: RootId,
    pub id: Ident,
    pub output_root: RootId,
    pub kind: ContentKind,
}

/// The resolved rule set for a project.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ResolvedRule>,
    default_output: Option<RootId>,
}

impl RuleSet {
    pub fn new(default_output: Option<RootId>) -> Self {
        Self {
            rules: Vec::new(),
            default_output,
        }
    }

    pub fn push(&mut self, rule: ResolvedRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ResolvedRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Expand a changed source entry into the targets to produce.
    ///
    /// Output resolution per matching rule: the rule's explicit output,
    /// else the project default, else the source's own root so a project
    /// with no configured output still compiles in place. Several rules
    /// may match the same entry; every resulting target is produced.
    pub fn apply(&self, source_root: &RootId, id: &Ident) -> Vec<Target> {
        let mut targets = Vec::new();
        for rule in &self.rules {
            if rule.source_root != *source_root || !rule.includes.matches(id) {
                continue;
            }
            let output_root = rule
                .output_root
                .clone()
                .or_else(|| self.default_output.clone())
                .unwrap_or_else(|| source_root.clone());
            let target = Target {
                source_root: source_root.clone(),
                id: id.clone(),
                output_root,
                kind: ContentKind::Compiled,
            };
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(text: &str) -> Ident {
        Ident::parse(text).unwrap()
    }

    fn root(name: &str) -> RootId {
        RootId::new(name)
    }

    #[test]
    fn test_explicit_output_wins() {
        let mut rules = RuleSet::new(Some(root("default-out")));
        rules.push(ResolvedRule {
            source_root: root("src"),
            includes: Filter::all(),
            output_root: Some(root("explicit-out")),
        });

        let targets = rules.apply(&root("src"), &id("pkg/main"));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].output_root, root("explicit-out"));
        assert_eq!(targets[0].kind, ContentKind::Compiled);
    }

    #[test]
    fn test_default_output_fallback() {
        let mut rules = RuleSet::new(Some(root("default-out")));
        rules.push(ResolvedRule {
            source_root: root("src"),
            includes: Filter::all(),
            output_root: None,
        });

        let targets = rules.apply(&root("src"), &id("main"));
        assert_eq!(targets[0].output_root, root("default-out"));
    }

    #[test]
    fn test_source_root_fallback() {
        // No explicit output, no project default: compile in place.
        let mut rules = RuleSet::new(None);
        rules.push(ResolvedRule {
            source_root: root("src"),
            includes: Filter::all(),
            output_root: None,
        });

        let targets = rules.apply(&root("src"), &id("main"));
        assert_eq!(targets[0].output_root, root("src"));
    }

    #[test]
    fn test_filter_and_root_must_match() {
        let mut rules = RuleSet::new(None);
        rules.push(ResolvedRule {
            source_root: root("src"),
            includes: Filter::parse("pkg/**").unwrap(),
            output_root: Some(root("out")),
        });

        assert!(rules.apply(&root("src"), &id("other/main")).is_empty());
        assert!(rules.apply(&root("elsewhere"), &id("pkg/main")).is_empty());
        assert_eq!(rules.apply(&root("src"), &id("pkg/main")).len(), 1);
    }

    #[test]
    fn test_fan_out_to_multiple_targets() {
        let mut rules = RuleSet::new(None);
        rules.push(ResolvedRule {
            source_root: root("src"),
            includes: Filter::all(),
            output_root: Some(root("out-a")),
        });
        rules.push(ResolvedRule {
            source_root: root("src"),
            includes: Filter::all(),
            output_root: Some(root("out-b")),
        });

        let targets = rules.apply(&root("src"), &id("main"));
        assert_eq!(targets.len(), 2);
        let outputs: Vec<_> = targets.iter().map(|t| t.output_root.clone()).collect();
        assert!(outputs.contains(&root("out-a")));
        assert!(outputs.contains(&root("out-b")));
    }

    #[test]
    fn test_duplicate_targets_collapse() {
        // Two identical rules produce one target, not two writes.
        let mut rules = RuleSet::new(Some(root("out")));
        for _ in 0..2 {
            rules.push(ResolvedRule {
                source_root: root("src"),
                includes: Filter::all(),
                output_root: None,
            });
        }
        assert_eq!(rules.apply(&root("src"), &id("main")).len(), 1);
    }
}
