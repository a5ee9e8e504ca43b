//! Canonical case labels.
//!
//! Rules that share a left-hand class, both guard event sets and the same
//! multiset of destinations are indistinguishable in the output tensor and
//! get the same label. Labels are enumerated in sorted order, so the index
//! of a label depends only on the grammar.

use crate::grammar::{CostClass, Grammar, Rule, RuleId};
use crate::tree::Event;
use std::collections::BTreeSet;
use std::fmt;

/// Name of a rule case, e.g. `C1_SPEC_SPEC_C0V1AV2A_C1V1BV2B`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseLabel {
    name: String,
    lhs: CostClass,
}

impl CaseLabel {
    pub fn of(rule: &Rule) -> Self {
        let events = |set: &BTreeSet<Event>| set.iter().map(|e| e.name()).collect::<String>();
        let mut calls: Vec<String> = rule
            .destinations
            .iter()
            .map(|d| {
                format!(
                    "_C{}{}{}",
                    d.class.index(),
                    d.slot1.token(1),
                    d.slot2.token(2)
                )
            })
            .collect();
        calls.sort();
        let name = format!(
            "C{}_{}_{}{}",
            rule.lhs.index(),
            events(&rule.guard.tree1),
            events(&rule.guard.tree2),
            calls.concat()
        )
        .to_uppercase();
        CaseLabel {
            name,
            lhs: rule.lhs,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn lhs(&self) -> CostClass {
        self.lhs
    }
}

impl fmt::Display for CaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Sorted, de-duplicated labels of a grammar and the label of every rule.
#[derive(Clone, Debug)]
pub struct LabelIndex {
    labels: Vec<CaseLabel>,
    by_rule: Vec<usize>,
}

impl LabelIndex {
    pub fn new(grammar: &Grammar) -> Self {
        let per_rule: Vec<CaseLabel> = grammar.rules().map(|(_, rule)| rule.label()).collect();
        let labels: Vec<CaseLabel> = per_rule
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let by_rule = per_rule
            .iter()
            .map(|label| labels.binary_search(label).unwrap_or_default())
            .collect();
        LabelIndex { labels, by_rule }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[CaseLabel] {
        &self.labels
    }

    pub fn get(&self, index: usize) -> &CaseLabel {
        &self.labels[index]
    }

    /// Tensor index of the label of `rule`.
    pub fn label_of(&self, rule: RuleId) -> usize {
        self.by_rule[rule]
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.labels
            .binary_search_by(|label| label.as_str().cmp(name))
            .ok()
    }

    /// Indices of the labels whose rules rewrite `class`.
    pub fn class_labels(&self, class: CostClass) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| label.lhs == class)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{CostAtom, Destination, Guard, Slot};

    fn spec_rule(lhs: CostClass, dests: &[(CostClass, Slot, Slot)], extra: Vec<CostAtom>) -> Rule {
        Rule::new(
            lhs,
            dests
                .iter()
                .map(|&(c, s1, s2)| Destination::new(c, s1, s2))
                .collect(),
            Guard::new([Event::Spec], [Event::Spec]),
            extra,
        )
    }

    #[test]
    fn test_label_format() {
        let rule = spec_rule(
            CostClass::Adjacent,
            &[
                (CostClass::Adjacent, Slot::Right, Slot::Right),
                (CostClass::NonAdjacent, Slot::Left, Slot::Left),
            ],
            vec![CostAtom::AdjBreak],
        );
        assert_eq!(rule.label().as_str(), "C1_SPEC_SPEC_C0V1AV2A_C1V1BV2B");

        let multi = Rule::new(
            CostClass::NonAdjacent,
            vec![],
            Guard::new([Event::Spec, Event::GDup], [Event::GLos]),
            vec![],
        );
        assert_eq!(multi.label().as_str(), "C0_GDUPSPEC_GLOS");
    }

    #[test]
    fn test_labels_ignore_costs_and_order() {
        let a = spec_rule(
            CostClass::Adjacent,
            &[
                (CostClass::Adjacent, Slot::Left, Slot::Left),
                (CostClass::NonAdjacent, Slot::Right, Slot::Right),
            ],
            vec![CostAtom::AdjBreak],
        );
        let b = spec_rule(
            CostClass::Adjacent,
            &[
                (CostClass::NonAdjacent, Slot::Right, Slot::Right),
                (CostClass::Adjacent, Slot::Left, Slot::Left),
            ],
            vec![],
        );
        assert_eq!(a.label(), b.label());
    }

    #[test]
    fn test_label_index() {
        let mut grammar = Grammar::new();
        let both = [
            (CostClass::Adjacent, Slot::Left, Slot::Left),
            (CostClass::Adjacent, Slot::Right, Slot::Right),
        ];
        grammar
            .add_rule(spec_rule(CostClass::Adjacent, &both, vec![]))
            .unwrap();
        grammar
            .add_rule(spec_rule(CostClass::Adjacent, &both, vec![CostAtom::AdjGain]))
            .unwrap();
        grammar
            .add_rule(Rule::new(
                CostClass::NonAdjacent,
                vec![],
                Guard::new([Event::Extant], [Event::Extant]),
                vec![CostAtom::Zero],
            ))
            .unwrap();

        let index = LabelIndex::new(&grammar);
        let names: Vec<_> = index.labels().iter().map(|l| l.as_str()).collect();
        assert_eq!(names, ["C0_EXTANT_EXTANT", "C1_SPEC_SPEC_C1V1AV2A_C1V1BV2B"]);
        assert_eq!(index.label_of(0), 1);
        assert_eq!(index.label_of(1), 1);
        assert_eq!(index.label_of(2), 0);
        assert_eq!(index.position("C0_EXTANT_EXTANT"), Some(0));
        assert_eq!(index.position("C1_EXTANT_EXTANT"), None);
        assert_eq!(index.class_labels(CostClass::Adjacent), vec![1]);
    }
}
