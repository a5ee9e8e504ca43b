//! The backward (outside) pass.
//!
//! `B[d][i][j]` aggregates the contributions of every outside rule of `d`
//! whose origin exists for `(i, j)`. The root pair starts from the
//! identity. Origins are ancestors (or the cell itself), so rows are filled
//! in decreasing postorder of the first tree and, within a row, by depth in
//! the second tree.

use crate::forward::{empty_tables, map_level, Evaluator, Tables};
use crate::grammar::CostClass;
use crate::model::ScoringModel;
use crate::outside::OutsideRule;
use crate::semiring::Semiring;
use crate::tree::NodeId;

/// Output of the backward pass.
#[derive(Clone, Debug)]
pub struct Outside<S: Semiring> {
    pub tables: Tables<S>,
    pub applications: usize,
}

impl<'a, S: Semiring, M: ScoringModel<S>> Evaluator<'a, S, M> {
    /// Outside values of both classes at `(i, j)`, evaluated in `order`.
    pub(crate) fn outside_cell(
        &self,
        rules: &[Vec<OutsideRule>; 2],
        order: [CostClass; 2],
        i: NodeId,
        j: NodeId,
        inside: &Tables<S>,
        outside: &Tables<S>,
    ) -> ([S; 2], usize) {
        let mut values = [S::zero(), S::zero()];
        let mut applied = 0;
        if !self.is_valid(i, j) {
            return (values, applied);
        }
        let (tree1, tree2) = (self.tree1(), self.tree2());
        let is_root = (i, j) == (tree1.root(), tree2.root());

        for target in order {
            let mut acc = if is_root { S::one() } else { S::zero() };
            for orule in &rules[target.index()] {
                let Some((o1, o2)) = orule.origin(tree1, i, tree2, j) else {
                    continue;
                };
                if !self.is_valid(o1, o2) {
                    continue;
                }
                let rule = self.grammar().rule(orule.rule);
                let site = self.site(o1, o2);
                if !rule.guard.admits(site.event1(), site.event2()) {
                    continue;
                }

                let mut value = S::one();
                let mut complete = true;
                for sib in &orule.siblings {
                    match (sib.rel1.locate(tree1, i), sib.rel2.locate(tree2, j)) {
                        (Some(a), Some(b)) => {
                            value = value * inside[sib.class.index()].get(a, b).clone()
                        }
                        _ => {
                            complete = false;
                            break;
                        }
                    }
                }
                if !complete {
                    continue;
                }

                let origin_value = if orule.is_same_cell() {
                    values[orule.origin_class.index()].clone()
                } else {
                    outside[orule.origin_class.index()].get(o1, o2).clone()
                };
                value = value * origin_value * self.rule_weight(rule, &site);
                applied += 1;
                acc = acc + value;
            }
            values[target.index()] = acc;
        }
        (values, applied)
    }
}

/// Fill the outside tables. `order` is the forward class order; a class
/// read at the same cell by the other one is completed after it here.
pub(crate) fn fill_outside<S, M>(
    eval: &Evaluator<'_, S, M>,
    rules: &[Vec<OutsideRule>; 2],
    order: [CostClass; 2],
    inside: &Tables<S>,
    parallel: bool,
) -> Outside<S>
where
    S: Semiring,
    M: ScoringModel<S>,
{
    let (tree1, tree2) = (eval.tree1(), eval.tree2());
    let mut tables = empty_tables(tree1.len(), tree2.len());
    let mut applications = 0;
    let reversed = [order[1], order[0]];
    let levels = tree2.depth_levels();

    for i in tree1.postorder().rev() {
        for level in &levels {
            let current = &tables;
            let updates = map_level(level, parallel, |j| {
                eval.outside_cell(rules, reversed, i, j, inside, current)
            });
            for (&j, (values, applied)) in level.iter().zip(updates) {
                for (class, value) in CostClass::ALL.into_iter().zip(values) {
                    tables[class.index()].set(i, j, value);
                }
                applications += applied;
            }
        }
    }

    Outside {
        tables,
        applications,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::fill_inside;
    use crate::grammar::Grammar;
    use crate::model::tests::FixedCosts;
    use crate::outside::derive_outside_rules;
    use crate::parser::parse_grammar;
    use crate::semiring::Float;
    use crate::tree::tests::cherry;
    use crate::tree::{Event, RecTree};

    const TOY: &str = "\
        c1 = c1(v1a,v2a) + c1(v1b,v2b) : c0(v1a,v2a) + c1(v1b,v2b) + B ; Spec ; Spec\n\
        c0 = c0(v1a,v2a) + c0(v1b,v2b) ; Spec ; Spec\n\
        c1 = 0 ; Extant ; Extant\n\
        c0 = 0 ; Extant ; Extant";

    fn passes(
        grammar: &Grammar,
        model: &FixedCosts,
        t1: &RecTree,
        t2: &RecTree,
    ) -> (Tables<Float>, Outside<Float>) {
        let eval = Evaluator::new(grammar, model, t1, t2);
        let order = grammar.class_order().unwrap();
        let inside = fill_inside(&eval, order, false, false);
        let rules = derive_outside_rules(grammar);
        let outside = fill_outside(&eval, &rules, order, &inside.tables, false);
        (inside.tables, outside)
    }

    #[test]
    fn test_outside_by_hand() {
        let grammar = parse_grammar(TOY).unwrap();
        let model = FixedCosts {
            breakage: 3.0,
            ..Default::default()
        };
        let (t1, t2) = (cherry("1"), cherry("2"));
        let (inside, outside) = passes(&grammar, &model, &t1, &t2);

        // C1(root) = 1*1 + 1*1*3, C0(root) = 1
        assert_eq!(inside[1].get(2, 2), &Float::new(4.0));
        assert_eq!(inside[0].get(2, 2), &Float::new(1.0));

        let b = &outside.tables;
        assert_eq!(b[1].get(2, 2), &Float::new(1.0));
        assert_eq!(b[0].get(2, 2), &Float::new(1.0));
        // left children: B1 = C1(b,b) * B1(root); B0 = C1(b,b)*3*B1(root) + C0(b,b)*B0(root)
        assert_eq!(b[1].get(0, 0), &Float::new(1.0));
        assert_eq!(b[0].get(0, 0), &Float::new(4.0));
        // right children: B1 = C1(a,a) + C0(a,a)*3, B0 = C0(a,a)
        assert_eq!(b[1].get(1, 1), &Float::new(4.0));
        assert_eq!(b[0].get(1, 1), &Float::new(1.0));
        // different species
        assert!(b[1].get(0, 1).is_zero());
        assert!(b[0].get(1, 0).is_zero());
    }

    #[test]
    fn test_same_cell_outside() {
        let grammar = parse_grammar(
            "c0 = 0 ; Extant ; Extant\n\
             c1 = c0(v1,v2) + G ; Extant ; Extant",
        )
        .unwrap();
        let model = FixedCosts {
            gain: 2.0,
            ..Default::default()
        };
        let mut b = RecTree::builder();
        let l = b.leaf("a", "A", Event::Extant);
        let t1 = b.build(l).unwrap();
        let t2 = t1.clone();
        let (_, outside) = passes(&grammar, &model, &t1, &t2);

        assert_eq!(outside.tables[1].get(0, 0), &Float::new(1.0));
        assert_eq!(outside.tables[0].get(0, 0), &Float::new(3.0));
        assert_eq!(outside.applications, 1);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_outside_matches_serial() {
        let grammar = parse_grammar(crate::parser::DECO_GRAMMAR).unwrap();
        let model = FixedCosts {
            gain: 0.5,
            breakage: 0.25,
            adjacencies: [("1a", "2a")].into_iter().collect(),
        };
        let (t1, t2) = (cherry("1"), cherry("2"));
        let eval = Evaluator::new(&grammar, &model, &t1, &t2);
        let order = grammar.class_order().unwrap();
        let inside = fill_inside(&eval, order, false, false);
        let rules = derive_outside_rules(&grammar);

        let serial = fill_outside(&eval, &rules, order, &inside.tables, false);
        let parallel = fill_outside(&eval, &rules, order, &inside.tables, true);
        assert_eq!(serial.tables, parallel.tables);
    }
}
