use std::sync::Arc;

use assert_matches::assert_matches;
use mathlist::{
    latex_tree::{AtomKind, PathSegment, Relation},
    math_field::{Direction, Extent, InsertOptions, MathField, Notification, SelectionMode},
    registry::Registry,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn field(latex: &str) -> MathField<Vec<Notification>> {
    let mut field = MathField::with_listener(Arc::new(Registry::standard()), vec![]);
    field.set_latex(latex);
    field.listener_mut().clear();
    field
}

fn assert_offsets_in_bounds<L: mathlist::math_field::Listener>(field: &MathField<L>) {
    assert!(field.start_offset() <= field.end_offset());
    assert!(field.end_offset() < field.siblings().len());
    assert!(field.siblings()[0].is_first());
}

#[test]
fn empty_radicand_takes_the_caret() {
    let mut field = field("");
    field.insert(
        r"\sqrt{}",
        InsertOptions {
            selection_mode: SelectionMode::Placeholder,
            ..InsertOptions::default()
        },
    );
    assert_eq!(field.relation(), Relation::Body);
    assert_matches!(field.parent().kind, AtomKind::Root { .. });
    assert!(field.is_collapsed());
}

#[test]
fn missing_arguments_get_selected() {
    let mut field = field("");
    field.insert(r"\frac{x}", InsertOptions::default());
    assert_eq!(field.relation(), Relation::Denominator);
    assert!(field.focus().is_placeholder());
    field.insert("y", InsertOptions::default());
    assert_eq!(field.to_latex(), r"\frac{x}{y}");
}

#[test]
fn deleting_backward_out_of_a_denominator_flattens_the_fraction() {
    let mut field = field(r"1+\frac{ab}{c}");
    field.set_path(
        vec![
            PathSegment::new(Relation::Children, 3),
            PathSegment::new(Relation::Denominator, 0),
        ],
        None,
    );
    assert!(field.delete(Direction::Backward));
    assert_eq!(field.to_latex(), "1+abc");
    assert_eq!(field.path(), &vec![PathSegment::new(Relation::Children, 4)]);
    assert!(field
        .siblings()
        .iter()
        .all(|atom| !matches!(atom.kind, AtomKind::Fraction { .. })));
}

#[rstest]
#[case(Relation::Numerator, Direction::Backward, 0)]
#[case(Relation::Numerator, Direction::Forward, 1)]
#[case(Relation::Denominator, Direction::Backward, 1)]
#[case(Relation::Denominator, Direction::Forward, 2)]
fn flattening_places_the_caret(
    #[case] relation: Relation,
    #[case] direction: Direction,
    #[case] offset: usize,
) {
    let mut field = field(r"\frac{a}{b}");
    let inner = match direction {
        Direction::Backward => 0,
        Direction::Forward => 1,
    };
    field.set_path(
        vec![
            PathSegment::new(Relation::Children, 1),
            PathSegment::new(relation, inner),
        ],
        None,
    );
    assert!(field.delete(direction));
    assert_eq!(field.to_latex(), "ab");
    assert_eq!(field.anchor_offset(), offset);
}

#[test]
fn deleting_out_of_a_lone_script_drops_the_carrier() {
    let mut field = field("^{2}");
    field.set_path(
        vec![
            PathSegment::new(Relation::Children, 1),
            PathSegment::new(Relation::Superscript, 0),
        ],
        None,
    );
    assert!(field.delete(Direction::Backward));
    assert_eq!(field.to_latex(), "2");
    assert_eq!(field.anchor_offset(), 0);
}

#[test]
fn deleting_at_the_root_start_does_nothing() {
    let mut field = field("x");
    field.move_to_start();
    assert!(!field.delete(Direction::Backward));
    assert_eq!(field.to_latex(), "x");
}

#[test]
fn edits_notify_around_the_change() {
    let mut field = field("ab");
    field.delete(Direction::Backward);
    assert_eq!(
        field.listener(),
        &[
            Notification::ContentWillChange,
            Notification::SelectionWillChange,
            Notification::SelectionDidChange,
            Notification::ContentDidChange,
        ]
    );
}

#[test]
fn macros_can_be_replaced() {
    let mut field = field("");
    let mut macros = field.macros().clone();
    macros.define("pair", "(#1,#2)");
    field.set_macros(macros);
    field.insert(r"\pair{a}{b}", InsertOptions::default());
    assert_eq!(field.siblings().len(), 2);
    assert_matches!(field.root().branch(Relation::Children), Some(children) if children[1].captures_selection());
}

#[test]
fn offsets_stay_in_bounds_through_edits() {
    let mut field = field(r"x^{2}+\frac{1}{\sqrt{y}}");
    for _ in 0..field.caret_positions() {
        field.next();
        assert_offsets_in_bounds(&field);
    }
    field.set_selection(-1, Extent::Start, None);
    assert_offsets_in_bounds(&field);
    for _ in 0..20 {
        field.delete(Direction::Backward);
        assert_offsets_in_bounds(&field);
        field.previous();
        assert_offsets_in_bounds(&field);
    }
}
