use assert_matches::assert_matches;
use mathlist::{
    latex_parser::parse_latex,
    latex_tree::{Atom, AtomKind, GroupVariant, Limits, Mode, SequenceDisplay, SymbolClass},
    registry::{Macros, Registry},
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn parse(latex: &str) -> Vec<Atom> {
    parse_latex(latex, Mode::Math, &Registry::standard(), &Macros::standard())
}

fn ord(value: &str) -> Atom {
    Atom::symbol(Mode::Math, SymbolClass::Ord, value)
}

#[rstest]
#[case(r"\frac12")]
#[case(r"x^2+1")]
#[case(r"\sqrt[3]{x+y}")]
#[case(r"\left(a\middle|b\right]")]
#[case(r"\begin{pmatrix}a&b\\c&d\end{pmatrix}")]
#[case(r"\begin{array}{c|l}1&2\end{array}")]
#[case(r"\text{ab}")]
#[case(r"\mathbf{x}\alpha\beta")]
#[case(r"\sum_{i=0}^n i")]
#[case(r"\lim\limits_{x\to0}")]
#[case(r"\overline{ab}")]
#[case(r"\binom{n}{k}")]
#[case(r"a\,b\quad c")]
#[case(r"\{x\}")]
#[case(r"a \over b")]
#[case(r"a\atop b")]
#[case(r"n\choose k")]
#[case(r"x^{1\over2}+{a\over b}c")]
#[case(r"\begin{alignedat}{2}a&b\end{alignedat}")]
#[case(r"\int\limits_0^1\sin\nolimits x")]
fn round_trip(#[case] latex: &str) {
    let atoms = parse(latex);
    let serialized = SequenceDisplay(&atoms).to_string();
    assert_eq!(parse(&serialized), atoms, "{latex} serialized as {serialized}");
}

#[rstest]
#[case(r"x^2+1", r"x^{2}+1")]
#[case(r"\frac 1 2", r"\frac{1}{2}")]
#[case(r"\sqrt x", r"\sqrt{x}")]
#[case(r"\alpha x", r"\alpha x")]
#[case(r"a \over b", r"{a\over b}")]
#[case(r"\sin x", r"\sin x")]
#[case(r"\log_2 n", r"\log_{2}n")]
#[case(r"\int x", r"\int x")]
#[case(r"\sum\nolimits_i", r"\sum\nolimits_{i}")]
#[case(r"\begin{alignedat}{2}a&b\end{alignedat}", r"\begin{alignedat}{2}a&b\end{alignedat}")]
#[case(r"\frac1", r"\frac{1}{\placeholder{}}")]
fn serialization(#[case] latex: &str, #[case] expected: &str) {
    assert_eq!(SequenceDisplay(&parse(latex)).to_string(), expected);
}

#[test]
fn braced_infix_fraction_is_the_fraction() {
    assert_eq!(parse(r"{a\over b}"), parse(r"a\over b"));
    assert_matches!(
        &parse(r"{a\over b}")[..],
        [Atom { kind: AtomKind::Fraction { .. }, .. }]
    );
    assert_matches!(
        &parse(r"{a}")[..],
        [Atom { kind: AtomKind::Group { variant: GroupVariant::Plain, .. }, .. }]
    );
}

#[test]
fn fraction_of_single_tokens() {
    let atoms = parse(r"\frac12");
    assert_matches!(
        &atoms[..],
        [Atom { kind: AtomKind::Fraction { numerator, denominator, .. }, .. }]
            if numerator.content() == [ord("1")] && denominator.content() == [ord("2")]
    );
}

#[test]
fn superscript_on_the_base() {
    let atoms = parse("x^2+1");
    assert_eq!(atoms.len(), 3);
    assert_eq!(atoms[0].value(), "x");
    assert_eq!(
        atoms[0].superscript.as_ref().map(|s| s.content().to_vec()),
        Some(vec![ord("2")])
    );
    assert_eq!(atoms[1].value(), "+");
    assert_eq!(atoms[2], ord("1"));
}

#[test]
fn operators_keep_their_limits() {
    let atoms = parse(r"\sin\limits x");
    assert_matches!(atoms[0].kind, AtomKind::Operator { limits: Limits::Limits, explicit: true });
    assert_eq!(atoms[1], ord("x"));
}

#[test]
fn user_macros_expand() {
    let mut macros = Macros::new();
    macros.define("half", r"\frac{#1}{2}");
    let atoms = parse_latex(r"\half{x}", Mode::Math, &Registry::standard(), &macros);
    assert_matches!(
        &atoms[..],
        [Atom { kind: AtomKind::Group { variant: GroupVariant::Macro, children }, .. }]
            if matches!(children[1].kind, AtomKind::Fraction { .. })
    );
}

#[test]
fn half_typed_input_still_parses() {
    for latex in [r"\frac{", r"x^", r"\left(", r"\begin{matrix}a&", r"}}{", r"\sqrt["] {
        let atoms = parse(latex);
        assert!(atoms.iter().all(|atom| !atom.is_first()), "{latex}");
    }
}
