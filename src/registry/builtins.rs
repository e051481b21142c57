use super::{Construct, Definition, EnvironmentDefinition, Registry};
use crate::latex_tree::{Fence, GroupVariant, Limits, Mode, SymbolClass};

use Mode::{Math, Text};
use SymbolClass::*;

const GREEK: &[(&str, &str)] = &[
    ("alpha", "α"),
    ("beta", "β"),
    ("gamma", "γ"),
    ("delta", "δ"),
    ("epsilon", "ϵ"),
    ("varepsilon", "ε"),
    ("zeta", "ζ"),
    ("eta", "η"),
    ("theta", "θ"),
    ("vartheta", "ϑ"),
    ("iota", "ι"),
    ("kappa", "κ"),
    ("lambda", "λ"),
    ("mu", "μ"),
    ("nu", "ν"),
    ("xi", "ξ"),
    ("pi", "π"),
    ("varpi", "ϖ"),
    ("rho", "ρ"),
    ("varrho", "ϱ"),
    ("sigma", "σ"),
    ("varsigma", "ς"),
    ("tau", "τ"),
    ("upsilon", "υ"),
    ("phi", "ϕ"),
    ("varphi", "φ"),
    ("chi", "χ"),
    ("psi", "ψ"),
    ("omega", "ω"),
    ("Gamma", "Γ"),
    ("Delta", "Δ"),
    ("Theta", "Θ"),
    ("Lambda", "Λ"),
    ("Xi", "Ξ"),
    ("Pi", "Π"),
    ("Sigma", "Σ"),
    ("Upsilon", "Υ"),
    ("Phi", "Φ"),
    ("Psi", "Ψ"),
    ("Omega", "Ω"),
];

const ORDINARY: &[(&str, &str)] = &[
    ("infty", "∞"),
    ("partial", "∂"),
    ("nabla", "∇"),
    ("forall", "∀"),
    ("exists", "∃"),
    ("nexists", "∄"),
    ("emptyset", "∅"),
    ("varnothing", "∅"),
    ("hbar", "ℏ"),
    ("ell", "ℓ"),
    ("Re", "ℜ"),
    ("Im", "ℑ"),
    ("aleph", "ℵ"),
    ("prime", "′"),
    ("angle", "∠"),
    ("triangle", "△"),
    ("neg", "¬"),
    ("lnot", "¬"),
    ("top", "⊤"),
    ("bot", "⊥"),
    ("backslash", "\\"),
    ("%", "%"),
    ("#", "#"),
    ("&", "&"),
    ("$", "$"),
    ("_", "_"),
    ("ldots", "…"),
    ("dots", "…"),
    ("vdots", "⋮"),
];

const BINARY: &[(&str, &str)] = &[
    ("pm", "±"),
    ("mp", "∓"),
    ("times", "×"),
    ("div", "÷"),
    ("cdot", "⋅"),
    ("ast", "∗"),
    ("star", "⋆"),
    ("circ", "∘"),
    ("bullet", "∙"),
    ("cup", "∪"),
    ("cap", "∩"),
    ("setminus", "∖"),
    ("wedge", "∧"),
    ("land", "∧"),
    ("vee", "∨"),
    ("lor", "∨"),
    ("oplus", "⊕"),
    ("ominus", "⊖"),
    ("otimes", "⊗"),
    ("odot", "⊙"),
];

const RELATIONS: &[(&str, &str)] = &[
    ("le", "≤"),
    ("leq", "≤"),
    ("ge", "≥"),
    ("geq", "≥"),
    ("ne", "≠"),
    ("neq", "≠"),
    ("ll", "≪"),
    ("gg", "≫"),
    ("approx", "≈"),
    ("equiv", "≡"),
    ("sim", "∼"),
    ("simeq", "≃"),
    ("cong", "≅"),
    ("propto", "∝"),
    ("in", "∈"),
    ("notin", "∉"),
    ("ni", "∋"),
    ("subset", "⊂"),
    ("subseteq", "⊆"),
    ("supset", "⊃"),
    ("supseteq", "⊇"),
    ("mid", "∣"),
    ("parallel", "∥"),
    ("perp", "⊥"),
    ("to", "→"),
    ("gets", "←"),
    ("rightarrow", "→"),
    ("leftarrow", "←"),
    ("leftrightarrow", "↔"),
    ("Rightarrow", "⇒"),
    ("Leftarrow", "⇐"),
    ("Leftrightarrow", "⇔"),
    ("longrightarrow", "⟶"),
    ("longleftarrow", "⟵"),
    ("Longrightarrow", "⟹"),
    ("Longleftarrow", "⟸"),
    ("Longleftrightarrow", "⟺"),
    ("mapsto", "↦"),
    ("implies", "⟹"),
    ("impliedby", "⟸"),
    ("uparrow", "↑"),
    ("downarrow", "↓"),
    ("updownarrow", "↕"),
    ("Uparrow", "⇑"),
    ("Downarrow", "⇓"),
    ("Updownarrow", "⇕"),
    ("colon", ":"),
];

const FENCES: &[(&str, &str, SymbolClass)] = &[
    ("{", "{", Open),
    ("}", "}", Close),
    ("lbrace", "{", Open),
    ("rbrace", "}", Close),
    ("lbrack", "[", Open),
    ("rbrack", "]", Close),
    ("langle", "⟨", Open),
    ("rangle", "⟩", Close),
    ("lfloor", "⌊", Open),
    ("rfloor", "⌋", Close),
    ("lceil", "⌈", Open),
    ("rceil", "⌉", Close),
    ("lvert", "|", Open),
    ("rvert", "|", Close),
    ("lVert", "‖", Open),
    ("rVert", "‖", Close),
    ("lgroup", "⟮", Open),
    ("rgroup", "⟯", Close),
    ("lmoustache", "⎰", Open),
    ("rmoustache", "⎱", Close),
    ("vert", "|", Ord),
    ("Vert", "‖", Ord),
    ("|", "‖", Ord),
];

const INNER: &[(&str, &str)] = &[("cdots", "⋯"), ("ddots", "⋱")];

const BIG_OPERATORS: &[(&str, &str, Limits)] = &[
    ("sum", "∑", Limits::Auto),
    ("prod", "∏", Limits::Auto),
    ("coprod", "∐", Limits::Auto),
    ("bigcup", "⋃", Limits::Auto),
    ("bigcap", "⋂", Limits::Auto),
    ("bigvee", "⋁", Limits::Auto),
    ("bigwedge", "⋀", Limits::Auto),
    ("bigoplus", "⨁", Limits::Auto),
    ("bigotimes", "⨂", Limits::Auto),
    ("bigodot", "⨀", Limits::Auto),
    ("int", "∫", Limits::NoLimits),
    ("iint", "∬", Limits::NoLimits),
    ("iiint", "∭", Limits::NoLimits),
    ("oint", "∮", Limits::NoLimits),
];

const FUNCTIONS: &[&str] = &[
    "arccos", "arcsin", "arctan", "arg", "cos", "cosh", "cot", "coth", "csc", "deg", "dim", "exp",
    "hom", "ker", "lg", "ln", "log", "sec", "sin", "sinh", "tan", "tanh",
];

const FUNCTIONS_WITH_LIMITS: &[&str] = &[
    "det", "gcd", "inf", "lim", "liminf", "limsup", "max", "min", "Pr", "sup",
];

const ACCENTS: &[&str] = &[
    "hat", "widehat", "tilde", "widetilde", "bar", "vec", "dot", "ddot", "breve", "check",
    "acute", "grave", "mathring", "overrightarrow", "overleftarrow",
];

const ENCLOSURES: &[&str] = &[
    "overline", "underline", "boxed", "cancel", "bcancel", "xcancel", "overbrace", "underbrace",
];

const MATH_STYLES: &[&str] = &[
    "mathrm", "mathit", "mathbf", "mathsf", "mathtt", "mathcal", "mathfrak", "mathbb", "mathscr",
    "boldsymbol", "bm", "ensuremath",
];

const TEXT_STYLES: &[&str] = &[
    "text", "textrm", "textit", "textbf", "textsf", "texttt", "textnormal", "mbox",
];

const SWITCHES: &[&str] = &[
    "displaystyle", "textstyle", "scriptstyle", "scriptscriptstyle", "rm", "bf", "it", "sf", "tt",
    "cal", "tiny", "scriptsize", "footnotesize", "small", "normalsize", "large", "Large", "LARGE",
    "huge", "Huge",
];

const SPACES: &[(&str, &str)] = &[
    (",", "\u{2009}"),
    (":", "\u{205f}"),
    (";", "\u{2004}"),
    ("!", ""),
    (" ", " "),
    ("quad", "\u{2003}"),
    ("qquad", "\u{2003}\u{2003}"),
    ("enspace", "\u{2002}"),
    ("thinspace", "\u{2009}"),
    ("medspace", "\u{205f}"),
    ("thickspace", "\u{2004}"),
    ("negthinspace", ""),
];

const MATH_LITERALS: &[(&str, SymbolClass)] = &[
    ("+", Bin),
    ("-", Bin),
    ("*", Bin),
    ("±", Bin),
    ("×", Bin),
    ("÷", Bin),
    ("·", Bin),
    ("=", Rel),
    ("<", Rel),
    (">", Rel),
    (":", Rel),
    ("≤", Rel),
    ("≥", Rel),
    ("≠", Rel),
    ("≈", Rel),
    ("→", Rel),
    ("∈", Rel),
    ("(", Open),
    ("[", Open),
    (")", Close),
    ("]", Close),
    ("!", Close),
    ("?", Close),
    (",", Punct),
    (";", Punct),
];

fn fence(open: &str, close: &str) -> Option<Fence> {
    Some(Fence::new(open, close))
}

pub(super) fn install(registry: &mut Registry) {
    let both = &[Math, Text];

    for &(name, value) in GREEK.iter().chain(ORDINARY) {
        registry.define(name, &[Math], Definition::symbol(Ord, value));
    }
    for &(name, value) in BINARY {
        registry.define(name, &[Math], Definition::symbol(Bin, value));
    }
    for &(name, value) in RELATIONS {
        registry.define(name, &[Math], Definition::symbol(Rel, value));
    }
    for &(name, value, class) in FENCES {
        registry.define(name, &[Math], Definition::symbol(class, value));
    }
    for &(name, value) in INNER {
        registry.define(name, &[Math], Definition::symbol(Inner, value));
    }
    for &(name, value, limits) in BIG_OPERATORS {
        let definition = Definition::new(Construct::Operator(limits)).with_value(value);
        registry.define(name, &[Math], definition);
    }
    for &name in FUNCTIONS {
        let definition = Definition::new(Construct::Operator(Limits::NoLimits)).with_value(name);
        registry.define(name, &[Math], definition);
    }
    for &name in FUNCTIONS_WITH_LIMITS {
        let definition = Definition::new(Construct::Operator(Limits::Auto)).with_value(name);
        registry.define(name, &[Math], definition);
    }
    registry.define(
        "operatorname",
        &[Math],
        Definition::new(Construct::OperatorName(Limits::NoLimits)).with_args("{:string}"),
    );
    registry.define(
        "operatorname*",
        &[Math],
        Definition::new(Construct::OperatorName(Limits::Auto)).with_args("{:string}"),
    );

    for (name, bar, delimiters) in [
        ("frac", true, None),
        ("dfrac", true, None),
        ("tfrac", true, None),
        ("cfrac", true, None),
        ("binom", false, fence("(", ")")),
        ("dbinom", false, fence("(", ")")),
        ("tbinom", false, fence("(", ")")),
    ] {
        let definition = Definition::new(Construct::Fraction {
            bar,
            fence: delimiters,
        })
        .with_args("{:math}{:math}");
        registry.define(name, &[Math], definition);
    }
    for (name, bar, delimiters, signature) in [
        ("over", true, None, ""),
        ("atop", false, None, ""),
        ("choose", false, fence("(", ")"), ""),
        ("brack", false, fence("[", "]"), ""),
        ("brace", false, fence(r"\{", r"\}"), ""),
        ("above", true, None, "{:dimension}"),
    ] {
        let definition = Definition::new(Construct::Infix {
            bar,
            fence: delimiters,
        })
        .with_args(signature);
        registry.define(name, &[Math], definition);
    }

    registry.define(
        "sqrt",
        &[Math],
        Definition::new(Construct::Root).with_args("[:math]{:math}"),
    );
    for &name in ACCENTS {
        let definition = Definition::new(Construct::Accent).with_args("{:math}");
        registry.define(name, &[Math], definition);
    }
    for &name in ENCLOSURES {
        let definition = Definition::new(Construct::Enclose).with_args("{:math}");
        registry.define(name, &[Math], definition);
    }

    for &name in MATH_STYLES {
        let definition =
            Definition::new(Construct::Group(GroupVariant::Command)).with_args("{:math}");
        registry.define(name, &[Math], definition);
    }
    for &name in TEXT_STYLES {
        let definition = Definition::new(Construct::Group(GroupVariant::Text)).with_args("{:text}");
        registry.define(name, both, definition);
    }
    registry.define(
        "textcolor",
        both,
        Definition::new(Construct::Group(GroupVariant::Command)).with_args("{:color}{:auto}"),
    );
    registry.define(
        "colorbox",
        both,
        Definition::new(Construct::Group(GroupVariant::Text)).with_args("{:color}{:text}"),
    );

    for &name in SWITCHES {
        registry.define(name, both, Definition::new(Construct::StyleSwitch { mode: None }));
    }
    registry.define(
        "color",
        both,
        Definition::new(Construct::StyleSwitch { mode: None }).with_args("{:color}"),
    );

    for &(name, value) in SPACES {
        registry.define(name, both, Definition::new(Construct::Spacing).with_value(value));
    }
    for (name, signature) in [
        ("hspace", "{:glue}"),
        ("hspace*", "{:glue}"),
        ("hskip", "{:glue}"),
        ("mskip", "{:glue}"),
        ("kern", "{:dimension}"),
        ("mkern", "{:dimension}"),
    ] {
        registry.define(name, both, Definition::new(Construct::Spacing).with_args(signature));
    }

    registry.define(
        "placeholder",
        both,
        Definition::new(Construct::Placeholder).with_args("[:string]{:string}"),
    );
    registry.define("(", both, Definition::new(Construct::ModeSet { display: false }));
    registry.define("[", both, Definition::new(Construct::ModeSet { display: true }));

    for (name, value) in [
        ("textbackslash", "\\"),
        ("{", "{"),
        ("}", "}"),
        ("%", "%"),
        ("#", "#"),
        ("&", "&"),
        ("$", "$"),
        ("_", "_"),
        ("textasciitilde", "~"),
        ("textasciicircum", "^"),
        ("textendash", "–"),
        ("textemdash", "—"),
    ] {
        registry.define(name, &[Text], Definition::new(Construct::TextSymbol).with_value(value));
    }

    for &(text, class) in MATH_LITERALS {
        registry.define_symbol(text, Math, Definition::symbol(class, text));
    }
    registry.define_symbol("~", Math, Definition::new(Construct::Spacing).with_value("~"));
    registry.define_symbol("~", Text, Definition::new(Construct::Spacing).with_value("~"));

    for (name, signature, delimiters) in [
        ("matrix", "", None),
        ("pmatrix", "", fence("(", ")")),
        ("bmatrix", "", fence("[", "]")),
        ("Bmatrix", "", fence(r"\{", r"\}")),
        ("vmatrix", "", fence("|", "|")),
        ("Vmatrix", "", fence(r"\Vert", r"\Vert")),
        ("smallmatrix", "", None),
        ("array", "{:colspec}", None),
        ("subarray", "{:colspec}", None),
        ("aligned", "", None),
        ("align", "", None),
        ("align*", "", None),
        ("alignedat", "{:number}", None),
        ("gathered", "", None),
        ("gather", "", None),
        ("split", "", None),
        ("cases", "", fence(r"\{", ".")),
        ("rcases", "", fence(".", r"\}")),
    ] {
        registry.define_environment(name, EnvironmentDefinition::new(signature, delimiters));
    }
}
