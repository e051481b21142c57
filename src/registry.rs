mod builtins;

use std::{collections::HashMap, str::FromStr};

use serde::Deserialize;
use strum::{Display, EnumString};

use crate::latex_tree::{Fence, GroupVariant, Limits, Mode, SymbolClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ArgKind {
    Math,
    Text,
    String,
    Number,
    Dimension,
    Glue,
    Color,
    #[strum(serialize = "colspec")]
    ColumnSpec,
    Delimiter,
    /// Same mode as the surrounding content.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub optional: bool,
    pub kind: ArgKind,
}

impl ArgSpec {
    /// Reads a compact signature such as `[:math]{:auto}`: one bracketed
    /// item per argument, `[]` optional and `{}` required, with an optional
    /// `:kind` (default `auto`).
    pub fn parse_signature(signature: &str) -> Vec<ArgSpec> {
        let mut specs = vec![];
        let mut chars = signature.chars();
        while let Some(open) = chars.next() {
            let (optional, close) = match open {
                '[' => (true, ']'),
                '{' => (false, '}'),
                _ => continue,
            };
            let inner: String = chars.by_ref().take_while(|&c| c != close).collect();
            let name = inner.trim().trim_start_matches(':');
            let kind = if name.is_empty() {
                ArgKind::Auto
            } else {
                ArgKind::from_str(name).unwrap_or_else(|_| {
                    log::debug!("unknown argument kind '{name}' in '{signature}'");
                    ArgKind::Auto
                })
            };
            specs.push(ArgSpec { optional, kind });
        }
        specs
    }
}

/// What a registered command or symbol builds.
#[derive(Debug, Clone, PartialEq)]
pub enum Construct {
    Symbol(SymbolClass),
    TextSymbol,
    Operator(Limits),
    /// `\operatorname{...}`, taking its name as a string argument.
    OperatorName(Limits),
    Fraction { bar: bool, fence: Option<Fence> },
    /// `\over` and friends, splitting the surrounding sequence.
    Infix { bar: bool, fence: Option<Fence> },
    Root,
    Accent,
    Enclose,
    Group(GroupVariant),
    StyleSwitch { mode: Option<Mode> },
    Spacing,
    Placeholder,
    /// `\(` or `\[`, parsed up to the closing command.
    ModeSet { display: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub construct: Construct,
    pub value: Option<String>,
    pub args: Vec<ArgSpec>,
}

impl Definition {
    pub fn new(construct: Construct) -> Self {
        Self {
            construct,
            value: None,
            args: vec![],
        }
    }

    pub fn symbol(class: SymbolClass, value: &str) -> Self {
        Self::new(Construct::Symbol(class)).with_value(value)
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_args(mut self, signature: &str) -> Self {
        self.args = ArgSpec::parse_signature(signature);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentDefinition {
    pub args: Vec<ArgSpec>,
    pub fence: Option<Fence>,
    pub cell_mode: Mode,
}

impl EnvironmentDefinition {
    pub fn new(signature: &str, fence: Option<Fence>) -> Self {
        Self {
            args: ArgSpec::parse_signature(signature),
            fence,
            cell_mode: Mode::Math,
        }
    }
}

/// Every command, symbol and environment the parser understands.
///
/// Built once and shared read-only; use the `define*` methods to extend it
/// before handing it out.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    commands: HashMap<Mode, HashMap<String, Definition>>,
    symbols: HashMap<Mode, HashMap<String, Definition>>,
    environments: HashMap<String, EnvironmentDefinition>,
}

fn table_mode(mode: Mode) -> Mode {
    match mode {
        Mode::Command => Mode::Math,
        mode => mode,
    }
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The commands, symbols and environments of standard LaTeX math.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        builtins::install(&mut registry);
        registry
    }

    pub fn lookup(&self, name: &str, mode: Mode) -> Option<&Definition> {
        self.commands.get(&table_mode(mode))?.get(name)
    }

    pub fn symbol(&self, text: &str, mode: Mode) -> Option<&Definition> {
        self.symbols.get(&table_mode(mode))?.get(text)
    }

    pub fn environment(&self, name: &str) -> Option<&EnvironmentDefinition> {
        self.environments.get(name)
    }

    pub fn define(&mut self, name: &str, modes: &[Mode], definition: Definition) {
        for &mode in modes {
            self.commands
                .entry(table_mode(mode))
                .or_default()
                .insert(name.into(), definition.clone());
        }
    }

    pub fn define_symbol(&mut self, text: &str, mode: Mode, definition: Definition) {
        self.symbols
            .entry(table_mode(mode))
            .or_default()
            .insert(text.into(), definition);
    }

    pub fn define_environment(&mut self, name: &str, definition: EnvironmentDefinition) {
        self.environments.insert(name.into(), definition);
    }
}

const FENCE_PAIRS: &[(&str, &str)] = &[
    ("(", ")"),
    ("[", "]"),
    (r"\{", r"\}"),
    (r"\lbrace", r"\rbrace"),
    (r"\lbrack", r"\rbrack"),
    (r"\langle", r"\rangle"),
    (r"\lfloor", r"\rfloor"),
    (r"\lceil", r"\rceil"),
    (r"\lvert", r"\rvert"),
    (r"\lVert", r"\rVert"),
    (r"\lgroup", r"\rgroup"),
    (r"\lmoustache", r"\rmoustache"),
    ("|", "|"),
    (r"\|", r"\|"),
    (r"\vert", r"\vert"),
    (r"\Vert", r"\Vert"),
    ("<", ">"),
];

const LONE_DELIMITERS: &[&str] = &[
    ".",
    "/",
    r"\backslash",
    r"\uparrow",
    r"\downarrow",
    r"\updownarrow",
    r"\Uparrow",
    r"\Downarrow",
    r"\Updownarrow",
];

/// Whether `latex` may follow `\left`, `\middle` or `\right`. Opening and
/// closing delimiters need not match.
pub fn is_delimiter(latex: &str) -> bool {
    LONE_DELIMITERS.contains(&latex)
        || FENCE_PAIRS
            .iter()
            .any(|&(open, close)| open == latex || close == latex)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "MacroSource")]
pub struct MacroDefinition {
    pub template: String,
    pub args: usize,
}

impl MacroDefinition {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let args = highest_parameter(&template);
        Self { template, args }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MacroSource {
    Template(String),
    Full { template: String, args: Option<usize> },
}

impl From<MacroSource> for MacroDefinition {
    fn from(source: MacroSource) -> Self {
        match source {
            MacroSource::Template(template) => MacroDefinition::new(template),
            MacroSource::Full {
                template,
                args: Some(args),
            } => MacroDefinition { template, args },
            MacroSource::Full {
                template,
                args: None,
            } => MacroDefinition::new(template),
        }
    }
}

fn highest_parameter(template: &str) -> usize {
    template
        .split('#')
        .skip(1)
        .filter_map(|rest| rest.chars().next()?.to_digit(10))
        .max()
        .unwrap_or(0) as usize
}

/// User macros, consulted for commands the registry does not know.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Macros(HashMap<String, MacroDefinition>);

impl Macros {
    pub fn new() -> Self {
        Self::default()
    }

    /// A few shorthands for common notation: blackboard sets, upright
    /// constants and differentials.
    pub fn standard() -> Self {
        let mut macros = Self::new();
        for (name, template) in [
            ("R", r"\mathbb{R}"),
            ("N", r"\mathbb{N}"),
            ("Z", r"\mathbb{Z}"),
            ("Q", r"\mathbb{Q}"),
            ("C", r"\mathbb{C}"),
            ("iff", r"\;\Longleftrightarrow\;"),
            ("nicefrac", r"^{#1}\!\!/\!_{#2}"),
            ("imaginaryI", r"\mathrm{i}"),
            ("imaginaryJ", r"\mathrm{j}"),
            ("exponentialE", r"\mathrm{e}"),
            ("differentialD", r"\mathrm{d}"),
            ("capitalDifferentialD", r"\mathrm{D}"),
        ] {
            macros.define(name, template);
        }
        macros
    }

    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        self.0.get(name)
    }

    pub fn define(&mut self, name: &str, template: &str) {
        self.0.insert(name.into(), MacroDefinition::new(template));
    }

    pub fn remove(&mut self, name: &str) -> Option<MacroDefinition> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn signatures() {
        assert_eq!(
            ArgSpec::parse_signature("[:math]{:auto}{}{:colspec}"),
            [
                ArgSpec {
                    optional: true,
                    kind: ArgKind::Math
                },
                ArgSpec {
                    optional: false,
                    kind: ArgKind::Auto
                },
                ArgSpec {
                    optional: false,
                    kind: ArgKind::Auto
                },
                ArgSpec {
                    optional: false,
                    kind: ArgKind::ColumnSpec
                },
            ]
        );
        assert_eq!(ArgSpec::parse_signature(""), []);
    }

    #[test]
    fn lookups_are_per_mode() {
        let registry = Registry::standard();
        assert!(registry.lookup("frac", Mode::Math).is_some());
        assert!(registry.lookup("frac", Mode::Text).is_none());
        assert!(registry.lookup("text", Mode::Text).is_some());
        assert!(registry.lookup("alpha", Mode::Command).is_some());
        assert_eq!(
            registry.symbol("+", Mode::Math).map(|d| &d.construct),
            Some(&Construct::Symbol(SymbolClass::Bin))
        );
        assert!(registry.environment("pmatrix").is_some());
        assert!(registry.environment("nope").is_none());
    }

    #[test]
    fn delimiters() {
        assert!(is_delimiter("("));
        assert!(is_delimiter(r"\rangle"));
        assert!(is_delimiter("."));
        assert!(!is_delimiter("x"));
    }

    #[test]
    fn macro_argument_counts() {
        assert_eq!(MacroDefinition::new(r"\frac{#1}{#2}").args, 2);
        assert_eq!(MacroDefinition::new(r"#3").args, 3);
        assert_eq!(MacroDefinition::new(r"\mathbb{R}").args, 0);
    }

    #[test]
    fn macros_deserialize() {
        let macros: Macros = serde_json::from_str(
            r#"{"half": "\\frac{#1}{2}", "pair": {"template": "(#1, #2)", "args": 2}}"#,
        )
        .unwrap();
        assert_eq!(macros.get("half").map(|m| m.args), Some(1));
        assert_eq!(
            macros.get("pair"),
            Some(&MacroDefinition {
                template: "(#1, #2)".into(),
                args: 2
            })
        );
    }
}
