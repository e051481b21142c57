use std::{fmt, str::FromStr};

use derive_more::Display;
use log::{debug, warn};
use strum::{Display as StrumDisplay, EnumString};
use thiserror::Error;
use typed_index_collections::TiVec;

use crate::{
    latex_lexer::{tokenize, tokens_to_string, Token},
    latex_tree::{
        ArrayAtom, Atom, AtomKind, ColumnAlign, ColumnFormat, GroupVariant, Limits, Mode,
        Relation, Sequence, SequenceDisplay, SymbolClass,
    },
    registry::{
        is_delimiter, ArgKind, ArgSpec, Construct, Definition, EnvironmentDefinition,
        MacroDefinition, Macros, Registry,
    },
};

pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;
const MAX_MACRO_DEPTH: usize = 32;

/// Something malformed in the input. Parsing always goes on and produces a
/// best-effort tree; these are collected alongside it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unknown command '\\{0}'")]
    UnknownCommand(String),
    #[error("unknown environment '{0}'")]
    UnknownEnvironment(String),
    #[error("missing argument for '\\{0}'")]
    MissingArgument(String),
    #[error("unbalanced braces")]
    UnbalancedBraces,
    #[error("unclosed optional argument")]
    UnclosedOptionalArgument,
    #[error("expected '\\end{{{0}}}'")]
    MissingEnd(String),
    #[error("'\\end{{{found}}}' does not match '\\begin{{{expected}}}'")]
    MismatchedEnd { expected: String, found: String },
    #[error("missing '\\right'")]
    MissingRight,
    #[error("unexpected '\\{0}'")]
    UnexpectedCommand(String),
    #[error("invalid delimiter '{0}'")]
    InvalidDelimiter(String),
    #[error("missing closing math shift")]
    MissingModeShift,
    #[error("more than one infix command in a group, ignoring '\\{0}'")]
    AmbiguousInfix(String),
    #[error("'&' outside of an environment")]
    MisplacedAlignment,
    #[error("invalid unit of measure")]
    InvalidDimension,
    #[error("macro '\\{0}' nests too deeply")]
    MacroDepth(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DimensionUnit {
    Pt,
    Mm,
    Cm,
    In,
    Ex,
    Em,
    Bp,
    Dd,
    Pc,
    Sp,
    Mu,
    Px,
}

#[derive(Debug, Clone, Copy, PartialEq, Display)]
#[display("{value}{unit}")]
pub struct Dimension {
    pub value: f64,
    pub unit: DimensionUnit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glue {
    pub glue: Dimension,
    pub grow: Option<Dimension>,
    pub shrink: Option<Dimension>,
}

impl fmt::Display for Glue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glue)?;
        if let Some(grow) = self.grow {
            write!(f, " plus {grow}")?;
        }
        if let Some(shrink) = self.shrink {
            write!(f, " minus {shrink}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Argument {
    Atoms(Vec<Atom>),
    String(String),
    Number(f64),
    Dimension(Dimension),
    Glue(Glue),
    Columns(Vec<ColumnFormat>),
    Delimiter(String),
}

impl Argument {
    fn into_text(self) -> String {
        match self {
            Argument::Atoms(atoms) => SequenceDisplay(&atoms).to_string(),
            Argument::String(s) | Argument::Delimiter(s) => s,
            Argument::Number(n) => n.to_string(),
            Argument::Dimension(d) => d.to_string(),
            Argument::Glue(g) => g.to_string(),
            Argument::Columns(columns) => columns.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Where a sequence ends, besides the structural tokens that end every
/// sequence (`}`, `\end`, `\right`, `\middle`, and cell separators in an
/// environment).
#[derive(Debug, Clone, Copy, PartialEq)]
enum Until {
    GroupClose,
    Shift { display: bool },
    Command(&'static str),
    Bracket,
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
    mode: Mode,
    tabular: bool,
    args: Vec<String>,
    registry: &'a Registry,
    macros: &'a Macros,
    iterations: usize,
    max_iterations: usize,
    depth: usize,
    errors: Vec<ParseError>,
}

/// Parses a token run into atoms. `args[n]` is the LaTeX substituted for
/// `#n`.
pub fn parse(
    tokens: &[Token],
    mode: Mode,
    args: &[String],
    registry: &Registry,
    macros: &Macros,
) -> Vec<Atom> {
    Parser::new(tokens, mode, registry, macros)
        .with_args(args)
        .parse()
}

pub fn parse_latex(latex: &str, mode: Mode, registry: &Registry, macros: &Macros) -> Vec<Atom> {
    parse(&tokenize(latex), mode, &[], registry, macros)
}

fn limits_command(token: &Token) -> Option<Limits> {
    match token {
        Token::Command(name) => match name.as_str() {
            "limits" => Some(Limits::Limits),
            "nolimits" => Some(Limits::NoLimits),
            "displaylimits" => Some(Limits::Auto),
            _ => None,
        },
        _ => None,
    }
}

fn required(args: &mut [Option<Argument>], index: usize, mode: Mode) -> Sequence {
    match args.get_mut(index).and_then(Option::take) {
        Some(Argument::Atoms(atoms)) => Sequence::from_atoms(atoms),
        _ => Sequence::from_atoms([Atom::placeholder(mode)]),
    }
}

fn text_argument(args: &mut [Option<Argument>], index: usize) -> Option<String> {
    args.get_mut(index)
        .and_then(Option::take)
        .map(Argument::into_text)
}

/// Attaches a script to the last atom, or to a fresh carrier when the last
/// atom can't take it.
fn attach(mode: Mode, atoms: &mut Vec<Atom>, relation: Relation, script: Vec<Atom>) {
    let needs_carrier = atoms
        .last()
        .map_or(true, |atom| !atom.supports_scripts() || atom.branch(relation).is_some());
    if needs_carrier {
        atoms.push(Atom::new(mode, AtomKind::SupSub));
    }
    if let Some(sequence) = atoms
        .last_mut()
        .and_then(|atom| atom.branch_mut_or_insert(relation))
    {
        let end = sequence.len();
        sequence.insert_all(end, script);
    }
}

fn parse_columns(tokens: &[Token]) -> Vec<ColumnFormat> {
    let mut columns = vec![];
    let mut i = 0;
    while let Some(token) = tokens.get(i) {
        i += 1;
        let Token::Literal(c) = token else {
            continue;
        };
        columns.push(match c.as_str() {
            "l" => ColumnFormat::Align(ColumnAlign::Left),
            "c" => ColumnFormat::Align(ColumnAlign::Center),
            "r" => ColumnFormat::Align(ColumnAlign::Right),
            "|" => ColumnFormat::Separator { dashed: false },
            ":" => ColumnFormat::Separator { dashed: true },
            "p" if tokens.get(i) == Some(&Token::GroupOpen) => {
                let start = i + 1;
                let end = tokens[start..]
                    .iter()
                    .position(|t| *t == Token::GroupClose)
                    .map_or(tokens.len(), |n| start + n);
                i = end + 1;
                ColumnFormat::Paragraph(tokens_to_string(&tokens[start..end]))
            }
            other => {
                debug!("ignoring column specifier '{other}'");
                continue;
            }
        });
    }
    columns
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], mode: Mode, registry: &'a Registry, macros: &'a Macros) -> Self {
        Self {
            tokens,
            index: 0,
            mode,
            tabular: false,
            args: vec![],
            registry,
            macros,
            iterations: 0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            depth: 0,
            errors: vec![],
        }
    }

    pub fn with_args(mut self, args: &[String]) -> Self {
        self.args = args.to_vec();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Parses everything, returning the atoms along with the soft errors.
    pub fn finish(mut self) -> (Vec<Atom>, Vec<ParseError>) {
        let atoms = self.parse();
        (atoms, self.errors)
    }

    pub fn parse(&mut self) -> Vec<Atom> {
        let mut atoms = vec![];
        loop {
            atoms.extend(self.parse_sequence(Until::GroupClose));
            if self.peek().is_none() {
                break;
            }
            self.skip_stray();
        }
        atoms
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn peek_is(&self, f: impl Fn(&Token) -> bool) -> bool {
        self.peek().is_some_and(f)
    }

    fn peek_literal(&self, ahead: usize) -> Option<&str> {
        match self.tokens.get(self.index + ahead) {
            Some(Token::Literal(s)) => Some(s),
            _ => None,
        }
    }

    fn error(&mut self, error: ParseError) {
        debug!("{error}");
        self.errors.push(error);
    }

    /// Counts one loop iteration, giving up on the rest of the input once
    /// the budget runs out.
    fn tick(&mut self) -> bool {
        self.iterations += 1;
        if self.iterations <= self.max_iterations {
            return true;
        }
        if self.iterations == self.max_iterations + 1 {
            warn!(
                "parser made no progress after {} iterations, dropping the rest of the input",
                self.max_iterations
            );
        }
        self.index = self.tokens.len();
        false
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(&Token::Space) {
            self.index += 1;
        }
    }

    fn skip_math_spaces(&mut self) {
        if self.mode != Mode::Text {
            self.skip_spaces();
        }
    }

    fn at_stop(&self, until: Until) -> bool {
        let Some(token) = self.peek() else {
            return true;
        };
        if *token == Token::GroupClose
            || token.is_command("end")
            || token.is_command("right")
            || token.is_command("middle")
        {
            return true;
        }
        if self.tabular
            && (token.is_literal("&") || token.is_command("\\") || token.is_command("cr"))
        {
            return true;
        }
        match until {
            Until::GroupClose => false,
            Until::Shift { display: true } => *token == Token::DisplayShift,
            Until::Shift { display: false } => *token == Token::InlineShift,
            Until::Command(name) => token.is_command(name),
            Until::Bracket => token.is_literal("]"),
        }
    }

    fn with_mode<T>(&mut self, mode: Mode, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = (self.mode, self.tabular);
        self.mode = mode;
        self.tabular = false;
        let result = f(self);
        (self.mode, self.tabular) = saved;
        result
    }

    fn expect_group_close(&mut self) {
        if self.peek() == Some(&Token::GroupClose) {
            self.index += 1;
        } else {
            self.error(ParseError::UnbalancedBraces);
        }
    }

    fn skip_stray(&mut self) {
        let Some(token) = self.peek().cloned() else {
            return;
        };
        self.index += 1;
        match token {
            Token::GroupClose => self.error(ParseError::UnbalancedBraces),
            Token::Command(name) => {
                match name.as_str() {
                    "right" | "middle" => {
                        self.scan_delimiter();
                    }
                    "end" => {
                        self.scan_name();
                    }
                    _ => {}
                }
                self.error(ParseError::UnexpectedCommand(name));
            }
            other => debug!("skipping '{other}'"),
        }
    }

    fn parse_sequence(&mut self, until: Until) -> Vec<Atom> {
        let mut atoms = vec![];
        let mut infix: Option<(Atom, Vec<Atom>)> = None;

        while self.tick() {
            self.skip_math_spaces();
            if self.at_stop(until) {
                break;
            }
            let start = self.index;

            if let Some(Token::Command(name)) = self.peek() {
                let name = name.clone();
                let registry = self.registry;
                if let Some(definition) = registry.lookup(&name, self.mode) {
                    match definition.construct {
                        Construct::Infix { .. } => {
                            self.index += 1;
                            let args = self.parse_arguments(&name, &definition.args);
                            if infix.is_some() {
                                self.error(ParseError::AmbiguousInfix(name));
                            } else {
                                let fraction = self.build_infix(&name, definition, args);
                                infix = Some((fraction, std::mem::take(&mut atoms)));
                            }
                            continue;
                        }
                        Construct::StyleSwitch { mode } => {
                            self.index += 1;
                            let args = self.parse_arguments(&name, &definition.args);
                            atoms.extend(self.build(&name, definition, args));
                            if let Some(mode) = mode {
                                self.mode = mode;
                            }
                            continue;
                        }
                        _ => {}
                    }
                }
            }

            let produced = self.parse_atom();
            atoms.extend(produced);
            self.parse_scripts(&mut atoms);

            if self.index == start {
                debug!("skipping unexpected {:?}", self.peek());
                self.index += 1;
            }
        }

        match infix {
            Some((mut fraction, numerator_atoms)) => {
                if let AtomKind::Fraction {
                    numerator,
                    denominator,
                    ..
                } = &mut fraction.kind
                {
                    *numerator = Sequence::from_atoms(numerator_atoms);
                    *denominator = Sequence::from_atoms(atoms);
                }
                vec![fraction]
            }
            None => atoms,
        }
    }

    fn parse_atom(&mut self) -> Vec<Atom> {
        let Some(token) = self.peek().cloned() else {
            return vec![];
        };
        let text_mode = self.mode == Mode::Text;
        match token {
            Token::GroupOpen => {
                self.index += 1;
                let mode = self.mode;
                let children = self.with_mode(mode, |p| p.parse_sequence(Until::GroupClose));
                self.expect_group_close();
                match <[Atom; 1]>::try_from(children) {
                    // `{a \over b}` is how an infix fraction is written back
                    Ok([fraction]) if fraction.is_infix_fraction() => vec![fraction],
                    Ok([child]) => vec![Atom::group(self.mode, GroupVariant::Plain, vec![child])],
                    Err(children) => vec![Atom::group(self.mode, GroupVariant::Plain, children)],
                }
            }
            Token::InlineShift | Token::DisplayShift => {
                self.index += 1;
                vec![self.parse_shift(token == Token::DisplayShift)]
            }
            Token::Command(name) => match name.as_str() {
                "begin" => vec![self.parse_environment()],
                "left" => vec![self.parse_left_right()],
                "limits" | "nolimits" | "displaylimits" if !text_mode => vec![],
                _ => self.parse_command(name),
            },
            Token::Literal(text) => self.parse_literal(text),
            Token::Parameter(c) => {
                self.index += 1;
                self.substitute(c)
            }
            Token::Space => {
                self.index += 1;
                if text_mode {
                    vec![Atom::text(" ")]
                } else {
                    vec![]
                }
            }
            Token::Escape => {
                self.index += 1;
                vec![if text_mode {
                    Atom::text("\\").with_command("textbackslash")
                } else {
                    Atom::symbol(self.mode, SymbolClass::Ord, "\\").with_command("backslash")
                }]
            }
            Token::Superscript | Token::Subscript if text_mode => {
                self.index += 1;
                vec![if token == Token::Superscript {
                    Atom::text("^").with_command("textasciicircum")
                } else {
                    Atom::text("_").with_command("_")
                }]
            }
            Token::Superscript | Token::Subscript | Token::GroupClose => vec![],
        }
    }

    fn parse_literal(&mut self, text: String) -> Vec<Atom> {
        if self.mode != Mode::Text && text == "'" {
            return vec![];
        }
        self.index += 1;
        let registry = self.registry;
        if let Some(definition) = registry.symbol(&text, self.mode) {
            let mut atom = self.build_leaf(definition);
            atom.value = Some(text);
            return vec![atom];
        }
        match self.mode {
            Mode::Text => vec![Atom::text(text)],
            mode => {
                let mut atom = Atom::symbol(mode, SymbolClass::Ord, text);
                if atom.value() == "&" {
                    self.error(ParseError::MisplacedAlignment);
                    atom.error = true;
                }
                vec![atom]
            }
        }
    }

    fn parse_command(&mut self, name: String) -> Vec<Atom> {
        self.index += 1;
        let registry = self.registry;
        if let Some(definition) = registry.lookup(&name, self.mode) {
            if let Construct::ModeSet { display } = definition.construct {
                return vec![self.parse_mode_set(&name, display)];
            }
            let args = self.parse_arguments(&name, &definition.args);
            return self.build(&name, definition, args);
        }
        let macros = self.macros;
        if let Some(definition) = macros.get(&name) {
            return vec![self.expand_macro(&name, definition)];
        }
        self.error(ParseError::UnknownCommand(name.clone()));
        vec![self.unknown(&name)]
    }

    fn unknown(&self, name: &str) -> Atom {
        Atom::symbol(self.mode, SymbolClass::Ord, format!("\\{name}"))
            .with_command(name)
            .with_error()
    }

    fn parse_scripts(&mut self, atoms: &mut Vec<Atom>) {
        if self.mode == Mode::Text {
            return;
        }
        loop {
            self.skip_spaces();
            let Some(token) = self.peek() else {
                break;
            };
            if matches!(token, Token::Superscript | Token::Subscript) {
                let relation = if *token == Token::Superscript {
                    Relation::Superscript
                } else {
                    Relation::Subscript
                };
                self.index += 1;
                let script = self.parse_script_argument();
                attach(self.mode, atoms, relation, script);
            } else if token.is_literal("'") {
                let mut primes = vec![];
                while self.peek_is(|t| t.is_literal("'")) {
                    self.index += 1;
                    primes.push(Atom::symbol(self.mode, SymbolClass::Ord, "′").with_command("prime"));
                }
                match atoms.last_mut() {
                    Some(atom) if atom.supports_scripts() => {
                        if let Some(superscript) = atom.branch_mut_or_insert(Relation::Superscript)
                        {
                            let end = superscript.len();
                            superscript.insert_all(end, primes);
                        }
                    }
                    _ => attach(self.mode, atoms, Relation::Superscript, primes),
                }
            } else if let Some(limits) = limits_command(token) {
                self.index += 1;
                if let Some(Atom {
                    kind: AtomKind::Operator { limits: l, explicit },
                    ..
                }) = atoms.last_mut()
                {
                    *l = limits;
                    *explicit = true;
                }
            } else {
                break;
            }
        }
    }

    fn parse_script_argument(&mut self) -> Vec<Atom> {
        self.skip_spaces();
        if self.peek() == Some(&Token::GroupOpen) {
            self.index += 1;
            let mode = self.mode;
            let atoms = self.with_mode(mode, |p| p.parse_sequence(Until::GroupClose));
            self.expect_group_close();
            return atoms;
        }
        let start = self.index;
        let atoms = if self.at_stop(Until::GroupClose) {
            vec![]
        } else {
            self.parse_atom()
        };
        if self.index == start {
            self.error(ParseError::MissingArgument("^".into()));
            return vec![Atom::placeholder(self.mode)];
        }
        atoms
    }

    fn parse_shift(&mut self, display: bool) -> Atom {
        let children = self.with_mode(Mode::Math, |p| p.parse_sequence(Until::Shift { display }));
        let closer = if display {
            Token::DisplayShift
        } else {
            Token::InlineShift
        };
        if self.peek() == Some(&closer) {
            self.index += 1;
        } else {
            self.error(ParseError::MissingModeShift);
        }
        let variant = if display {
            GroupVariant::Display
        } else {
            GroupVariant::Inline
        };
        Atom::group(self.mode, variant, children)
    }

    fn parse_mode_set(&mut self, opener: &str, display: bool) -> Atom {
        let closer = if display { "]" } else { ")" };
        let children = self.with_mode(Mode::Math, |p| p.parse_sequence(Until::Command(closer)));
        if self.peek_is(|t| t.is_command(closer)) {
            self.index += 1;
        } else {
            self.error(ParseError::MissingModeShift);
        }
        let variant = if display {
            GroupVariant::Display
        } else {
            GroupVariant::Inline
        };
        Atom::group(self.mode, variant, children).with_command(opener)
    }

    fn parse_left_right(&mut self) -> Atom {
        self.index += 1;
        let left = self.delimiter_or_dot();
        let mut body = vec![];
        let mode = self.mode;
        let right = loop {
            body.extend(self.with_mode(mode, |p| p.parse_sequence(Until::GroupClose)));
            if self.peek_is(|t| t.is_command("middle")) {
                self.index += 1;
                let middle = self.delimiter_or_dot();
                body.push(Atom::symbol(mode, SymbolClass::Rel, middle).with_command("middle"));
            } else if self.peek_is(|t| t.is_command("right")) {
                self.index += 1;
                break self.delimiter_or_dot();
            } else {
                self.error(ParseError::MissingRight);
                break ".".into();
            }
        };
        Atom::new(
            mode,
            AtomKind::LeftRight {
                left,
                right,
                body: Sequence::from_atoms(body),
            },
        )
    }

    fn parse_environment(&mut self) -> Atom {
        self.index += 1;
        let Some(name) = self.scan_name() else {
            self.error(ParseError::MissingArgument("begin".into()));
            return self.unknown("begin");
        };
        let registry = self.registry;
        let (definition, known) = match registry.environment(&name) {
            Some(definition) => (definition.clone(), true),
            None => {
                self.error(ParseError::UnknownEnvironment(name.clone()));
                (EnvironmentDefinition::new("", None), false)
            }
        };

        let mut array = ArrayAtom::new(name.clone());
        array.fence = definition.fence.clone();
        for arg in self.parse_arguments("begin", &definition.args).into_iter().flatten() {
            match arg {
                Argument::Columns(columns) => array.columns = columns,
                arg => array.arguments.push(arg.into_text()),
            }
        }

        let saved = (self.mode, self.tabular);
        self.mode = definition.cell_mode;
        self.tabular = true;
        let mut row = TiVec::new();
        loop {
            let cell = self.parse_sequence(Until::GroupClose);
            row.push(Sequence::from_atoms(cell));
            self.skip_spaces();
            if self.peek_is(|t| t.is_literal("&")) {
                self.index += 1;
            } else if self.peek_is(|t| t.is_command("\\") || t.is_command("cr")) {
                self.index += 1;
                let gap = self.scan_row_gap();
                array.rows.push(std::mem::take(&mut row));
                array.row_gaps.push(gap);
            } else if self.peek_is(|t| t.is_command("end")) {
                self.index += 1;
                match self.scan_name() {
                    Some(end) if end == name => {}
                    Some(found) => self.error(ParseError::MismatchedEnd {
                        expected: name.clone(),
                        found,
                    }),
                    None => self.error(ParseError::MissingEnd(name.clone())),
                }
                break;
            } else {
                self.error(ParseError::MissingEnd(name.clone()));
                break;
            }
        }
        array.rows.push(row);
        (self.mode, self.tabular) = saved;

        let trailing_empty_row = array.rows.len() > 1
            && array
                .rows
                .last()
                .is_some_and(|row| row.len() == 1 && row.iter().all(|cell| !cell.has_content()));
        if trailing_empty_row {
            array.rows.pop();
            array.row_gaps.pop();
        }

        let mut atom = Atom::new(self.mode, AtomKind::Array(Box::new(array)));
        atom.error = !known;
        atom
    }

    fn substitute(&mut self, parameter: char) -> Vec<Atom> {
        let latex = parameter
            .to_digit(10)
            .and_then(|n| self.args.get(n as usize))
            .filter(|latex| !latex.is_empty())
            .cloned();
        match latex {
            Some(latex) if self.depth < MAX_MACRO_DEPTH => {
                let tokens = tokenize(&latex);
                self.parse_nested(&tokens)
            }
            _ => vec![Atom::placeholder(self.mode)],
        }
    }

    fn expand_macro(&mut self, name: &str, definition: &MacroDefinition) -> Atom {
        let mut raw_args = vec![];
        for _ in 0..definition.args {
            match self.scan_raw_argument() {
                Some(tokens) => raw_args.push(tokens),
                None => {
                    self.error(ParseError::MissingArgument(name.into()));
                    raw_args.push(vec![Token::Parameter('?')]);
                }
            }
        }
        if self.depth >= MAX_MACRO_DEPTH {
            self.error(ParseError::MacroDepth(name.into()));
            return self.unknown(name);
        }

        let expanded: Vec<Token> = tokenize(&definition.template)
            .into_iter()
            .flat_map(|token| match token {
                Token::Parameter(c @ '1'..='9') => c
                    .to_digit(10)
                    .and_then(|n| raw_args.get(n as usize - 1))
                    .cloned()
                    .unwrap_or_else(|| vec![Token::Parameter('?')]),
                other => vec![other],
            })
            .collect();
        let children = self.parse_nested(&expanded);

        let mut atom = Atom::group(self.mode, GroupVariant::Macro, children).with_command(name);
        if !raw_args.is_empty() {
            let call: String = raw_args
                .iter()
                .map(|arg| format!("{{{}}}", tokens_to_string(arg)))
                .collect();
            atom = atom.with_value(call);
        }
        atom
    }

    /// Parses `tokens` in the current mode, sharing the iteration budget.
    fn parse_nested(&mut self, tokens: &[Token]) -> Vec<Atom> {
        let mut nested = Parser {
            tokens,
            index: 0,
            mode: self.mode,
            tabular: false,
            args: self.args.clone(),
            registry: self.registry,
            macros: self.macros,
            iterations: self.iterations,
            max_iterations: self.max_iterations,
            depth: self.depth + 1,
            errors: vec![],
        };
        let atoms = nested.parse();
        self.iterations = nested.iterations;
        self.errors.append(&mut nested.errors);
        atoms
    }

    fn parse_arguments(&mut self, command: &str, specs: &[ArgSpec]) -> Vec<Option<Argument>> {
        let mut args = Vec::with_capacity(specs.len());
        for &spec in specs {
            let arg = self.parse_argument(spec);
            if arg.is_none() && !spec.optional {
                self.error(ParseError::MissingArgument(command.into()));
            }
            args.push(arg);
        }
        args
    }

    fn argument_mode(&self, kind: ArgKind) -> Option<Mode> {
        match kind {
            ArgKind::Math => Some(Mode::Math),
            ArgKind::Text => Some(Mode::Text),
            ArgKind::Auto => Some(self.mode),
            _ => None,
        }
    }

    fn parse_argument(&mut self, spec: ArgSpec) -> Option<Argument> {
        self.skip_spaces();
        if spec.optional {
            if !self.peek_is(|t| t.is_literal("[")) {
                return None;
            }
            self.index += 1;
            let argument = match self.argument_mode(spec.kind) {
                Some(mode) => Some(Argument::Atoms(
                    self.with_mode(mode, |p| p.parse_sequence(Until::Bracket)),
                )),
                None => {
                    let tokens = self.take_raw(|t| t.is_literal("]"));
                    self.interpret(spec.kind, &tokens)
                }
            };
            if self.peek_is(|t| t.is_literal("]")) {
                self.index += 1;
            } else {
                self.error(ParseError::UnclosedOptionalArgument);
            }
            return argument;
        }

        if self.peek() == Some(&Token::GroupOpen) {
            self.index += 1;
            let argument = match self.argument_mode(spec.kind) {
                Some(mode) => Some(Argument::Atoms(
                    self.with_mode(mode, |p| p.parse_sequence(Until::GroupClose)),
                )),
                None => {
                    let tokens = self.take_raw(|_| false);
                    self.interpret(spec.kind, &tokens)
                }
            };
            self.expect_group_close();
            return argument;
        }

        if self.at_stop(Until::GroupClose) {
            return None;
        }
        match self.argument_mode(spec.kind) {
            Some(mode) => {
                let start = self.index;
                let atoms = self.with_mode(mode, Self::parse_atom);
                (self.index > start).then_some(Argument::Atoms(atoms))
            }
            None => match spec.kind {
                ArgKind::Number => self.scan_number().map(Argument::Number),
                ArgKind::Dimension => self.scan_dimension().map(Argument::Dimension),
                ArgKind::Glue => self.scan_glue().map(Argument::Glue),
                ArgKind::Delimiter => self.scan_delimiter().map(Argument::Delimiter),
                kind => {
                    let token = self.peek().cloned()?;
                    self.index += 1;
                    self.interpret(kind, &[token])
                }
            },
        }
    }

    /// Takes tokens up to (not including) the first `}` at depth zero or the
    /// first depth-zero token matching `stop`.
    fn take_raw(&mut self, stop: impl Fn(&Token) -> bool) -> Vec<Token> {
        let start = self.index;
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::GroupOpen => depth += 1,
                Token::GroupClose if depth == 0 => break,
                Token::GroupClose => depth -= 1,
                token if depth == 0 && stop(token) => break,
                _ => {}
            }
            self.index += 1;
        }
        self.tokens[start..self.index].to_vec()
    }

    fn interpret(&mut self, kind: ArgKind, tokens: &[Token]) -> Option<Argument> {
        let text = tokens_to_string(tokens).trim().to_string();
        match kind {
            ArgKind::ColumnSpec => Some(Argument::Columns(parse_columns(tokens))),
            ArgKind::Number | ArgKind::Dimension | ArgKind::Glue | ArgKind::Delimiter => {
                let mut nested = Parser::new(tokens, self.mode, self.registry, self.macros);
                let argument = match kind {
                    ArgKind::Number => nested.scan_number().map(Argument::Number),
                    ArgKind::Dimension => nested.scan_dimension().map(Argument::Dimension),
                    ArgKind::Glue => nested.scan_glue().map(Argument::Glue),
                    _ => nested.scan_delimiter().map(Argument::Delimiter),
                };
                self.errors.append(&mut nested.errors);
                if argument.is_none() && kind == ArgKind::Delimiter {
                    self.error(ParseError::InvalidDelimiter(text));
                }
                argument
            }
            _ => Some(Argument::String(text)),
        }
    }

    fn scan_raw_argument(&mut self) -> Option<Vec<Token>> {
        self.skip_spaces();
        if self.peek() == Some(&Token::GroupOpen) {
            self.index += 1;
            let tokens = self.take_raw(|_| false);
            self.expect_group_close();
            return Some(tokens);
        }
        if self.at_stop(Until::GroupClose) {
            return None;
        }
        let token = self.peek().cloned()?;
        self.index += 1;
        Some(vec![token])
    }

    /// Reads `{name}`, as after `\begin` and `\end`.
    fn scan_name(&mut self) -> Option<String> {
        self.skip_spaces();
        if self.peek() != Some(&Token::GroupOpen) {
            return None;
        }
        self.index += 1;
        let tokens = self.take_raw(|_| false);
        self.expect_group_close();
        Some(tokens_to_string(&tokens).trim().to_string())
    }

    fn scan_row_gap(&mut self) -> Option<String> {
        if !self.peek_is(|t| t.is_literal("[")) {
            return None;
        }
        self.index += 1;
        let gap = self.scan_dimension();
        self.take_raw(|t| t.is_literal("]"));
        if self.peek_is(|t| t.is_literal("]")) {
            self.index += 1;
        } else {
            self.error(ParseError::UnclosedOptionalArgument);
        }
        gap.map(|gap| gap.to_string())
    }

    fn scan_digits(&mut self, text: &mut String) -> bool {
        let mut any = false;
        while let Some(digit) = self
            .peek_literal(0)
            .filter(|s| s.chars().all(|c| c.is_ascii_digit()))
        {
            text.push_str(digit);
            self.index += 1;
            any = true;
        }
        any
    }

    fn scan_number(&mut self) -> Option<f64> {
        let start = self.index;
        let mut negative = false;
        loop {
            self.skip_spaces();
            match self.peek_literal(0) {
                Some("-") => negative = !negative,
                Some("+") => {}
                _ => break,
            }
            self.index += 1;
        }

        let mut text = String::new();
        let mut any = self.scan_digits(&mut text);
        if matches!(self.peek_literal(0), Some("." | ",")) {
            self.index += 1;
            text.push('.');
            any |= self.scan_digits(&mut text);
        }
        if !any {
            self.index = start;
            return None;
        }

        if matches!(self.peek_literal(0), Some("e" | "E" | "d" | "D")) {
            let sign = match self.peek_literal(1) {
                Some(sign @ ("+" | "-")) => Some(sign.to_string()),
                _ => None,
            };
            let digits_at = if sign.is_some() { 2 } else { 1 };
            let has_digits = self
                .peek_literal(digits_at)
                .is_some_and(|s| s.chars().all(|c| c.is_ascii_digit()));
            if has_digits {
                self.index += digits_at;
                text.push('e');
                text.push_str(sign.as_deref().unwrap_or(""));
                self.scan_digits(&mut text);
            }
        }

        let value = f64::from_str(&text).ok()?;
        Some(if negative { -value } else { value })
    }

    fn scan_dimension(&mut self) -> Option<Dimension> {
        let value = self.scan_number()?;
        self.skip_spaces();
        let unit = match (self.peek_literal(0), self.peek_literal(1)) {
            (Some(a), Some(b)) => DimensionUnit::from_str(&format!("{a}{b}")).ok(),
            _ => None,
        };
        let unit = match unit {
            Some(unit) => {
                self.index += 2;
                unit
            }
            None => {
                self.error(ParseError::InvalidDimension);
                DimensionUnit::Pt
            }
        };
        Some(Dimension { value, unit })
    }

    fn scan_keyword(&mut self, keyword: &str) -> bool {
        let start = self.index;
        self.skip_spaces();
        let mut buffer = [0; 4];
        for c in keyword.chars() {
            let expected: &str = c.encode_utf8(&mut buffer);
            if self.peek_literal(0) != Some(expected) {
                self.index = start;
                return false;
            }
            self.index += 1;
        }
        true
    }

    fn scan_glue(&mut self) -> Option<Glue> {
        let glue = self.scan_dimension()?;
        let grow = if self.scan_keyword("plus") {
            self.scan_dimension()
        } else {
            None
        };
        let shrink = if self.scan_keyword("minus") {
            self.scan_dimension()
        } else {
            None
        };
        Some(Glue { glue, grow, shrink })
    }

    fn scan_delimiter(&mut self) -> Option<String> {
        self.skip_spaces();
        let latex = match self.peek()? {
            Token::Literal(s) => s.clone(),
            Token::Command(name) => format!("\\{name}"),
            _ => return None,
        };
        is_delimiter(&latex).then(|| {
            self.index += 1;
            latex
        })
    }

    fn delimiter_or_dot(&mut self) -> String {
        self.scan_delimiter().unwrap_or_else(|| {
            let found = self.peek().map(ToString::to_string).unwrap_or_default();
            self.error(ParseError::InvalidDelimiter(found));
            ".".into()
        })
    }

    fn build_leaf(&self, definition: &Definition) -> Atom {
        let mut atom = match &definition.construct {
            Construct::Symbol(class) => Atom::new(self.mode, AtomKind::Symbol(*class)),
            Construct::TextSymbol => Atom::new(Mode::Text, AtomKind::Text),
            Construct::Operator(limits) => {
                Atom::new(self.mode, AtomKind::Operator { limits: *limits, explicit: false })
            }
            Construct::Spacing => Atom::new(self.mode, AtomKind::Spacing),
            Construct::Placeholder => Atom::placeholder(self.mode),
            _ => Atom::new(self.mode, AtomKind::StyleSwitch),
        };
        atom.value = definition.value.clone();
        atom
    }

    fn build_infix(
        &self,
        name: &str,
        definition: &Definition,
        mut args: Vec<Option<Argument>>,
    ) -> Atom {
        let (bar, fence) = match &definition.construct {
            Construct::Infix { bar, fence } | Construct::Fraction { bar, fence } => {
                (*bar, fence.clone())
            }
            _ => (true, None),
        };
        let mut atom = Atom::new(
            self.mode,
            AtomKind::Fraction {
                numerator: Sequence::new(),
                denominator: Sequence::new(),
                bar,
                fence,
            },
        )
        .with_command(name);
        atom.value = text_argument(&mut args, 0);
        atom
    }

    fn build(
        &mut self,
        name: &str,
        definition: &Definition,
        mut args: Vec<Option<Argument>>,
    ) -> Vec<Atom> {
        let mode = self.mode;
        let atom = match &definition.construct {
            Construct::Placeholder => return vec![Atom::placeholder(mode)],
            Construct::Symbol(_) | Construct::TextSymbol | Construct::Operator(_) => {
                self.build_leaf(definition)
            }
            Construct::OperatorName(limits) => {
                let mut atom = Atom::new(mode, AtomKind::Operator { limits: *limits, explicit: false });
                atom.value = text_argument(&mut args, 0);
                atom
            }
            Construct::Fraction { bar, fence } => Atom::new(
                mode,
                AtomKind::Fraction {
                    numerator: required(&mut args, 0, mode),
                    denominator: required(&mut args, 1, mode),
                    bar: *bar,
                    fence: fence.clone(),
                },
            ),
            Construct::Infix { .. } => self.build_infix(name, definition, args),
            Construct::Root => {
                let index = match args.first_mut().and_then(Option::take) {
                    Some(Argument::Atoms(atoms)) => Some(Sequence::from_atoms(atoms)),
                    _ => None,
                };
                let body = required(&mut args, 1, mode);
                Atom::new(mode, AtomKind::Root { body, index })
            }
            Construct::Accent => Atom::new(
                mode,
                AtomKind::Accent {
                    body: required(&mut args, 0, mode),
                },
            ),
            Construct::Enclose => Atom::new(
                mode,
                AtomKind::Enclose {
                    body: required(&mut args, 0, mode),
                },
            ),
            Construct::Group(variant) => {
                let last = args.len().saturating_sub(1);
                let child_mode = match variant {
                    GroupVariant::Text => Mode::Text,
                    _ => mode,
                };
                let children = required(&mut args, last, child_mode);
                let mut atom = Atom::new(
                    mode,
                    AtomKind::Group {
                        variant: *variant,
                        children,
                    },
                );
                atom.value = (last > 0).then(|| text_argument(&mut args, 0)).flatten();
                atom
            }
            Construct::StyleSwitch { .. } => {
                let mut atom = Atom::new(mode, AtomKind::StyleSwitch);
                atom.value = text_argument(&mut args, 0);
                atom
            }
            Construct::Spacing => {
                let mut atom = Atom::new(mode, AtomKind::Spacing);
                atom.value = text_argument(&mut args, 0);
                atom
            }
            Construct::ModeSet { display } => return vec![self.parse_mode_set(name, *display)],
        };
        vec![atom.with_command(name)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latex_tree::{ColumnIndex, RowIndex};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn parse_with_errors(latex: &str) -> (Vec<Atom>, Vec<ParseError>) {
        let registry = Registry::standard();
        let macros = Macros::standard();
        let tokens = tokenize(latex);
        Parser::new(&tokens, Mode::Math, &registry, &macros).finish()
    }

    fn parse(latex: &str) -> Vec<Atom> {
        parse_with_errors(latex).0
    }

    fn ord(value: &str) -> Atom {
        Atom::symbol(Mode::Math, SymbolClass::Ord, value)
    }

    #[test]
    fn fraction_with_single_token_arguments() {
        let atoms = parse(r"\frac12");
        assert_eq!(atoms.len(), 1);
        assert_matches!(
            &atoms[0].kind,
            AtomKind::Fraction { numerator, denominator, bar: true, .. }
                if numerator.content() == [ord("1")] && denominator.content() == [ord("2")]
        );
    }

    #[test]
    fn scripts_attach_to_the_previous_atom() {
        let atoms = parse("x^2+1");
        assert_eq!(atoms.len(), 3);
        assert_eq!(
            atoms[0].superscript.as_ref().map(|s| s.content().to_vec()),
            Some(vec![ord("2")])
        );
        assert_eq!(atoms[1].kind, AtomKind::Symbol(SymbolClass::Bin));
    }

    #[test]
    fn second_superscript_gets_a_carrier() {
        let atoms = parse("x^2^3");
        assert_eq!(atoms.len(), 2);
        assert_eq!(atoms[1].kind, AtomKind::SupSub);
        let atoms = parse("^2");
        assert_eq!(atoms[0].kind, AtomKind::SupSub);
    }

    #[test]
    fn primes_join_the_superscript() {
        let atoms = parse("f''");
        let superscript = atoms[0].superscript.as_ref().unwrap();
        assert_eq!(superscript.content().len(), 2);
        assert_eq!(superscript[1].command.as_deref(), Some("prime"));
    }

    #[test]
    fn limits_modifiers() {
        let atoms = parse(r"\sum\limits_{i}");
        assert_matches!(atoms[0].kind, AtomKind::Operator { limits: Limits::Limits, explicit: true });
        assert!(atoms[0].subscript.is_some());
    }

    #[test]
    fn infix_splits_the_group() {
        let atoms = parse(r"\sum a \over 2");
        assert_matches!(
            &atoms[..],
            [Atom { kind: AtomKind::Fraction { numerator, denominator, .. }, .. }]
                if numerator.len() == 3 && denominator.content() == [ord("2")]
        );
    }

    #[test]
    fn second_infix_is_ignored() {
        let (atoms, errors) = parse_with_errors(r"a \over b \over c");
        assert_eq!(errors, [ParseError::AmbiguousInfix("over".into())]);
        assert_matches!(
            &atoms[0].kind,
            AtomKind::Fraction { denominator, .. } if denominator.len() == 3
        );
    }

    #[test]
    fn missing_arguments_become_placeholders() {
        let (atoms, errors) = parse_with_errors(r"\frac1");
        assert_eq!(errors, [ParseError::MissingArgument("frac".into())]);
        assert_matches!(
            &atoms[0].kind,
            AtomKind::Fraction { denominator, .. } if denominator[1].is_placeholder()
        );
    }

    #[test]
    fn unknown_commands_are_flagged() {
        let (atoms, errors) = parse_with_errors(r"\foo x");
        assert_eq!(errors, [ParseError::UnknownCommand("foo".into())]);
        assert!(atoms[0].error);
        assert_eq!(atoms[0].value(), r"\foo");
        assert_eq!(atoms[1], ord("x"));
    }

    #[test]
    fn text_mode_arguments() {
        let atoms = parse(r"\text{a b}");
        assert_matches!(
            &atoms[0].kind,
            AtomKind::Group { variant: GroupVariant::Text, children }
                if children.content() == [Atom::text("a"), Atom::text(" "), Atom::text("b")]
        );
    }

    #[test]
    fn mode_shifts() {
        let atoms = parse(r"\text{if $x$}");
        let AtomKind::Group { children, .. } = &atoms[0].kind else {
            panic!("expected a group");
        };
        assert_matches!(
            &children[4].kind,
            AtomKind::Group { variant: GroupVariant::Inline, children } if children.content() == [ord("x")]
        );
        let atoms = parse(r"\[x\]");
        assert_matches!(
            &atoms[0].kind,
            AtomKind::Group { variant: GroupVariant::Display, .. }
        );
    }

    #[test]
    fn left_right() {
        let atoms = parse(r"\left(a\middle|b\right.");
        assert_matches!(
            &atoms[0].kind,
            AtomKind::LeftRight { left, right, body } if left == "(" && right == "." && body.len() == 4
        );
        let (atoms, errors) = parse_with_errors(r"\left(a");
        assert_eq!(errors, [ParseError::MissingRight]);
        assert_matches!(&atoms[0].kind, AtomKind::LeftRight { right, .. } if right == ".");
        let (_, errors) = parse_with_errors(r"\left x\right)");
        assert_eq!(errors, [ParseError::InvalidDelimiter("x".into())]);
    }

    #[test]
    fn environments() {
        let atoms = parse(r"\begin{pmatrix}a&b\\[2pt]c&d\\\end{pmatrix}");
        let AtomKind::Array(array) = &atoms[0].kind else {
            panic!("expected an array");
        };
        assert_eq!(array.rows.len(), 2);
        assert_eq!(array.column_count(), 2);
        assert_eq!(array.row_gaps.first(), Some(&Some("2pt".to_string())));
        assert!(array.fence.is_some());
        assert_eq!(
            array.cell(RowIndex::from(1usize), ColumnIndex::from(0usize)).map(|c| c.content().to_vec()),
            Some(vec![ord("c")])
        );
    }

    #[test]
    fn array_columns() {
        let atoms = parse(r"\begin{array}{l|c}1&2\end{array}");
        let AtomKind::Array(array) = &atoms[0].kind else {
            panic!("expected an array");
        };
        assert_eq!(
            array.columns,
            [
                ColumnFormat::Align(ColumnAlign::Left),
                ColumnFormat::Separator { dashed: false },
                ColumnFormat::Align(ColumnAlign::Center),
            ]
        );
    }

    #[test]
    fn mismatched_end() {
        let (_, errors) = parse_with_errors(r"\begin{matrix}a\end{pmatrix}");
        assert_eq!(
            errors,
            [ParseError::MismatchedEnd {
                expected: "matrix".into(),
                found: "pmatrix".into()
            }]
        );
        let (_, errors) = parse_with_errors(r"\begin{matrix}a");
        assert_eq!(errors, [ParseError::MissingEnd("matrix".into())]);
    }

    #[test]
    fn stray_closers() {
        let (atoms, errors) = parse_with_errors("a}b");
        assert_eq!(atoms, [ord("a"), ord("b")]);
        assert_eq!(errors, [ParseError::UnbalancedBraces]);
        let (_, errors) = parse_with_errors(r"a\right)");
        assert_eq!(errors, [ParseError::UnexpectedCommand("right".into())]);
    }

    #[test]
    fn macros_expand_into_a_group() {
        let registry = Registry::standard();
        let mut macros = Macros::new();
        macros.define("half", r"\frac{#1}{2}");
        let atoms = parse_latex(r"\half{x}", Mode::Math, &registry, &macros);
        assert_eq!(atoms[0].command.as_deref(), Some("half"));
        assert_eq!(atoms[0].value(), "{x}");
        assert_matches!(
            &atoms[0].kind,
            AtomKind::Group { variant: GroupVariant::Macro, children }
                if matches!(children[1].kind, AtomKind::Fraction { .. })
        );
    }

    #[test]
    fn recursive_macros_stop() {
        let registry = Registry::standard();
        let mut macros = Macros::new();
        macros.define("loop", r"\loop");
        let tokens = tokenize(r"\loop");
        let (atoms, errors) = Parser::new(&tokens, Mode::Math, &registry, &macros).finish();
        assert_eq!(atoms.len(), 1);
        assert_eq!(errors, [ParseError::MacroDepth("loop".into())]);
    }

    #[test]
    fn parameters_substitute_arguments() {
        let registry = Registry::standard();
        let macros = Macros::new();
        let tokens = tokenize(r"\sqrt{#0}+#?");
        let atoms = Parser::new(&tokens, Mode::Math, &registry, &macros)
            .with_args(&["x".to_string()])
            .parse();
        assert_matches!(
            &atoms[0].kind,
            AtomKind::Root { body, index: None } if body.content() == [ord("x")]
        );
        assert!(atoms[2].is_placeholder());
    }

    #[test]
    fn dimensions_and_glue() {
        let atoms = parse(r"\hspace{-1.5em plus 2pt}\kern3pt x");
        assert_eq!(atoms[0].value(), "-1.5em plus 2pt");
        assert_eq!(atoms[1].value(), "3pt");
        assert_eq!(atoms[2], ord("x"));
    }

    #[test]
    fn numbers_take_one_exponent() {
        let registry = Registry::standard();
        let macros = Macros::new();
        let tokens = tokenize("1,5e2e3");
        let mut parser = Parser::new(&tokens, Mode::Math, &registry, &macros);
        assert_eq!(parser.scan_number(), Some(150.0));
        assert_eq!(parser.peek(), Some(&Token::literal("e")));
        let tokens = tokenize("- -2d");
        let mut parser = Parser::new(&tokens, Mode::Math, &registry, &macros);
        assert_eq!(parser.scan_number(), Some(2.0));
    }

    #[test]
    fn iteration_ceiling() {
        let registry = Registry::standard();
        let macros = Macros::new();
        let tokens = tokenize("abcdef");
        let atoms = Parser::new(&tokens, Mode::Math, &registry, &macros)
            .with_max_iterations(3)
            .parse();
        assert!(atoms.len() < 6);
    }
}
