use std::{fmt, ops::Deref};

use derive_more::{Display, From, Into};
use serde::Deserialize;
use strum::{Display as StrumDisplay, EnumString};
use typed_index_collections::TiVec;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, StrumDisplay, EnumString, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Math,
    Text,
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SymbolClass {
    Ord,
    Bin,
    Rel,
    Open,
    Close,
    Punct,
    Inner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Limits {
    /// Limits above and below in display style, as scripts otherwise.
    #[default]
    Auto,
    Limits,
    NoLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum GroupVariant {
    /// `{...}`
    Plain,
    /// `$...$` or `\(...\)`
    Inline,
    /// `$$...$$` or `\[...\]`
    Display,
    /// `\text{...}` and friends, children in text mode.
    Text,
    /// A command wrapping its argument, e.g. `\mathbf{...}`.
    Command,
    /// The expansion of a macro. Edited as a whole.
    Macro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, From, Into, Display)]
pub struct RowIndex(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, From, Into, Display)]
pub struct ColumnIndex(usize);

/// A named edge from an atom to one of its child sequences.
///
/// The declaration order is the navigation order: `next()` visits the
/// relations of an atom from first to last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum Relation {
    #[display("children")]
    Children,
    #[display("cell{_0}:{_1}")]
    Cell(RowIndex, ColumnIndex),
    #[display("numerator")]
    Numerator,
    #[display("denominator")]
    Denominator,
    #[display("index")]
    Index,
    #[display("body")]
    Body,
    #[display("subscript")]
    Subscript,
    #[display("superscript")]
    Superscript,
}

impl Relation {
    pub fn cell(row: usize, column: usize) -> Self {
        Relation::Cell(row.into(), column.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{relation}:{offset}")]
pub struct PathSegment {
    pub relation: Relation,
    pub offset: usize,
}

impl PathSegment {
    pub fn new(relation: Relation, offset: usize) -> Self {
        Self { relation, offset }
    }
}

/// Locates a sibling sequence (and a caret offset in it) from the root atom.
pub type Path = Vec<PathSegment>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fence {
    pub open: String,
    pub close: String,
}

impl Fence {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnFormat {
    Align(ColumnAlign),
    /// `|` or `:`
    Separator { dashed: bool },
    /// `p{width}`
    Paragraph(String),
}

impl fmt::Display for ColumnFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnFormat::Align(ColumnAlign::Left) => write!(f, "l"),
            ColumnFormat::Align(ColumnAlign::Center) => write!(f, "c"),
            ColumnFormat::Align(ColumnAlign::Right) => write!(f, "r"),
            ColumnFormat::Separator { dashed: false } => write!(f, "|"),
            ColumnFormat::Separator { dashed: true } => write!(f, ":"),
            ColumnFormat::Paragraph(width) => write!(f, "p{{{width}}}"),
        }
    }
}

/// An ordered run of atoms that always starts with a [`AtomKind::First`]
/// sentinel, so offset 0 is a valid caret position in every relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence(Vec<Atom>);

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Sequence {
    type Target = [Atom];

    fn deref(&self) -> &[Atom] {
        &self.0
    }
}

impl From<Vec<Atom>> for Sequence {
    fn from(atoms: Vec<Atom>) -> Self {
        Self::from_atoms(atoms)
    }
}

impl Sequence {
    pub fn new() -> Self {
        Self(vec![Atom::first()])
    }

    pub fn from_atoms(atoms: impl IntoIterator<Item = Atom>) -> Self {
        let mut sequence = Self::new();
        sequence.0.extend(atoms.into_iter().filter(|a| !a.is_first()));
        sequence
    }

    /// The atoms after the sentinel.
    pub fn content(&self) -> &[Atom] {
        &self.0[1..]
    }

    pub fn has_content(&self) -> bool {
        self.0.len() > 1
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Atom> {
        self.0.get_mut(index)
    }

    pub fn last_mut(&mut self) -> Option<&mut Atom> {
        self.0.last_mut().filter(|a| !a.is_first())
    }

    pub fn push(&mut self, atom: Atom) {
        if !atom.is_first() {
            self.0.push(atom);
        }
    }

    /// Inserts `atoms` so the first of them lands at `index`. The index is
    /// clamped to `1..=len`.
    pub fn insert_all(&mut self, index: usize, atoms: impl IntoIterator<Item = Atom>) -> usize {
        let index = index.clamp(1, self.0.len());
        let before = self.0.len();
        let tail = self.0.split_off(index);
        self.0.extend(atoms.into_iter().filter(|a| !a.is_first()));
        self.0.extend(tail);
        self.0.len() - before
    }

    pub fn remove(&mut self, index: usize) -> Option<Atom> {
        (1..self.0.len())
            .contains(&index)
            .then(|| self.0.remove(index))
    }

    /// Removes the atoms in `start..end`, never the sentinel.
    pub fn remove_range(&mut self, start: usize, end: usize) -> Vec<Atom> {
        let start = start.clamp(1, self.0.len());
        let end = end.clamp(start, self.0.len());
        self.0.drain(start..end).collect()
    }

    pub fn replace(&mut self, index: usize, atoms: Vec<Atom>) -> Option<Atom> {
        let removed = self.remove(index)?;
        self.insert_all(index, atoms);
        Some(removed)
    }

    /// Removes and returns everything but the sentinel.
    pub fn take_content(&mut self) -> Vec<Atom> {
        self.0.split_off(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayAtom {
    pub environment: String,
    /// Declared arguments other than the column spec, as written, such as
    /// the column count of `alignedat`.
    pub arguments: Vec<String>,
    pub columns: Vec<ColumnFormat>,
    pub rows: TiVec<RowIndex, TiVec<ColumnIndex, Sequence>>,
    /// Extra space requested after each row with `\\[gap]`.
    pub row_gaps: TiVec<RowIndex, Option<String>>,
    pub fence: Option<Fence>,
}

impl ArrayAtom {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            arguments: vec![],
            columns: vec![],
            rows: TiVec::new(),
            row_gaps: TiVec::new(),
            fence: None,
        }
    }

    pub fn cell(&self, row: RowIndex, column: ColumnIndex) -> Option<&Sequence> {
        self.rows.get(row)?.get(column)
    }

    pub fn cell_mut(&mut self, row: RowIndex, column: ColumnIndex) -> Option<&mut Sequence> {
        self.rows.get_mut(row)?.get_mut(column)
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(|row| row.len()).max().unwrap_or(0)
    }

    /// Every existing cell, row-major.
    pub fn cells(&self) -> impl Iterator<Item = Relation> + '_ {
        self.rows.iter_enumerated().flat_map(|(r, row)| {
            row.iter_enumerated()
                .map(move |(c, _)| Relation::Cell(r, c))
        })
    }

    pub fn insert_row(&mut self, at: RowIndex) {
        let at = usize::from(at).min(self.rows.len());
        let columns = self.column_count().max(1);
        let row: TiVec<ColumnIndex, Sequence> = (0..columns).map(|_| Sequence::new()).collect();
        self.rows.insert(at.into(), row);
        let gap_at = at.min(self.row_gaps.len());
        self.row_gaps.insert(gap_at.into(), None);
    }

    pub fn insert_column(&mut self, at: ColumnIndex) {
        for row in self.rows.iter_mut() {
            let at = usize::from(at).min(row.len());
            row.insert(at.into(), Sequence::new());
        }
        if self.columns.iter().any(|c| matches!(c, ColumnFormat::Align(_))) {
            self.columns.push(ColumnFormat::Align(ColumnAlign::Center));
        }
    }
}

/// The shape of an atom, together with the relations that shape owns.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomKind {
    /// Zero-width sentinel leading every sequence.
    First,
    Placeholder,
    Symbol(SymbolClass),
    Text,
    Operator {
        limits: Limits,
        /// Set by a `\limits`-style modifier in the source rather than by
        /// the command's default. Only explicit values are written back.
        explicit: bool,
    },
    Group {
        variant: GroupVariant,
        children: Sequence,
    },
    Fraction {
        numerator: Sequence,
        denominator: Sequence,
        bar: bool,
        fence: Option<Fence>,
    },
    Root {
        body: Sequence,
        index: Option<Sequence>,
    },
    Array(Box<ArrayAtom>),
    Accent {
        body: Sequence,
    },
    Enclose {
        body: Sequence,
    },
    LeftRight {
        left: String,
        right: String,
        body: Sequence,
    },
    StyleSwitch,
    Spacing,
    /// Zero-width base for scripts that have nothing to attach to.
    SupSub,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub mode: Mode,
    pub kind: AtomKind,
    pub value: Option<String>,
    pub command: Option<String>,
    pub error: bool,
    pub superscript: Option<Sequence>,
    pub subscript: Option<Sequence>,
}

impl Atom {
    pub fn new(mode: Mode, kind: AtomKind) -> Self {
        Self {
            mode,
            kind,
            value: None,
            command: None,
            error: false,
            superscript: None,
            subscript: None,
        }
    }

    pub fn first() -> Self {
        Self::new(Mode::Math, AtomKind::First)
    }

    pub fn placeholder(mode: Mode) -> Self {
        Self::new(mode, AtomKind::Placeholder)
    }

    pub fn symbol(mode: Mode, class: SymbolClass, value: impl Into<String>) -> Self {
        Self::new(mode, AtomKind::Symbol(class)).with_value(value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(Mode::Text, AtomKind::Text).with_value(value)
    }

    pub fn group(mode: Mode, variant: GroupVariant, children: Vec<Atom>) -> Self {
        Self::new(
            mode,
            AtomKind::Group {
                variant,
                children: Sequence::from_atoms(children),
            },
        )
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_error(mut self) -> Self {
        self.error = true;
        self
    }

    pub fn is_first(&self) -> bool {
        matches!(self.kind, AtomKind::First)
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, AtomKind::Placeholder)
    }

    /// A fraction written as `a \over b`, which always spans its whole group.
    pub fn is_infix_fraction(&self) -> bool {
        matches!(self.kind, AtomKind::Fraction { .. })
            && matches!(
                self.command.as_deref(),
                Some("over" | "atop" | "choose" | "brack" | "brace" | "above")
            )
    }

    pub fn value(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    pub fn supports_scripts(&self) -> bool {
        !matches!(
            self.kind,
            AtomKind::First | AtomKind::Text | AtomKind::StyleSwitch | AtomKind::Spacing
        )
    }

    /// Macro expansions are edited as a whole: the caret never enters them.
    pub fn captures_selection(&self) -> bool {
        matches!(
            self.kind,
            AtomKind::Group {
                variant: GroupVariant::Macro,
                ..
            }
        )
    }

    pub fn branch(&self, relation: Relation) -> Option<&Sequence> {
        match (relation, &self.kind) {
            (Relation::Superscript, _) => self.superscript.as_ref(),
            (Relation::Subscript, _) => self.subscript.as_ref(),
            (Relation::Children, AtomKind::Group { children, .. }) => Some(children),
            (Relation::Numerator, AtomKind::Fraction { numerator, .. }) => Some(numerator),
            (Relation::Denominator, AtomKind::Fraction { denominator, .. }) => Some(denominator),
            (Relation::Index, AtomKind::Root { index, .. }) => index.as_ref(),
            (
                Relation::Body,
                AtomKind::Root { body, .. }
                | AtomKind::Accent { body }
                | AtomKind::Enclose { body }
                | AtomKind::LeftRight { body, .. },
            ) => Some(body),
            (Relation::Cell(row, column), AtomKind::Array(array)) => array.cell(row, column),
            _ => None,
        }
    }

    pub fn branch_mut(&mut self, relation: Relation) -> Option<&mut Sequence> {
        match (relation, &mut self.kind) {
            (Relation::Superscript, _) => self.superscript.as_mut(),
            (Relation::Subscript, _) => self.subscript.as_mut(),
            (Relation::Children, AtomKind::Group { children, .. }) => Some(children),
            (Relation::Numerator, AtomKind::Fraction { numerator, .. }) => Some(numerator),
            (Relation::Denominator, AtomKind::Fraction { denominator, .. }) => Some(denominator),
            (Relation::Index, AtomKind::Root { index, .. }) => index.as_mut(),
            (
                Relation::Body,
                AtomKind::Root { body, .. }
                | AtomKind::Accent { body }
                | AtomKind::Enclose { body }
                | AtomKind::LeftRight { body, .. },
            ) => Some(body),
            (Relation::Cell(row, column), AtomKind::Array(array)) => array.cell_mut(row, column),
            _ => None,
        }
    }

    /// Like [`Atom::branch_mut`], but creates an absent optional relation
    /// (scripts, root index) with its sentinel.
    pub fn branch_mut_or_insert(&mut self, relation: Relation) -> Option<&mut Sequence> {
        if self.branch(relation).is_none() {
            let supports_scripts = self.supports_scripts();
            match (relation, &mut self.kind) {
                (Relation::Superscript, _) if supports_scripts => {
                    self.superscript = Some(Sequence::new())
                }
                (Relation::Subscript, _) if supports_scripts => {
                    self.subscript = Some(Sequence::new())
                }
                (Relation::Index, AtomKind::Root { index, .. }) => *index = Some(Sequence::new()),
                _ => {}
            }
        }
        self.branch_mut(relation)
    }

    /// Detaches an optional relation. Required relations stay in place.
    pub fn remove_branch(&mut self, relation: Relation) -> Option<Sequence> {
        match (relation, &mut self.kind) {
            (Relation::Superscript, _) => self.superscript.take(),
            (Relation::Subscript, _) => self.subscript.take(),
            (Relation::Index, AtomKind::Root { index, .. }) => index.take(),
            _ => None,
        }
    }

    /// The relations this atom currently has, in navigation order.
    pub fn relations(&self) -> Vec<Relation> {
        let mut relations = match &self.kind {
            AtomKind::Group { .. } => vec![Relation::Children],
            AtomKind::Array(array) => array.cells().collect(),
            AtomKind::Fraction { .. } => vec![Relation::Numerator, Relation::Denominator],
            AtomKind::Root { index, .. } => {
                let mut relations = vec![];
                if index.is_some() {
                    relations.push(Relation::Index);
                }
                relations.push(Relation::Body);
                relations
            }
            AtomKind::Accent { .. } | AtomKind::Enclose { .. } | AtomKind::LeftRight { .. } => {
                vec![Relation::Body]
            }
            AtomKind::First
            | AtomKind::Placeholder
            | AtomKind::Symbol(_)
            | AtomKind::Text
            | AtomKind::Operator { .. }
            | AtomKind::StyleSwitch
            | AtomKind::Spacing
            | AtomKind::SupSub => vec![],
        };
        if self.subscript.is_some() {
            relations.push(Relation::Subscript);
        }
        if self.superscript.is_some() {
            relations.push(Relation::Superscript);
        }
        relations
    }

    /// The relations the caret may enter.
    pub fn navigable_relations(&self) -> Vec<Relation> {
        if self.captures_selection() {
            vec![]
        } else {
            self.relations()
        }
    }

    /// Number of caret positions inside and including this atom: one per
    /// atom, sentinels included, not descending into atoms that capture the
    /// selection.
    pub fn caret_positions(&self) -> usize {
        1 + self
            .navigable_relations()
            .into_iter()
            .filter_map(|relation| self.branch(relation))
            .flat_map(|sequence| sequence.iter())
            .map(Atom::caret_positions)
            .sum::<usize>()
    }

    /// Calls `f` on this atom and every descendant, depth first, in
    /// navigation order.
    pub fn for_each_atom(&self, f: &mut impl FnMut(&Atom)) {
        f(self);
        for relation in self.relations() {
            if let Some(sequence) = self.branch(relation) {
                for atom in sequence.iter() {
                    atom.for_each_atom(f);
                }
            }
        }
    }

    pub fn contains_placeholder(&self) -> bool {
        let mut found = false;
        self.for_each_atom(&mut |atom| found |= atom.is_placeholder());
        found
    }
}

/// The first spot needing input, found by [`find_vacancy`].
#[derive(Debug, Clone, PartialEq)]
pub struct Vacancy {
    /// `(atom index, relation)` steps from the scanned atoms down to the
    /// sequence holding the vacancy.
    pub descent: Vec<(usize, Relation)>,
    /// Index of a placeholder atom in that sequence, or `None` when the
    /// sequence itself is empty.
    pub placeholder: Option<usize>,
}

/// Depth-first search for the first placeholder atom or empty relation.
pub fn find_vacancy(atoms: &[Atom]) -> Option<Vacancy> {
    for (i, atom) in atoms.iter().enumerate() {
        if atom.is_placeholder() {
            return Some(Vacancy {
                descent: vec![],
                placeholder: Some(i),
            });
        }
        for relation in atom.navigable_relations() {
            let Some(sequence) = atom.branch(relation) else {
                continue;
            };
            let found = if sequence.has_content() {
                find_vacancy(sequence)
            } else {
                Some(Vacancy {
                    descent: vec![],
                    placeholder: None,
                })
            };
            if let Some(mut vacancy) = found {
                vacancy.descent.insert(0, (i, relation));
                return Some(vacancy);
            }
        }
    }
    None
}

fn ends_with_control_word(latex: &str) -> bool {
    let trimmed = latex.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    trimmed.len() < latex.len() && trimmed.ends_with('\\') && !trimmed.ends_with("\\\\")
}

/// Appends `next` to `latex`, separating a trailing control word from a
/// following letter.
fn push_latex(latex: &mut String, next: &str) {
    if ends_with_control_word(latex) && next.starts_with(|c: char| c.is_ascii_alphabetic()) {
        latex.push(' ');
    }
    latex.push_str(next);
}

pub struct SequenceDisplay<'a>(pub &'a [Atom]);

impl fmt::Display for SequenceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut latex = String::new();
        for atom in self.0 {
            push_latex(&mut latex, &atom.to_string());
        }
        f.write_str(&latex)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        SequenceDisplay(self.content()).fmt(f)
    }
}

fn escape_literal(value: &str) -> String {
    match value {
        "#" | "%" | "&" | "$" | "_" | "{" | "}" => format!("\\{value}"),
        "\\" => r"\backslash".into(),
        _ => value.into(),
    }
}

impl Atom {
    fn command_or(&self, fallback: &str) -> String {
        format!("\\{}", self.command.as_deref().unwrap_or(fallback))
    }

    fn write_body(&self, latex: &mut String) {
        match &self.kind {
            AtomKind::First | AtomKind::SupSub => {}
            AtomKind::Placeholder => latex.push_str(r"\placeholder{}"),
            AtomKind::Symbol(_) | AtomKind::Text => match (self.command.as_deref(), &self.value) {
                (Some("middle"), value) => {
                    latex.push_str(r"\middle");
                    push_latex(latex, value.as_deref().unwrap_or("."));
                }
                (Some(command), _) => {
                    latex.push('\\');
                    latex.push_str(command);
                }
                (None, Some(value)) => latex.push_str(&escape_literal(value)),
                (None, None) => {}
            },
            AtomKind::Operator { limits, explicit } => {
                match self.command.as_deref() {
                    Some(command @ ("operatorname" | "operatorname*")) => {
                        latex.push_str(&format!("\\{command}{{{}}}", self.value()));
                    }
                    Some(command) => {
                        latex.push('\\');
                        latex.push_str(command);
                    }
                    None => latex.push_str(self.value()),
                }
                if self.error || !explicit {
                    return;
                }
                match limits {
                    Limits::Auto => push_latex(latex, r"\displaylimits"),
                    Limits::Limits => push_latex(latex, r"\limits"),
                    Limits::NoLimits => push_latex(latex, r"\nolimits"),
                }
            }
            AtomKind::Group { variant, children } => match variant {
                GroupVariant::Plain => latex.push_str(&format!("{{{children}}}")),
                GroupVariant::Inline if self.command.as_deref() == Some("(") => {
                    latex.push_str(r"\(");
                    push_latex(latex, &children.to_string());
                    latex.push_str(r"\)");
                }
                GroupVariant::Inline => latex.push_str(&format!("${children}$")),
                GroupVariant::Display if self.command.as_deref() == Some("[") => {
                    latex.push_str(r"\[");
                    push_latex(latex, &children.to_string());
                    latex.push_str(r"\]");
                }
                GroupVariant::Display => latex.push_str(&format!("$${children}$$")),
                GroupVariant::Text | GroupVariant::Command => {
                    latex.push_str(&self.command_or("text"));
                    if let Some(value) = &self.value {
                        latex.push_str(&format!("{{{value}}}"));
                    }
                    latex.push_str(&format!("{{{children}}}"));
                }
                GroupVariant::Macro => {
                    latex.push_str(&self.command_or("relax"));
                    if let Some(value) = &self.value {
                        latex.push_str(value);
                    }
                }
            },
            AtomKind::Fraction {
                numerator,
                denominator,
                ..
            } => match self.command.as_deref() {
                Some(infix) if self.is_infix_fraction() => {
                    let mut inner = numerator.to_string();
                    push_latex(&mut inner, &format!("\\{infix}"));
                    if let Some(thickness) = &self.value {
                        inner.push_str(&format!("{{{thickness}}}"));
                    }
                    push_latex(&mut inner, &denominator.to_string());
                    latex.push_str(&format!("{{{inner}}}"));
                }
                command => latex.push_str(&format!(
                    "\\{}{{{numerator}}}{{{denominator}}}",
                    command.unwrap_or("frac")
                )),
            },
            AtomKind::Root { body, index } => {
                latex.push_str(r"\sqrt");
                if let Some(index) = index {
                    latex.push_str(&format!("[{index}]"));
                }
                latex.push_str(&format!("{{{body}}}"));
            }
            AtomKind::Array(array) => {
                latex.push_str(&format!("\\begin{{{}}}", array.environment));
                for argument in &array.arguments {
                    latex.push_str(&format!("{{{argument}}}"));
                }
                if !array.columns.is_empty() {
                    latex.push('{');
                    for column in &array.columns {
                        latex.push_str(&column.to_string());
                    }
                    latex.push('}');
                }
                for (r, row) in array.rows.iter_enumerated() {
                    if usize::from(r) > 0 {
                        latex.push_str(r"\\");
                        if let Some(Some(gap)) = array.row_gaps.get(RowIndex::from(usize::from(r) - 1))
                        {
                            latex.push_str(&format!("[{gap}]"));
                        }
                    }
                    for (c, cell) in row.iter_enumerated() {
                        if usize::from(c) > 0 {
                            latex.push('&');
                        }
                        push_latex(latex, &cell.to_string());
                    }
                }
                latex.push_str(&format!("\\end{{{}}}", array.environment));
            }
            AtomKind::Accent { body } | AtomKind::Enclose { body } => {
                latex.push_str(&self.command_or("overline"));
                latex.push_str(&format!("{{{body}}}"));
            }
            AtomKind::LeftRight { left, right, body } => {
                latex.push_str(r"\left");
                push_latex(latex, left);
                push_latex(latex, &body.to_string());
                push_latex(latex, r"\right");
                push_latex(latex, right);
            }
            AtomKind::StyleSwitch | AtomKind::Spacing => {
                match &self.command {
                    Some(command) => {
                        latex.push('\\');
                        latex.push_str(command);
                    }
                    None => latex.push_str(self.value()),
                }
                if let (Some(_), Some(value)) = (&self.command, &self.value) {
                    latex.push_str(&format!("{{{value}}}"));
                }
            }
        }
    }
}

/// Serializes back to LaTeX.
impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut latex = String::new();
        self.write_body(&mut latex);
        if let Some(superscript) = &self.superscript {
            latex.push_str(&format!("^{{{superscript}}}"));
        }
        if let Some(subscript) = &self.subscript {
            latex.push_str(&format!("_{{{subscript}}}"));
        }
        f.write_str(&latex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ord(value: &str) -> Atom {
        Atom::symbol(Mode::Math, SymbolClass::Ord, value)
    }

    fn frac(numerator: Vec<Atom>, denominator: Vec<Atom>) -> Atom {
        Atom::new(
            Mode::Math,
            AtomKind::Fraction {
                numerator: numerator.into(),
                denominator: denominator.into(),
                bar: true,
                fence: None,
            },
        )
        .with_command("frac")
    }

    #[test]
    fn sequences_keep_their_sentinel() {
        let mut sequence = Sequence::from_atoms(vec![Atom::first(), ord("a"), ord("b")]);
        assert_eq!(sequence.len(), 3);
        assert!(sequence[0].is_first());
        assert_eq!(sequence.remove(0), None);
        assert_eq!(sequence.remove_range(0, 3).len(), 2);
        assert_eq!(sequence.len(), 1);
        assert!(!sequence.has_content());
        sequence.insert_all(0, vec![ord("c")]);
        assert!(sequence[0].is_first());
        assert_eq!(sequence[1], ord("c"));
    }

    #[test]
    fn relations_follow_navigation_order() {
        let mut root = Atom::new(
            Mode::Math,
            AtomKind::Root {
                body: Sequence::new(),
                index: Some(Sequence::new()),
            },
        );
        root.branch_mut_or_insert(Relation::Superscript);
        root.branch_mut_or_insert(Relation::Subscript);
        assert_eq!(
            root.relations(),
            [
                Relation::Index,
                Relation::Body,
                Relation::Subscript,
                Relation::Superscript
            ]
        );
        let mut sorted = root.relations();
        sorted.sort();
        assert_eq!(sorted, root.relations());
    }

    #[test]
    fn sentinels_cannot_carry_scripts() {
        let mut first = Atom::first();
        assert_eq!(first.branch_mut_or_insert(Relation::Superscript), None);
    }

    #[test]
    fn counts_caret_positions() {
        let fraction = frac(vec![ord("a")], vec![ord("b")]);
        assert_eq!(fraction.caret_positions(), 5);
    }

    #[test]
    fn finds_placeholders_before_empty_relations() {
        let atoms = vec![
            ord("x"),
            frac(vec![ord("a")], vec![Atom::placeholder(Mode::Math)]),
        ];
        assert_eq!(
            find_vacancy(&atoms),
            Some(Vacancy {
                descent: vec![(1, Relation::Denominator)],
                placeholder: Some(1),
            })
        );
        let atoms = vec![frac(vec![], vec![])];
        assert_eq!(
            find_vacancy(&atoms),
            Some(Vacancy {
                descent: vec![(0, Relation::Numerator)],
                placeholder: None,
            })
        );
        assert_eq!(find_vacancy(&[ord("x")]), None);
    }

    #[test]
    fn serializes_to_latex() {
        let mut x = ord("x");
        x.superscript = Some(vec![ord("2")].into());
        let atoms = vec![
            x,
            Atom::symbol(Mode::Math, SymbolClass::Bin, "+"),
            frac(vec![ord("1")], vec![ord("2")]),
            Atom::symbol(Mode::Math, SymbolClass::Ord, "α").with_command("alpha"),
            ord("b"),
        ];
        assert_eq!(
            SequenceDisplay(&atoms).to_string(),
            r"x^{2}+\frac{1}{2}\alpha b"
        );
    }

    #[test]
    fn control_word_spacing() {
        assert!(ends_with_control_word(r"\alpha"));
        assert!(!ends_with_control_word(r"a\\"));
        assert!(!ends_with_control_word(r"\,"));
        assert!(!ends_with_control_word("x"));
    }
}
