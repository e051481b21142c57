use crate::{
    latex_lexer::tokenize,
    latex_parser::Parser,
    latex_tree::{
        find_vacancy, Atom, AtomKind, ColumnIndex, Mode, Path, PathSegment, Relation, RowIndex,
        Sequence, SymbolClass, Vacancy,
    },
};

use super::{parent_at_mut, root_path, sequence_at_mut, Direction, Listener, MathField};

/// What happens to the current selection before inserting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertionMode {
    #[default]
    ReplaceSelection,
    ReplaceAll,
    InsertBefore,
    InsertAfter,
}

/// Where the selection goes after inserting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// The first placeholder or empty relation in the inserted content,
    /// else right after it.
    #[default]
    Placeholder,
    After,
    Before,
    /// Select the inserted atoms.
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertOptions {
    pub insertion_mode: InsertionMode,
    pub selection_mode: SelectionMode,
    /// Parse in this mode instead of the mode at the caret.
    pub mode: Option<Mode>,
}

/// Path to a vacancy found in the atoms starting at offset `base` of the
/// siblings addressed by `path`.
fn vacancy_path(path: &[PathSegment], base: usize, vacancy: Vacancy) -> Path {
    let mut path = path.to_vec();
    let mut shift = base;
    for (index, relation) in vacancy.descent {
        if let Some(last) = path.last_mut() {
            last.offset = index + shift;
        }
        shift = 0;
        path.push(PathSegment::new(relation, 0));
    }
    if let (Some(last), Some(placeholder)) = (path.last_mut(), vacancy.placeholder) {
        last.offset = placeholder + shift;
    }
    path
}

fn is_fence(atom: &Atom, class: SymbolClass, value: &str) -> bool {
    atom.kind == AtomKind::Symbol(class) && atom.value() == value
}

/// Drops a pair of parentheses wrapping the whole sequence.
fn strip_parentheses(sequence: &mut Sequence) {
    let content = sequence.content();
    let [open, .., close] = content else {
        return;
    };
    if !is_fence(open, SymbolClass::Open, "(")
        || !is_fence(close, SymbolClass::Close, ")")
        || close.superscript.is_some()
        || close.subscript.is_some()
    {
        return;
    }
    let mut depth = 0isize;
    for (i, atom) in content.iter().enumerate() {
        if is_fence(atom, SymbolClass::Open, "(") {
            depth += 1;
        } else if is_fence(atom, SymbolClass::Close, ")") {
            depth -= 1;
        }
        if depth == 0 && i + 1 < content.len() {
            return;
        }
    }
    let end = sequence.len() - 1;
    sequence.remove(end);
    sequence.remove(1);
}

impl<L: Listener> MathField<L> {
    /// Parses `content` and inserts it at the selection. `#0` in `content`
    /// stands for the LaTeX of the selection being replaced. Returns whether
    /// any atoms were inserted.
    pub fn insert(&mut self, content: &str, options: InsertOptions) -> bool {
        self.mutate(|field| field.insert_content(content, options))
    }

    fn insert_content(&mut self, content: &str, options: InsertOptions) -> bool {
        let selection = self.selection_latex();
        match options.insertion_mode {
            InsertionMode::ReplaceSelection => {
                self.remove_selection();
            }
            InsertionMode::ReplaceAll => {
                if let Some(children) = self.root.branch_mut(Relation::Children) {
                    children.take_content();
                }
                self.select(root_path(0), 0);
            }
            InsertionMode::InsertBefore => {
                self.collapse(Direction::Backward);
            }
            InsertionMode::InsertAfter => {
                self.collapse(Direction::Forward);
            }
        }
        self.remove_stray_placeholder();

        let mode = options.mode.unwrap_or_else(|| self.mode());
        let tokens = tokenize(content);
        let (mut atoms, errors) = Parser::new(&tokens, mode, &self.registry, &self.macros)
            .with_args(&[selection])
            .with_max_iterations(self.config.max_parse_iterations)
            .finish();
        for error in &errors {
            log::debug!("while inserting {content:?}: {error}");
        }
        if self.config.remove_extraneous_parentheses {
            for atom in &mut atoms {
                if let AtomKind::Fraction {
                    numerator,
                    denominator,
                    ..
                } = &mut atom.kind
                {
                    strip_parentheses(numerator);
                    strip_parentheses(denominator);
                }
            }
        }

        let offset = self.anchor_offset();
        let count = self.siblings_mut().insert_all(offset + 1, atoms);
        match options.selection_mode {
            SelectionMode::Placeholder => {
                let inserted = &self.siblings()[offset + 1..offset + 1 + count];
                match find_vacancy(inserted) {
                    Some(vacancy) => {
                        let path = vacancy_path(&self.path, offset + 1, vacancy);
                        self.set_path(path, None);
                    }
                    None => self.collapse_to(offset + count),
                }
            }
            SelectionMode::After => self.collapse_to(offset + count),
            SelectionMode::Before => self.collapse_to(offset),
            SelectionMode::Item => {
                let path = self.path.clone();
                self.select(path, count as isize);
            }
        }
        count > 0
    }

    fn remove_selection(&mut self) -> bool {
        if self.is_collapsed() {
            return false;
        }
        let (start, end) = (self.start_offset(), self.end_offset());
        self.siblings_mut().remove_range(start + 1, end + 1);
        self.collapse_to(start);
        true
    }

    /// A placeholder next to the caret is waiting for exactly this input.
    fn remove_stray_placeholder(&mut self) {
        let offset = self.anchor_offset();
        if self.anchor().is_placeholder() {
            self.siblings_mut().remove(offset);
            self.collapse_to(offset - 1);
        } else if self
            .siblings()
            .get(offset + 1)
            .is_some_and(Atom::is_placeholder)
        {
            self.siblings_mut().remove(offset + 1);
        }
    }

    /// Deletes the selected atoms, or one atom in `direction` from the
    /// caret. At the edge of a relation the owning atom is taken apart
    /// instead. Returns `false` when nothing changed.
    pub fn delete(&mut self, direction: Direction) -> bool {
        self.mutate(|field| {
            if field.remove_selection() {
                return true;
            }
            let offset = field.anchor_offset();
            match direction {
                Direction::Forward if offset + 1 < field.siblings().len() => {
                    field.siblings_mut().remove(offset + 1);
                    true
                }
                Direction::Backward if offset > 0 => {
                    field.siblings_mut().remove(offset);
                    field.collapse_to(offset - 1);
                    true
                }
                _ => field.delete_at_boundary(direction),
            }
        })
    }

    /// Replaces the atom at `index` of the siblings at `outer` by `atoms`.
    fn splice_parent(&mut self, outer: &[PathSegment], index: usize, atoms: Vec<Atom>) {
        if let Some(siblings) = sequence_at_mut(&mut self.root, outer) {
            siblings.replace(index, atoms);
        }
    }

    fn delete_at_boundary(&mut self, direction: Direction) -> bool {
        let n = self.path.len();
        if n == 1 {
            return false;
        }
        let relation = self.relation();
        let outer = self.path[..n - 1].to_vec();
        let index = outer[n - 2].offset;
        let at = |offset: usize| {
            let mut path = outer.clone();
            path[n - 2].offset = offset;
            path
        };
        let Some(parent) = parent_at_mut(&mut self.root, &outer) else {
            return false;
        };
        log::trace!("deleting {direction} out of {relation}");

        match relation {
            Relation::Superscript | Relation::Subscript => {
                let content = parent
                    .remove_branch(relation)
                    .map(|mut script| script.take_content())
                    .unwrap_or_default();
                let count = content.len();
                let carrier = parent.kind == AtomKind::SupSub
                    && parent.superscript.is_none()
                    && parent.subscript.is_none();
                let first = if carrier { index } else { index + 1 };
                if carrier {
                    self.splice_parent(&outer, index, content);
                } else if let Some(siblings) = sequence_at_mut(&mut self.root, &outer) {
                    siblings.insert_all(first, content);
                }
                let offset = match direction {
                    Direction::Backward => first - 1,
                    Direction::Forward => first - 1 + count,
                };
                self.select(at(offset), 0);
            }
            Relation::Numerator | Relation::Denominator => {
                let AtomKind::Fraction {
                    numerator,
                    denominator,
                    ..
                } = &mut parent.kind
                else {
                    return false;
                };
                let mut atoms = numerator.take_content();
                let split = atoms.len();
                atoms.extend(denominator.take_content());
                let count = atoms.len();
                self.splice_parent(&outer, index, atoms);
                let offset = match (relation, direction) {
                    (Relation::Numerator, Direction::Backward) => index - 1,
                    (Relation::Denominator, Direction::Forward) => index - 1 + count,
                    _ => index - 1 + split,
                };
                self.select(at(offset), 0);
            }
            Relation::Body | Relation::Children => {
                let atoms = parent
                    .branch_mut(relation)
                    .map(Sequence::take_content)
                    .unwrap_or_default();
                let count = atoms.len();
                self.splice_parent(&outer, index, atoms);
                let offset = match direction {
                    Direction::Backward => index - 1,
                    Direction::Forward => index - 1 + count,
                };
                self.select(at(offset), 0);
            }
            Relation::Index => {
                let empty = parent
                    .branch(Relation::Index)
                    .is_some_and(|index| !index.has_content());
                if empty {
                    parent.remove_branch(Relation::Index);
                }
                let mut body = outer.clone();
                body.push(PathSegment::new(Relation::Body, 0));
                match direction {
                    Direction::Backward if !empty => self.select(at(index - 1), 0),
                    _ => self.select(body, 0),
                }
            }
            Relation::Cell(..) => {
                let cells: Vec<Relation> = parent
                    .navigable_relations()
                    .into_iter()
                    .filter(|r| matches!(r, Relation::Cell(..)))
                    .collect();
                let position = cells.iter().position(|&cell| cell == relation);
                let target = match direction {
                    Direction::Forward => position.and_then(|p| cells.get(p + 1)),
                    Direction::Backward => position
                        .and_then(|p| p.checked_sub(1))
                        .and_then(|p| cells.get(p)),
                };
                let target = target.and_then(|&cell| Some((cell, parent.branch(cell)?.len())));
                match (target, direction) {
                    (Some((cell, len)), _) => {
                        let mut path = outer.clone();
                        let offset = match direction {
                            Direction::Forward => 0,
                            Direction::Backward => len - 1,
                        };
                        path.push(PathSegment::new(cell, offset));
                        self.select(path, 0);
                    }
                    (None, Direction::Forward) => self.select(at(index), 0),
                    (None, Direction::Backward) => self.select(at(index - 1), 0),
                }
            }
        }
        true
    }

    /// Empties the field.
    pub fn delete_all(&mut self) -> bool {
        self.mutate(|field| {
            let removed = field
                .root
                .branch_mut(Relation::Children)
                .map(|children| children.take_content())
                .unwrap_or_default();
            field.select(root_path(0), 0);
            !removed.is_empty()
        })
    }

    /// The innermost array cell around the caret, as the depth of its path
    /// segment.
    fn enclosing_cell(&self) -> Option<(usize, RowIndex, ColumnIndex)> {
        self.path
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, segment)| match segment.relation {
                Relation::Cell(row, column) => Some((depth, row, column)),
                _ => None,
            })
    }

    pub fn add_row_after(&mut self) -> bool {
        self.add_row(1)
    }

    pub fn add_row_before(&mut self) -> bool {
        self.add_row(0)
    }

    pub fn add_column_after(&mut self) -> bool {
        self.add_column(1)
    }

    pub fn add_column_before(&mut self) -> bool {
        self.add_column(0)
    }

    fn add_row(&mut self, shift: usize) -> bool {
        let Some((depth, row, column)) = self.enclosing_cell() else {
            return false;
        };
        let row = RowIndex::from(usize::from(row) + shift);
        self.mutate(|field| {
            let Some(AtomKind::Array(array)) =
                parent_at_mut(&mut field.root, &field.path[..depth]).map(|atom| &mut atom.kind)
            else {
                return false;
            };
            array.insert_row(row);
            let mut path = field.path[..depth].to_vec();
            path.push(PathSegment::new(Relation::Cell(row, column), 0));
            field.select(path, 0);
            true
        })
    }

    fn add_column(&mut self, shift: usize) -> bool {
        let Some((depth, row, column)) = self.enclosing_cell() else {
            return false;
        };
        let column = ColumnIndex::from(usize::from(column) + shift);
        self.mutate(|field| {
            let Some(AtomKind::Array(array)) =
                parent_at_mut(&mut field.root, &field.path[..depth]).map(|atom| &mut atom.kind)
            else {
                return false;
            };
            array.insert_column(column);
            let mut path = field.path[..depth].to_vec();
            path.push(PathSegment::new(Relation::Cell(row, column), 0));
            field.select(path, 0);
            true
        })
    }
}
