use crate::latex_tree::{Atom, AtomKind, Path, PathSegment, Relation, SymbolClass};

use super::{parent_at, root_path, sequence_at, Direction, Extent, Listener, MathField};

/// Coarse classes for word-wise movement. [`MathField::skip`] crosses a
/// maximal run of one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Letter,
    Digit,
    Operator,
    Open,
    Close,
    Punctuation,
    Text,
    Space,
    /// Atoms with relations of their own. Always a run of one.
    Compound,
}

impl CharClass {
    pub fn of(atom: &Atom) -> CharClass {
        match &atom.kind {
            AtomKind::Symbol(SymbolClass::Ord) => {
                let value = atom.value();
                if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit() || c == '.') {
                    CharClass::Digit
                } else {
                    CharClass::Letter
                }
            }
            AtomKind::Symbol(SymbolClass::Bin | SymbolClass::Rel | SymbolClass::Inner) => {
                CharClass::Operator
            }
            AtomKind::Symbol(SymbolClass::Open) => CharClass::Open,
            AtomKind::Symbol(SymbolClass::Close) => CharClass::Close,
            AtomKind::Symbol(SymbolClass::Punct) => CharClass::Punctuation,
            AtomKind::Operator { .. } => CharClass::Letter,
            AtomKind::Text if atom.value().trim().is_empty() => CharClass::Space,
            AtomKind::Text => CharClass::Text,
            AtomKind::Spacing | AtomKind::StyleSwitch | AtomKind::First => CharClass::Space,
            AtomKind::Placeholder
            | AtomKind::Group { .. }
            | AtomKind::Fraction { .. }
            | AtomKind::Root { .. }
            | AtomKind::Array(_)
            | AtomKind::Accent { .. }
            | AtomKind::Enclose { .. }
            | AtomKind::LeftRight { .. }
            | AtomKind::SupSub => CharClass::Compound,
        }
    }
}

/// The caret position one step away from `path` in a depth-first walk of
/// the tree, or `None` at the edge of the field.
fn step(root: &Atom, path: &[PathSegment], direction: Direction) -> Option<Path> {
    let siblings = sequence_at(root, path)?;
    let mut path = path.to_vec();
    let n = path.len();
    let offset = path[n - 1].offset;
    match direction {
        Direction::Forward => {
            if let Some(atom) = siblings.get(offset + 1) {
                path[n - 1].offset = offset + 1;
                if let Some(&relation) = atom.navigable_relations().first() {
                    path.push(PathSegment::new(relation, 0));
                }
                return Some(path);
            }
            if n == 1 {
                return None;
            }
            let relation = path[n - 1].relation;
            let relations = parent_at(root, &path[..n - 1])?.navigable_relations();
            let position = relations.iter().position(|&r| r == relation)?;
            match relations.get(position + 1) {
                Some(&next) => path[n - 1] = PathSegment::new(next, 0),
                None => {
                    path.pop();
                }
            }
            Some(path)
        }
        Direction::Backward => {
            if offset > 0 {
                let atom = &siblings[offset];
                match atom.navigable_relations().last() {
                    Some(&relation) => {
                        let len = atom.branch(relation).map_or(1, |s| s.len());
                        path.push(PathSegment::new(relation, len - 1));
                    }
                    None => path[n - 1].offset = offset - 1,
                }
                return Some(path);
            }
            if n == 1 {
                return None;
            }
            let relation = path[n - 1].relation;
            let parent = parent_at(root, &path[..n - 1])?;
            let relations = parent.navigable_relations();
            let position = relations.iter().position(|&r| r == relation)?;
            match position.checked_sub(1).map(|p| relations[p]) {
                Some(previous) => {
                    let len = parent.branch(previous).map_or(1, |s| s.len());
                    path[n - 1] = PathSegment::new(previous, len - 1);
                }
                None => {
                    path.pop();
                    let last = path.last_mut()?;
                    last.offset = last.offset.saturating_sub(1);
                }
            }
            Some(path)
        }
    }
}

/// Offset reached by crossing one run of same-class siblings from `offset`.
fn skip_target(siblings: &[Atom], offset: usize, direction: Direction) -> Option<usize> {
    match direction {
        Direction::Forward => {
            let start = offset + 1;
            let class = CharClass::of(siblings.get(start)?);
            match class {
                CharClass::Compound => Some(start),
                CharClass::Open => {
                    let mut depth = 0isize;
                    for (i, atom) in siblings.iter().enumerate().skip(start) {
                        match CharClass::of(atom) {
                            CharClass::Open => depth += 1,
                            CharClass::Close => depth -= 1,
                            _ => {}
                        }
                        if depth == 0 {
                            return Some(i);
                        }
                    }
                    Some(siblings.len() - 1)
                }
                _ => Some(
                    siblings[start..]
                        .iter()
                        .take_while(|atom| CharClass::of(atom) == class)
                        .count()
                        + offset,
                ),
            }
        }
        Direction::Backward => {
            if offset == 0 {
                return None;
            }
            let class = CharClass::of(&siblings[offset]);
            match class {
                CharClass::Compound => Some(offset - 1),
                CharClass::Close => {
                    let mut depth = 0isize;
                    for i in (1..=offset).rev() {
                        match CharClass::of(&siblings[i]) {
                            CharClass::Close => depth += 1,
                            CharClass::Open => depth -= 1,
                            _ => {}
                        }
                        if depth == 0 {
                            return Some(i - 1);
                        }
                    }
                    Some(0)
                }
                _ => Some(
                    offset
                        - siblings[1..=offset]
                            .iter()
                            .rev()
                            .take_while(|atom| CharClass::of(atom) == class)
                            .count(),
                ),
            }
        }
    }
}

impl<L: Listener> MathField<L> {
    fn focus_path(&self) -> Path {
        let mut path = self.path.clone();
        if let Some(last) = path.last_mut() {
            last.offset = self.focus_offset();
        }
        path
    }

    fn advance(&mut self, direction: Direction) {
        match step(&self.root, &self.focus_path(), direction) {
            Some(path) => {
                log::trace!("{direction} to {path:?}");
                self.select(path, 0);
            }
            None => {
                let wrap = self.gate.selection_suppressed()
                    || self.listener.moved_out_of_field(direction);
                if wrap {
                    let end = match direction {
                        Direction::Forward => 0,
                        Direction::Backward => self.root_len() - 1,
                    };
                    self.select(root_path(end), 0);
                } else {
                    self.collapse(direction);
                }
            }
        }
    }

    fn root_len(&self) -> usize {
        self.root.branch(Relation::Children).map_or(1, |s| s.len())
    }

    /// Moves the caret one position forward, entering and leaving relations
    /// on the way.
    pub fn next(&mut self) {
        self.advance(Direction::Forward);
    }

    pub fn previous(&mut self) {
        self.advance(Direction::Backward);
    }

    /// Collapses a range to its edge in `direction`, or moves a collapsed
    /// caret one position.
    pub fn move_by(&mut self, direction: Direction) {
        if !self.collapse(direction) {
            self.advance(direction);
        }
    }

    /// Returns whether there was a range to collapse.
    pub fn collapse(&mut self, direction: Direction) -> bool {
        if self.is_collapsed() {
            return false;
        }
        let offset = match direction {
            Direction::Forward => self.end_offset(),
            Direction::Backward => self.start_offset(),
        };
        self.collapse_to(offset);
        true
    }

    /// Moves the focus one sibling. At the edge of the siblings the
    /// selection grows to cover the parent atom instead.
    pub fn extend(&mut self, direction: Direction) -> bool {
        let focus = self.focus_offset() as isize + direction.sign();
        if (0..self.siblings().len() as isize).contains(&focus) {
            let extent = focus - self.anchor_offset() as isize;
            return self.set_selection(self.anchor_offset() as isize, Extent::Relative(extent), None);
        }
        if self.path.len() == 1 {
            return false;
        }
        let mut path = self.path.clone();
        path.pop();
        let Some(last) = path.last_mut() else {
            return false;
        };
        let extent = match direction {
            Direction::Forward => {
                last.offset -= 1;
                1
            }
            Direction::Backward => -1,
        };
        self.select(path, extent);
        true
    }

    /// Moves over a run of similar siblings, or one position when there is
    /// no sibling left in `direction`.
    pub fn skip(&mut self, direction: Direction) {
        self.collapse(direction);
        match skip_target(self.siblings(), self.anchor_offset(), direction) {
            Some(offset) => self.collapse_to(offset),
            None => self.advance(direction),
        }
    }

    pub fn skip_extend(&mut self, direction: Direction) -> bool {
        match skip_target(self.siblings(), self.focus_offset(), direction) {
            Some(focus) => {
                let extent = focus as isize - self.anchor_offset() as isize;
                self.set_selection(self.anchor_offset() as isize, Extent::Relative(extent), None)
            }
            None => self.extend(direction),
        }
    }

    fn at_leap_target(&self) -> bool {
        self.anchor().is_placeholder() || (self.path.len() > 1 && self.siblings().len() == 1)
    }

    /// Jumps to the next placeholder or empty relation in `direction`,
    /// wrapping around the field. Returns `false`, leaving the selection
    /// alone, when there is none.
    pub fn leap(&mut self, direction: Direction) -> bool {
        let (path, extent) = (self.path.clone(), self.extent);
        let found = {
            let _scope = self.gate.suppress_selection();
            self.collapse(direction);
            let mut found = None;
            for _ in 0..=self.caret_positions() {
                self.advance(direction);
                if self.at_leap_target() {
                    found = Some(self.path.clone());
                    break;
                }
            }
            self.path = path;
            self.extent = extent;
            found
        };
        match found {
            Some(path) => self.set_path(path, None),
            None => {
                self.listener.tabbed_out_of_field(direction);
                false
            }
        }
    }

    /// Moves between vertically stacked relations: numerator and
    /// denominator, superscript and subscript, or rows of an array.
    pub fn up(&mut self) -> bool {
        self.vertical(Direction::Backward)
    }

    pub fn down(&mut self) -> bool {
        self.vertical(Direction::Forward)
    }

    fn vertical(&mut self, direction: Direction) -> bool {
        for depth in (1..self.path.len()).rev() {
            let Some(parent) = parent_at(&self.root, &self.path[..depth]) else {
                continue;
            };
            let target = match (self.path[depth].relation, direction) {
                (Relation::Numerator, Direction::Forward) => Some(Relation::Denominator),
                (Relation::Denominator, Direction::Backward) => Some(Relation::Numerator),
                (Relation::Superscript, Direction::Forward) => Some(Relation::Subscript),
                (Relation::Subscript, Direction::Backward) => Some(Relation::Superscript),
                (Relation::Cell(row, column), _) => usize::from(row)
                    .checked_add_signed(direction.sign())
                    .map(|row| Relation::cell(row, column.into())),
                _ => None,
            };
            let Some((relation, sequence)) = target.and_then(|t| Some((t, parent.branch(t)?)))
            else {
                continue;
            };
            let offset = if depth == self.path.len() - 1 {
                self.anchor_offset().min(sequence.len() - 1)
            } else {
                0
            };
            let mut path = self.path[..depth].to_vec();
            path.push(PathSegment::new(relation, offset));
            self.select(path, 0);
            return true;
        }
        false
    }

    pub fn move_to_start(&mut self) {
        self.select(root_path(0), 0);
    }

    pub fn move_to_end(&mut self) {
        self.select(root_path(self.root_len() - 1), 0);
    }

    pub fn select_all(&mut self) {
        self.select(root_path(0), self.root_len() as isize - 1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{math_field::Notification, registry::Registry};
    use pretty_assertions::assert_eq;

    fn field(latex: &str) -> MathField<Vec<Notification>> {
        let mut field = MathField::with_listener(Arc::new(Registry::standard()), vec![]);
        field.set_latex(latex);
        field.move_to_start();
        field.listener_mut().clear();
        field
    }

    fn at(segments: &[(Relation, usize)]) -> Path {
        segments
            .iter()
            .map(|&(relation, offset)| PathSegment::new(relation, offset))
            .collect()
    }

    #[test]
    fn walks_into_and_out_of_fractions() {
        let mut field = field(r"\frac{a}{b}");
        let mut visited = vec![];
        for _ in 0..6 {
            field.next();
            visited.push(field.path().clone());
        }
        use Relation::*;
        assert_eq!(
            visited,
            [
                at(&[(Children, 1), (Numerator, 0)]),
                at(&[(Children, 1), (Numerator, 1)]),
                at(&[(Children, 1), (Denominator, 0)]),
                at(&[(Children, 1), (Denominator, 1)]),
                at(&[(Children, 1)]),
                at(&[(Children, 0)]),
            ]
        );
        assert_eq!(
            field.listener().last(),
            Some(&Notification::SelectionDidChange)
        );
        assert!(field.listener().contains(&Notification::MovedOut(Direction::Forward)));
    }

    #[test]
    fn previous_retraces_next() {
        let mut field = field(r"x^{2}+\sqrt[3]{y}");
        let mut forward = vec![field.path().clone()];
        for _ in 1..field.caret_positions() {
            field.next();
            forward.push(field.path().clone());
        }
        let mut backward = vec![field.path().clone()];
        for _ in 1..field.caret_positions() {
            field.previous();
            backward.push(field.path().clone());
        }
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn refusing_to_wrap_stays_at_the_edge() {
        struct Stay;
        impl Listener for Stay {
            fn moved_out_of_field(&mut self, _direction: Direction) -> bool {
                false
            }
        }
        let mut field = MathField::with_listener(Arc::new(Registry::standard()), Stay);
        field.set_latex("ab");
        field.next();
        assert_eq!(field.anchor_offset(), 2);
    }

    #[test]
    fn classes() {
        let registry = Registry::standard();
        let atoms = crate::latex_parser::parse_latex(
            r"a1+(\frac12,",
            crate::latex_tree::Mode::Math,
            &registry,
            &crate::registry::Macros::new(),
        );
        let classes: Vec<_> = atoms.iter().map(CharClass::of).collect();
        assert_eq!(
            classes,
            [
                CharClass::Letter,
                CharClass::Digit,
                CharClass::Operator,
                CharClass::Open,
                CharClass::Compound,
                CharClass::Punctuation,
            ]
        );
    }

    #[test]
    fn skips_runs() {
        let mut field = field("abc+12");
        field.skip(Direction::Forward);
        assert_eq!(field.anchor_offset(), 3);
        field.skip(Direction::Forward);
        assert_eq!(field.anchor_offset(), 4);
        field.skip(Direction::Forward);
        assert_eq!(field.anchor_offset(), 6);
        field.skip(Direction::Backward);
        assert_eq!(field.anchor_offset(), 4);
        field.skip_extend(Direction::Backward);
        assert_eq!(field.selection_latex(), "+");
    }

    #[test]
    fn extend_grows_to_the_parent() {
        let mut field = field(r"\frac{a}{b}");
        field.next();
        field.extend(Direction::Forward);
        assert_eq!(field.selection_latex(), "a");
        field.extend(Direction::Forward);
        assert_eq!(field.path(), &root_path(0));
        assert_eq!(field.selection_latex(), r"\frac{a}{b}");
        assert!(field.collapse(Direction::Forward));
        assert_eq!(field.anchor_offset(), 1);
    }

    #[test]
    fn leaps_between_vacancies() {
        let mut field = field(r"\frac{}{}+\placeholder{}");
        assert!(field.leap(Direction::Forward));
        assert_eq!(field.relation(), Relation::Numerator);
        assert!(field.leap(Direction::Forward));
        assert_eq!(field.relation(), Relation::Denominator);
        assert!(field.leap(Direction::Forward));
        assert_eq!(field.relation(), Relation::Children);
        assert!(field.focus().is_placeholder());
        assert!(field.leap(Direction::Forward));
        assert_eq!(field.relation(), Relation::Numerator);
        assert!(field.leap(Direction::Backward));
        assert!(field.focus().is_placeholder());
    }

    #[test]
    fn leap_without_vacancies_tabs_out() {
        let mut field = field("x+1");
        field.set_selection(1, Extent::Relative(1), None);
        field.listener_mut().clear();
        assert!(!field.leap(Direction::Forward));
        assert_eq!((field.anchor_offset(), field.extent()), (1, 1));
        assert_eq!(
            field.listener(),
            &[Notification::TabbedOut(Direction::Forward)]
        );
    }

    #[test]
    fn up_and_down() {
        let mut field = field(r"\frac{ab}{c}");
        field.set_path(at(&[(Relation::Children, 1), (Relation::Numerator, 2)]), None);
        assert!(field.down());
        assert_eq!(field.path(), &at(&[(Relation::Children, 1), (Relation::Denominator, 1)]));
        assert!(!field.down());
        assert!(field.up());
        assert_eq!(field.relation(), Relation::Numerator);
        field.move_to_end();
        assert!(!field.up());
    }

    #[test]
    fn select_all_covers_the_root() {
        let mut field = field("a+b");
        field.select_all();
        assert_eq!(field.selection_latex(), "a+b");
        field.move_to_end();
        assert_eq!(field.anchor_offset(), 3);
    }
}
