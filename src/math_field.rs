mod editing;
mod navigation;
mod notify;

use std::sync::Arc;

pub use editing::{InsertOptions, InsertionMode, SelectionMode};
pub use navigation::CharClass;
pub use notify::{Direction, Listener, Notification, NotificationGate, Scope};

use crate::{
    config::MathFieldConfig,
    latex_tree::{
        Atom, AtomKind, GroupVariant, Mode, Path, PathSegment, Relation, Sequence, SequenceDisplay,
    },
    registry::{Macros, Registry},
};

/// Where the focus sits relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Relative(isize),
    /// Focus on the first caret position of the siblings.
    Start,
    /// Focus on the last caret position of the siblings.
    End,
}

fn parent_at<'a>(root: &'a Atom, ancestors: &[PathSegment]) -> Option<&'a Atom> {
    let mut atom = root;
    for segment in ancestors {
        atom = atom.branch(segment.relation)?.get(segment.offset)?;
    }
    Some(atom)
}

fn parent_at_mut<'a>(root: &'a mut Atom, ancestors: &[PathSegment]) -> Option<&'a mut Atom> {
    let mut atom = root;
    for segment in ancestors {
        atom = atom.branch_mut(segment.relation)?.get_mut(segment.offset)?;
    }
    Some(atom)
}

fn sequence_at<'a>(root: &'a Atom, path: &[PathSegment]) -> Option<&'a Sequence> {
    let (last, ancestors) = path.split_last()?;
    parent_at(root, ancestors)?.branch(last.relation)
}

fn sequence_at_mut<'a>(root: &'a mut Atom, path: &[PathSegment]) -> Option<&'a mut Sequence> {
    let (last, ancestors) = path.split_last()?;
    parent_at_mut(root, ancestors)?.branch_mut(last.relation)
}

fn root_path(offset: usize) -> Path {
    vec![PathSegment::new(Relation::Children, offset)]
}

/// An editable atom tree with a selection.
///
/// The selection is a path to a sibling sequence, an anchor offset (the last
/// segment of the path) and a signed extent to the focus. Offset `k` puts the
/// caret after sibling `k`, so the selected atoms of a range are the siblings
/// between the smaller and the larger offset, excluding the former.
pub struct MathField<L: Listener = ()> {
    root: Atom,
    path: Path,
    extent: isize,
    registry: Arc<Registry>,
    macros: Macros,
    config: MathFieldConfig,
    listener: L,
    gate: NotificationGate,
}

impl MathField {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_listener(registry, ())
    }
}

impl<L: Listener> MathField<L> {
    pub fn with_listener(registry: Arc<Registry>, listener: L) -> Self {
        let config = MathFieldConfig::default();
        Self {
            root: Atom::group(config.default_mode, GroupVariant::Plain, vec![]),
            path: root_path(0),
            extent: 0,
            registry,
            macros: Macros::standard(),
            config,
            listener,
            gate: NotificationGate::default(),
        }
    }

    pub fn with_config(mut self, config: MathFieldConfig) -> Self {
        self.root.mode = config.default_mode;
        self.config = config;
        self
    }

    pub fn with_macros(mut self, macros: Macros) -> Self {
        self.macros = macros;
        self
    }

    pub fn set_macros(&mut self, macros: Macros) {
        self.macros = macros;
    }

    pub fn macros(&self) -> &Macros {
        &self.macros
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &MathFieldConfig {
        &self.config
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Replaces the whole content, leaving the caret at the end.
    pub fn set_latex(&mut self, latex: &str) {
        self.insert(
            latex,
            InsertOptions {
                insertion_mode: InsertionMode::ReplaceAll,
                selection_mode: SelectionMode::After,
                ..InsertOptions::default()
            },
        );
    }

    pub fn root(&self) -> &Atom {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extent(&self) -> isize {
        self.extent
    }

    pub fn siblings(&self) -> &Sequence {
        sequence_at(&self.root, &self.path).expect("selection path always resolves")
    }

    fn siblings_mut(&mut self) -> &mut Sequence {
        sequence_at_mut(&mut self.root, &self.path).expect("selection path always resolves")
    }

    /// The atom owning the current siblings; the root at the top level.
    pub fn parent(&self) -> &Atom {
        parent_at(&self.root, &self.path[..self.path.len() - 1])
            .expect("selection path always resolves")
    }

    pub fn relation(&self) -> Relation {
        self.last_segment().relation
    }

    fn last_segment(&self) -> PathSegment {
        *self.path.last().expect("selection path is never empty")
    }

    pub fn anchor_offset(&self) -> usize {
        self.last_segment().offset
    }

    pub fn focus_offset(&self) -> usize {
        self.anchor_offset().saturating_add_signed(self.extent)
    }

    pub fn start_offset(&self) -> usize {
        self.anchor_offset().min(self.focus_offset())
    }

    pub fn end_offset(&self) -> usize {
        self.anchor_offset().max(self.focus_offset())
    }

    pub fn anchor(&self) -> &Atom {
        &self.siblings()[self.anchor_offset()]
    }

    pub fn focus(&self) -> &Atom {
        &self.siblings()[self.focus_offset()]
    }

    pub fn is_collapsed(&self) -> bool {
        self.extent == 0
    }

    pub fn selected_atoms(&self) -> &[Atom] {
        &self.siblings()[self.start_offset() + 1..self.end_offset() + 1]
    }

    pub fn selection_latex(&self) -> String {
        SequenceDisplay(self.selected_atoms()).to_string()
    }

    pub fn to_latex(&self) -> String {
        self.root
            .branch(Relation::Children)
            .map(Sequence::to_string)
            .unwrap_or_default()
    }

    /// Number of distinct caret positions in the field.
    pub fn caret_positions(&self) -> usize {
        self.root.caret_positions() - 1
    }

    /// The mode new content at the caret is parsed in.
    pub fn mode(&self) -> Mode {
        let parent = self.parent();
        match &parent.kind {
            AtomKind::Group {
                variant: GroupVariant::Text,
                ..
            } => Mode::Text,
            AtomKind::Group {
                variant: GroupVariant::Inline | GroupVariant::Display,
                ..
            } => Mode::Math,
            _ => parent.mode,
        }
    }

    /// Moves the selection within the current siblings, or into another
    /// relation of the same parent. Negative offsets count from the end.
    /// Returns `false` if the parent has no such relation.
    pub fn set_selection(
        &mut self,
        offset: isize,
        extent: Extent,
        relation: Option<Relation>,
    ) -> bool {
        let mut path = self.path.clone();
        if let Some(relation) = relation {
            if self.parent().branch(relation).is_none() {
                log::debug!("no {relation} relation at {}", self.describe_path());
                return false;
            }
            if let Some(last) = path.last_mut() {
                *last = PathSegment::new(relation, 0);
            }
        }
        let Some(siblings) = sequence_at(&self.root, &path) else {
            return false;
        };
        let last = siblings.len() as isize - 1;
        let offset = (if offset < 0 { last + 1 + offset } else { offset }).clamp(0, last);
        let extent = match extent {
            Extent::Relative(extent) => (offset + extent).clamp(0, last) - offset,
            Extent::Start => -offset,
            Extent::End => last - offset,
        };
        if let Some(segment) = path.last_mut() {
            segment.offset = offset as usize;
        }
        self.select(path, extent);
        true
    }

    /// Moves the selection anywhere in the tree. An unresolvable path resets
    /// the caret to the start of the field.
    ///
    /// Without an extent, a placeholder right before the caret gets selected.
    pub fn set_path(&mut self, mut path: Path, extent: Option<isize>) -> bool {
        // macros are opaque: no path may pass through one
        let enters_macro = (1..path.len())
            .any(|depth| parent_at(&self.root, &path[..depth]).is_some_and(Atom::captures_selection));
        let resolved = path
            .first()
            .filter(|first| first.relation == Relation::Children && !enters_macro)
            .and_then(|_| sequence_at(&self.root, &path))
            .zip(path.last())
            .filter(|(siblings, last)| last.offset < siblings.len())
            .map(|(siblings, last)| (siblings.len(), siblings[last.offset].is_placeholder()));
        let Some((len, on_placeholder)) = resolved else {
            log::warn!(
                "invalid path [{}], resetting to the start",
                path.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            );
            self.select(root_path(0), 0);
            return false;
        };
        let Some(segment) = path.last_mut() else {
            return false;
        };
        let offset = segment.offset as isize;
        let extent = match extent {
            Some(extent) => (offset + extent).clamp(0, len as isize - 1) - offset,
            None if on_placeholder => {
                segment.offset -= 1;
                1
            }
            None => 0,
        };
        self.select(path, extent);
        true
    }

    /// Collapses the caret at `offset` in the current siblings.
    fn collapse_to(&mut self, offset: usize) {
        let mut path = self.path.clone();
        if let Some(last) = path.last_mut() {
            last.offset = offset;
        }
        self.select(path, 0);
    }

    /// Applies a resolved selection, notifying only on an actual change.
    fn select(&mut self, path: Path, extent: isize) {
        if path == self.path && extent == self.extent {
            return;
        }
        let notify = !self.gate.selection_suppressed();
        if notify {
            self.listener.selection_will_change();
        }
        log::trace!("selection {} -> {path:?} ({extent:+})", self.describe_path());
        self.path = path;
        self.extent = extent;
        if notify {
            self.listener.selection_did_change();
        }
    }

    fn describe_path(&self) -> String {
        self.path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Runs a structural edit, bracketing it with content notifications
    /// unless an outer edit already did.
    fn mutate<T>(&mut self, edit: impl FnOnce(&mut Self) -> T) -> T {
        let outermost = !self.gate.content_changing();
        if outermost {
            self.listener.content_will_change();
        }
        let result = {
            let _scope = self.gate.enter_content();
            edit(self)
        };
        if outermost {
            self.listener.content_did_change();
        }
        result
    }
}
