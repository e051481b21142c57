use std::{cell::Cell, rc::Rc};

use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(self) -> isize {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Callbacks into the host. Every method has a default, so a host only
/// overrides what it cares about.
pub trait Listener {
    fn content_will_change(&mut self) {}
    fn content_did_change(&mut self) {}
    fn selection_will_change(&mut self) {}
    fn selection_did_change(&mut self) {}

    /// The caret tried to leave the field. Returning `true` wraps it around
    /// to the other end.
    fn moved_out_of_field(&mut self, _direction: Direction) -> bool {
        true
    }

    /// `leap` found nothing left to fill in.
    fn tabbed_out_of_field(&mut self, _direction: Direction) {}
}

impl Listener for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    ContentWillChange,
    ContentDidChange,
    SelectionWillChange,
    SelectionDidChange,
    MovedOut(Direction),
    TabbedOut(Direction),
}

/// Records every callback, for hosts that poll instead of reacting inline.
impl Listener for Vec<Notification> {
    fn content_will_change(&mut self) {
        self.push(Notification::ContentWillChange);
    }

    fn content_did_change(&mut self) {
        self.push(Notification::ContentDidChange);
    }

    fn selection_will_change(&mut self) {
        self.push(Notification::SelectionWillChange);
    }

    fn selection_did_change(&mut self) {
        self.push(Notification::SelectionDidChange);
    }

    fn moved_out_of_field(&mut self, direction: Direction) -> bool {
        self.push(Notification::MovedOut(direction));
        true
    }

    fn tabbed_out_of_field(&mut self, direction: Direction) {
        self.push(Notification::TabbedOut(direction));
    }
}

/// Nesting counters deciding which notifications reach the listener.
#[derive(Debug, Clone, Default)]
pub struct NotificationGate {
    content: Rc<Cell<usize>>,
    selection: Rc<Cell<usize>>,
}

/// Holds one level of a [`NotificationGate`] counter until dropped.
#[must_use]
pub struct Scope(Rc<Cell<usize>>);

impl Scope {
    fn enter(counter: &Rc<Cell<usize>>) -> Self {
        counter.set(counter.get() + 1);
        Self(Rc::clone(counter))
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl NotificationGate {
    pub fn enter_content(&self) -> Scope {
        Scope::enter(&self.content)
    }

    pub fn suppress_selection(&self) -> Scope {
        Scope::enter(&self.selection)
    }

    pub fn content_changing(&self) -> bool {
        self.content.get() > 0
    }

    pub fn selection_suppressed(&self) -> bool {
        self.selection.get() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_nest_and_restore() {
        let gate = NotificationGate::default();
        assert!(!gate.selection_suppressed());
        {
            let _outer = gate.suppress_selection();
            {
                let _inner = gate.suppress_selection();
                assert!(gate.selection_suppressed());
            }
            assert!(gate.selection_suppressed());
        }
        assert!(!gate.selection_suppressed());
        assert!(!gate.content_changing());
    }

    #[test]
    fn scopes_restore_on_early_exit() {
        let gate = NotificationGate::default();
        let bail = |gate: &NotificationGate| -> Option<()> {
            let _scope = gate.enter_content();
            None::<()>?;
            Some(())
        };
        assert_eq!(bail(&gate), None);
        assert!(!gate.content_changing());
    }
}
