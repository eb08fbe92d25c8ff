//! Lexically nested binding chain.
//!
//! An environment is a singly linked chain of frames, each binding
//! exactly one name. [`Env::extend`] never mutates the receiver: it
//! returns a new handle whose head is a fresh frame, so a closure that
//! clones its creation-time handle freezes exactly the scope chain it
//! could see, in O(1). The chain structure is append-only, but each
//! frame's value slot is interiorly mutable, which is what `set!`,
//! `define`, and `letrec` back-patching write through.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

#[derive(Debug)]
struct Frame {
    name: String,
    slot: RefCell<Value>,
    parent: Option<Rc<Frame>>,
}

/// Handle to an environment chain. Cloning shares the chain.
#[derive(Debug, Clone, Default)]
pub struct Env {
    head: Option<Rc<Frame>>,
}

impl Env {
    /// A chain with no bindings.
    pub fn empty() -> Env {
        Env { head: None }
    }

    /// A new chain with one more frame in front; `self` is untouched.
    pub fn extend(&self, name: impl Into<String>, value: Value) -> Env {
        Env {
            head: Some(Rc::new(Frame {
                name: name.into(),
                slot: RefCell::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// Value of the innermost binding of `name`, head-first: inner
    /// bindings shadow outer ones.
    pub fn find(&self, name: &str) -> Option<Value> {
        let mut current = self.head.as_ref();
        while let Some(frame) = current {
            if frame.name == name {
                return Some(frame.slot.borrow().clone());
            }
            current = frame.parent.as_ref();
        }
        None
    }

    /// Whether any frame binds `name`.
    pub fn is_bound(&self, name: &str) -> bool {
        let mut current = self.head.as_ref();
        while let Some(frame) = current {
            if frame.name == name {
                return true;
            }
            current = frame.parent.as_ref();
        }
        false
    }

    /// Overwrite the slot of the innermost frame binding `name`.
    /// A no-op when no frame binds it; callers that need a binding to
    /// exist (`set!`) check with [`Env::is_bound`] first.
    pub fn modify(&self, name: &str, value: Value) {
        let mut current = self.head.as_ref();
        while let Some(frame) = current {
            if frame.name == name {
                *frame.slot.borrow_mut() = value;
                return;
            }
            current = frame.parent.as_ref();
        }
    }
}
