#![forbid(unsafe_code)]

//! Rebindable call slots for toolkit callbacks.
//!
//! # Design
//!
//! [`Delegate<Args, Ret>`] is a fixed-signature slot that can be rebound, at
//! runtime, to any of four callee shapes: a plain function, a function taking
//! caller-owned context as its first parameter, a method on an externally
//! owned object, or an arbitrary capturing closure. The callee does not
//! implement any common trait; each `bind_*` method erases its concrete shape
//! into one variant of an internal tagged [`Binding`] enum.
//!
//! The free-function variant stores a bare `fn` pointer and never allocates.
//! The capturing variant moves the closure into a `Box<dyn FnMut>` the slot
//! owns exclusively; the box's vtable carries exactly the two operations the
//! slot needs (call, destroy). The context and method variants hold `Weak`
//! handles, so the slot never extends the lifetime of caller-owned state.
//!
//! # Invariants
//!
//! 1. At most one binding is installed at a time.
//! 2. Rebinding or unbinding drops a previously owned closure exactly once.
//! 3. Invoking an unbound slot returns [`DelegateError::Unbound`]; absence is
//!    a dedicated discriminant, never a payload that must be null-checked.
//! 4. A dropped context or receiver turns `invoke` into an explicit error,
//!    never a call through stale state.
//!
//! # Failure Modes
//!
//! - **Unbound invoke**: reported as `Err(Unbound)`.
//! - **Context/receiver dropped**: the non-owning kinds upgrade their `Weak`
//!   handle per call and report `ContextDropped`/`ReceiverDropped` when the
//!   caller has released the target.
//! - **Re-entrant receiver borrow**: a bound method whose receiver is already
//!   mutably borrowed reports `ReceiverBorrowed` instead of panicking.
//!
//! A `Delegate` is single-threaded by construction (it holds `Rc`/`Weak`
//! handles and is therefore not `Send`); callers that share one must
//! serialize access externally.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Errors reported by [`Delegate::invoke`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DelegateError {
    /// Nothing is bound to the slot.
    #[error("delegate is not bound")]
    Unbound,
    /// The context behind a contextual binding was dropped by its owner.
    #[error("bound context was dropped")]
    ContextDropped,
    /// The receiver behind a method binding was dropped by its owner.
    #[error("bound receiver was dropped")]
    ReceiverDropped,
    /// The receiver behind a method binding is already mutably borrowed.
    #[error("bound receiver is already mutably borrowed")]
    ReceiverBorrowed,
}

/// Which callee shape a [`Delegate`] currently dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A plain function pointer.
    Function,
    /// A function pointer plus non-owning context.
    Contextual,
    /// A method on an externally owned receiver.
    Method,
    /// An owned capturing closure.
    Closure,
}

/// The installed callee. Kinds that must look up a non-owning target per call
/// (context, method) share the fallible-dispatcher payload shape; the tag
/// still records which kind was bound.
enum Binding<Args, Ret> {
    Function(fn(Args) -> Ret),
    Contextual(Box<dyn FnMut(Args) -> Result<Ret, DelegateError>>),
    Method(Box<dyn FnMut(Args) -> Result<Ret, DelegateError>>),
    Closure(Box<dyn FnMut(Args) -> Ret>),
}

/// A fixed-signature callback slot.
///
/// `Args` is the callee's parameter; use a tuple for multi-parameter
/// signatures. `Ret` defaults to `()`.
///
/// ```
/// use easel_core::delegate::Delegate;
///
/// fn shout(message: &'static str) -> String {
///     message.to_uppercase()
/// }
///
/// let mut on_message: Delegate<&'static str, String> = Delegate::new();
/// on_message.bind(shout);
/// assert_eq!(on_message.invoke("draw"), Ok("DRAW".to_string()));
/// ```
pub struct Delegate<Args, Ret = ()> {
    binding: Option<Binding<Args, Ret>>,
}

impl<Args, Ret> Delegate<Args, Ret> {
    /// Create an unbound slot.
    #[must_use]
    pub fn new() -> Self {
        Self { binding: None }
    }

    /// Install a free-function binding. Never allocates.
    pub fn bind(&mut self, function: fn(Args) -> Ret) {
        self.binding = Some(Binding::Function(function));
    }

    /// Invoke whichever callee is currently bound.
    ///
    /// # Errors
    ///
    /// [`DelegateError::Unbound`] when no binding is installed, or the
    /// non-owning kinds' target errors described on [`DelegateError`].
    pub fn invoke(&mut self, args: Args) -> Result<Ret, DelegateError> {
        match self.binding.as_mut() {
            None => Err(DelegateError::Unbound),
            Some(Binding::Function(function)) => Ok(function(args)),
            Some(Binding::Contextual(dispatch)) | Some(Binding::Method(dispatch)) => {
                dispatch(args)
            }
            Some(Binding::Closure(callable)) => Ok(callable(args)),
        }
    }

    /// Drop any owned callee and clear the slot to unbound.
    pub fn unbind(&mut self) {
        self.binding = None;
    }

    /// Whether anything is bound, without side effects.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Which callee shape is installed, if any.
    #[must_use]
    pub fn kind(&self) -> Option<BindingKind> {
        self.binding.as_ref().map(|binding| match binding {
            Binding::Function(_) => BindingKind::Function,
            Binding::Contextual(_) => BindingKind::Contextual,
            Binding::Method(_) => BindingKind::Method,
            Binding::Closure(_) => BindingKind::Closure,
        })
    }
}

impl<Args: 'static, Ret: 'static> Delegate<Args, Ret> {
    /// Install a function-plus-context binding.
    ///
    /// The slot keeps a non-owning handle to `context` and passes the pointee
    /// as the callee's first parameter on every invocation; it never inspects
    /// the context itself. Keeping the context alive remains the caller's
    /// responsibility; once it is dropped, `invoke` reports
    /// [`DelegateError::ContextDropped`].
    pub fn bind_with_context<C: 'static>(
        &mut self,
        function: fn(&C, Args) -> Ret,
        context: &Rc<C>,
    ) {
        let context = Rc::downgrade(context);
        self.binding = Some(Binding::Contextual(Box::new(move |args| {
            let Some(context) = context.upgrade() else {
                return Err(DelegateError::ContextDropped);
            };
            Ok(function(context.as_ref(), args))
        })));
    }

    /// Install a bound-method binding.
    ///
    /// Stores a non-owning handle to `receiver` plus the method pointer; the
    /// receiver's lifetime is not extended. A dropped receiver reports
    /// [`DelegateError::ReceiverDropped`]; a receiver already mutably
    /// borrowed reports [`DelegateError::ReceiverBorrowed`].
    pub fn bind_method<U: 'static>(
        &mut self,
        receiver: &Rc<RefCell<U>>,
        method: fn(&mut U, Args) -> Ret,
    ) {
        let receiver = Rc::downgrade(receiver);
        self.binding = Some(Binding::Method(Box::new(move |args| {
            let Some(receiver) = receiver.upgrade() else {
                return Err(DelegateError::ReceiverDropped);
            };
            let mut receiver = receiver
                .try_borrow_mut()
                .map_err(|_| DelegateError::ReceiverBorrowed)?;
            Ok(method(&mut receiver, args))
        })));
    }

    /// Install a capturing-callable binding.
    ///
    /// Moves `callable` into a heap allocation the slot owns exclusively.
    /// This is the only binding kind that allocates for its callee; the
    /// allocation is released exactly once, on rebind, [`unbind`], or drop.
    ///
    /// [`unbind`]: Delegate::unbind
    pub fn bind_closure<F>(&mut self, callable: F)
    where
        F: FnMut(Args) -> Ret + 'static,
    {
        self.binding = Some(Binding::Closure(Box::new(callable)));
    }
}

impl<Args, Ret> Default for Delegate<Args, Ret> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args, Ret> fmt::Debug for Delegate<Args, Ret> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate").field("kind", &self.kind()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
