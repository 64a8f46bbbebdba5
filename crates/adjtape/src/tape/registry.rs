//! Mapping from raw payload types to their overloaded wrappers.

use super::adj_float::AdjFloat;
use super::function::Function;
use super::graph::{SharedTape, get_working_tape};
use super::overloaded::Overloaded;
use crate::error::AdjointError;
use crate::field::Field;
use crate::value::Payload;
use log::trace;
use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;

type Constructor = Box<dyn Fn(Box<dyn Any>, &SharedTape) -> Option<Overloaded>>;

/// Constructors keyed by the [`TypeId`] of the raw value they wrap.
#[derive(Default)]
pub struct Registry {
    constructors: HashMap<TypeId, Constructor>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry knowing `f64`, `f32`, `Field`, `Vec<f64>` and the
    /// overloaded types themselves.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_payload::<f64>();
        registry.register_payload::<Field>();
        registry.register(|x: f32, tape| Overloaded::Float(AdjFloat::new_on(tape, f64::from(x))));
        registry.register(|data: Vec<f64>, tape| {
            Overloaded::Function(Function::new_on(tape, Field::from_slice(&data)))
        });
        // already overloaded values pass through unchanged
        registry.register(|x: AdjFloat, _| Overloaded::Float(x));
        registry.register(|f: Function, _| Overloaded::Function(f));
        registry.register(|o: Overloaded, _| o);
        registry
    }

    /// Register a constructor for `V`, replacing any previous one.
    pub fn register<V: Any>(&mut self, constructor: impl Fn(V, &SharedTape) -> Overloaded + 'static) {
        trace!("registering overloaded constructor for {}", type_name::<V>());
        self.constructors.insert(
            TypeId::of::<V>(),
            Box::new(move |value: Box<dyn Any>, tape: &SharedTape| {
                value
                    .downcast::<V>()
                    .ok()
                    .map(|value| constructor(*value, tape))
            }),
        );
    }

    /// Register a payload type through its [`Value`](crate::Value) conversion.
    pub fn register_payload<P: Payload + 'static>(&mut self) {
        self.register(|payload: P, tape| Overloaded::from_value_on(tape, payload.into()));
    }

    pub fn contains<V: Any>(&self) -> bool {
        self.constructors.contains_key(&TypeId::of::<V>())
    }

    /// Wrap `value` as a new leaf on `tape`.
    pub fn create<V: Any>(&self, value: V, tape: &SharedTape) -> Result<Overloaded, AdjointError> {
        let unsupported = AdjointError::UnsupportedPayload {
            type_name: type_name::<V>(),
        };
        let constructor = self
            .constructors
            .get(&TypeId::of::<V>())
            .ok_or_else(|| unsupported.clone())?;
        constructor(Box::new(value), tape).ok_or(unsupported)
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("num_types", &self.constructors.len())
            .finish()
    }
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::with_defaults());
}

/// Add or replace a constructor in this thread's registry.
pub fn register_overloaded<V: Any>(constructor: impl Fn(V, &SharedTape) -> Overloaded + 'static) {
    REGISTRY.with(|r| r.borrow_mut().register(constructor));
}

/// Wrap a raw value as an overloaded value on the working tape.
///
/// Fails with [`AdjointError::UnsupportedPayload`] for unregistered types.
///
/// # Example
///
/// ```
/// use adjtape::AdjointError;
/// use adjtape::tape::create_overloaded_object;
///
/// let x = create_overloaded_object(2.5_f64).unwrap();
/// assert_eq!(x.as_float().map(|x| x.value()), Some(2.5));
///
/// let err = create_overloaded_object("text").unwrap_err();
/// assert!(matches!(err, AdjointError::UnsupportedPayload { .. }));
/// ```
pub fn create_overloaded_object<V: Any>(value: V) -> Result<Overloaded, AdjointError> {
    let tape = get_working_tape();
    REGISTRY.with(|r| r.borrow().create(value, &tape))
}
