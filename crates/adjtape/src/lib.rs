//! adjtape - reverse-mode automatic differentiation on a recorded tape
//!
//! Operations on overloaded values ([`tape::AdjFloat`], [`tape::Function`])
//! are recorded as blocks. The recorded tape yields gradients, tangents and
//! Hessian actions with respect to chosen controls, and can be replayed at
//! new control values.
//!
//! # Example
//!
//! ```
//! use adjtape::{Field, Value};
//! use adjtape::tape::{AdjFloat, Control, Function, ReducedFunctional, Tape, push_working_tape};
//!
//! let _guard = push_working_tape(Tape::shared());
//!
//! // u = c everywhere, then u *= c
//! let c = AdjFloat::new(2.0);
//! let mut u = Function::new(Field::zeros(&[3]));
//! u.assign(&c).unwrap();
//! u.scale_by(&c);
//!
//! let rf = ReducedFunctional::new(&u, vec![Control::new(&c)]);
//! // d/dc sum(c^2) over three entries
//! assert_eq!(rf.derivative().unwrap(), vec![Value::Float(12.0)]);
//!
//! let at_three = rf.call(&[Value::Float(3.0)]).unwrap();
//! assert_eq!(at_three.sum(), 27.0);
//! ```

pub mod error;
pub mod field;
pub mod tape;
pub mod value;
#[cfg(feature = "verification")]
pub mod verification;

pub use error::AdjointError;
pub use field::Field;
pub use value::{Payload, Value};
