//! pyscript-runtime - evaluator for the PyScript Python subset
//!
//! Scripts run inside a [`Session`]: an isolated global namespace governed by a
//! [`CapabilityPolicy`]. Sessions are interruptible from other threads through their
//! [`SessionControl`], and can be recycled with a [`SessionPool`].
//!
//! # Example
//!
//! ```
//! use pyscript_runtime::{CapabilityPolicy, Session, Value};
//! use std::sync::Arc;
//!
//! let mut session = Session::new(Arc::new(CapabilityPolicy::default()));
//! session.set_global("params", Value::Int(3));
//! let result = session.eval_source("params * 2").unwrap();
//! assert_eq!(result, Value::Int(6));
//! ```

pub mod builtins;
pub mod console;
pub mod error;
pub mod interpreter;
pub mod modules;
pub mod ops;
pub mod policy;
pub mod pool;
pub mod session;
pub mod value;

pub use error::{
    ExceptionKind, RuntimeError, RuntimeResult, SessionError, SessionResult, TraceFrame,
};
pub use interpreter::Interpreter;
pub use policy::CapabilityPolicy;
pub use pool::SessionPool;
pub use session::{Session, SessionControl};
pub use value::{DictKey, Value};
