pub mod config;
pub mod dom;
pub mod events;
pub mod interpreter;
pub mod navigation;
pub mod net;
pub mod scheduler;
pub mod session;
pub mod value;

pub use config::InterpreterConfig;
pub use dom::{Document, NodeHandle};
pub use events::{DispatchOutcome, EventRecord, NativeEvent};
pub use interpreter::{BatchError, BatchSummary, DomEdit, EditError, Interpreter, NodeId};
pub use session::Session;
pub use value::BoundaryValue;
