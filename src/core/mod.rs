pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, ErrorKind, Result};
pub use types::{Mode, Row, ShardId, Statement};
pub use value::{FromValue, Value};
