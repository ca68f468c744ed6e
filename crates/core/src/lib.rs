pub mod config;
pub mod cursor;
pub mod error;
pub mod field_value;
pub mod hlc;
pub mod ids;
pub mod presence;
pub mod protocol;
pub mod time;

pub use config::SyncConfig;
pub use cursor::SyncCursor;
pub use error::CoreError;
pub use field_value::{FieldKind, FormName};
pub use hlc::Hlc;
pub use ids::*;
pub use presence::ActiveUser;
pub use time::{ManualTime, SystemClock, TimeSource};
