pub mod declarations;
pub mod executor;

pub use declarations::{tool_definitions, UserLocation, WebSearchOptions};
pub use executor::{ToolExecutor, ToolOutput};
