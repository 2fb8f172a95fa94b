//! Context engine: tool registry, message window and rolling summary.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 Context Engine                │
//! │                                               │
//! │  ┌──────────────┐ ┌────────────┐ ┌──────────┐ │
//! │  │ Tool         │ │ Message    │ │ Summary  │ │
//! │  │ Registry     │ │ Window     │ │          │ │
//! │  │              │ │            │ │ ·filter  │ │
//! │  │ ·definitions │ │ ·system    │ │ ·condense│ │
//! │  │ ·dispatch    │ │ ·tail(N)   │ │ ·merge   │ │
//! │  └──────────────┘ └────────────┘ └──────────┘ │
//! └───────────────────────────────────────────────┘
//! ```

pub mod summary;
pub mod tools;
pub mod window;

pub use summary::Summarizer;
pub use tools::{RegisteredTool, ToolError, ToolHandler, ToolRegistry, parse_args};
pub use window::MessageWindow;
