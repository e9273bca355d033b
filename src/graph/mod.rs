//! 响应图边界：外部响应图的 trait 抽象与离线关键词实现

pub mod keyword;
pub mod traits;

pub use keyword::{KeywordGraph, KeywordRouter, KeywordRule};
pub use traits::{EntryResponder, GraphError, RawState, ResponderGraph};
