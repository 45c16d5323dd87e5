//! 基于执行引擎的分析：可达图构造与导出。
pub mod reachability;

pub use reachability::{
    FiringLabel, StateGraph, StateGraphConfig, StateGraphExport, StateGraphStats, StateRecord,
};
