#![allow(non_snake_case)]
//! 着色 Petri 网的定义、执行与可达图探索。

pub mod analysis;
pub mod config;
pub mod expr;
pub mod net;
pub mod options;
