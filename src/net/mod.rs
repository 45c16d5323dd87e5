//! # 着色 Petri 网执行引擎
//!
//! 库所持有带类型令牌的多重集，迁移在守卫与弧注记的约束下消耗与产生令牌。
//! 对迁移 `t` 与绑定 `b`（自由变量到值的替换）：
//!
//! * `t` 在 `b` 下 **使能** 当且仅当守卫为真、每条输入弧的 `flow(b)` 不超过
//!   对应库所的令牌，且输入、输出令牌都满足库所类型约束；
//! * **激发** 后标识满足 `M' = M - Σ flow_in(b) + Σ flow_out(b)`；
//! * `modes()` 只在输入弧上搜索绑定（各弧局部模式的笛卡尔积 + 合一），
//!   再用守卫与类型检查过滤。
//!
//! ## 示例
//!
//! ```rust
//! use RustCPN::expr::Expression;
//! use RustCPN::net::*;
//!
//! let mut net = PetriNet::new("counter");
//! net.add_place(Place::new("p", [Value::Int(0), Value::Int(1), Value::Int(2)])).unwrap();
//! net.add_place(Place::new("q", [])).unwrap();
//! net.add_transition(Transition::with_guard("t", Expression::new("x != 1"))).unwrap();
//! net.add_input("p", "t", ArcAnnotation::variable("x").unwrap()).unwrap();
//! net.add_output("q", "t", ArcAnnotation::expression("x + 1")).unwrap();
//!
//! let modes = net.modes("t").unwrap();
//! assert_eq!(modes.len(), 2);
//! net.fire("t", &Substitution::with("x", 0)).unwrap();
//! assert_eq!(net.place("q").unwrap().tokens().to_string(), "{1}");
//! ```

pub mod annotation;
pub mod core;
pub mod error;
pub mod ids;
pub mod index_vec;
pub mod io;
pub mod marking;
pub mod multiset;
pub mod place;
pub mod substitution;
pub mod transition;
pub mod types;
pub mod value;

pub use annotation::ArcAnnotation;
pub use self::core::{NodeRef, PetriNet};
pub use error::{
    DomainError, FiringError, ModeError, NetError, NetResult, NodeKind, StructuralError,
    TokenError,
};
pub use ids::StateId;
pub use index_vec::{Idx, IndexVec};
pub use marking::Marking;
pub use multiset::MultiSet;
pub use place::Place;
pub use substitution::{Substitution, combine};
pub use transition::Transition;
pub use types::{AnyToken, KindOf, OneOf, Predicate, SharedType, TokenType, TypeSpec};
pub use value::{Value, ValueKind};
