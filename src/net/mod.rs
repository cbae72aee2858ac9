//! # 随机 Petri 网模型（Stochastic Petri Net）
//!
//! 库所集合 `P`、迁移集合 `T` 与弧集合 `A ⊆ (P×T) ∪ (T×P)`，每条弧带正整数重数。
//! 迁移分为两类：
//!
//! * **定时迁移**（Timed）：使能后按延迟分布采样触发时刻；
//! * **瞬时迁移**（Immediate）：零时延，按权重在同时使能的瞬时迁移之间竞争。
//!
//! 库所要么保存匿名令牌，要么作为「维度持有者」保存一个连续标量（如能耗）。
//! 实体存放在以句柄寻址的仓库中，弧是只保存句柄的值记录。
//!
//! ## 示例
//!
//! ```rust
//! use RustSPN::net::*;
//!
//! let mut net = Net::empty();
//! let p0 = net.add_place(Place::new("p0", 1)).unwrap();
//! let p1 = net.add_place(Place::new("p1", 0)).unwrap();
//! let t0 = net
//!     .add_transition(Transition::timed("t0", DelayDistribution::exponential(2.0)))
//!     .unwrap();
//!
//! net.add_input_arc(p0, t0, 1).unwrap();
//! net.add_output_arc(t0, p1, 1).unwrap();
//!
//! assert_eq!(net.tokens(p0).unwrap(), 1);
//! assert!(net.arrival_transitions().is_empty());
//! ```

pub mod core;
pub mod description;
pub mod distribution;
pub mod guard;
pub mod ids;
pub mod index_vec;
pub mod io;
pub mod structure;

pub use self::core::{DiagnosticReport, EntityKind, Net, NetConfig, NetError};
pub use description::NetDescription;
pub use distribution::{DelayDistribution, Family, TimeUnit};
pub use guard::{Guard, GuardExpr, NetView};
pub use ids::{ArcId, PlaceId, TokenId, TransitionId};
pub use index_vec::{Idx, IndexVec};
pub use structure::{
    Arc, ArcKind, ChangeKind, DimensionChange, MemoryPolicy, Multiplicity, Place, PlaceContent,
    Token, Transition, TransitionClock, TransitionKind,
};
