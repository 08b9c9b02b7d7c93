//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `serve`   | `Serve`, `InitDb` |
//! | `tasks`   | `Tasks`, `Stages` |
//! | `compare` | `Compare`         |

pub mod compare;
pub mod serve;
pub mod tasks;

pub use compare::cmd_compare;
pub use serve::{cmd_init_db, cmd_serve};
pub use tasks::{cmd_stages, cmd_tasks};
