//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module       | Commands handled                                               |
//! |--------------|-----------------------------------------------------------------|
//! | `lifecycle`  | `Start`, `Advance`, `Fail`, `Pause`, `Resume`, `Cancel`, `Recover` |
//! | `query`      | `Status`, `List`, `Workflows`                                  |
//! | `events`     | `Emit`, `Events`, `Consolidate`                                |
//! | `checkpoint` | `Checkpoint`                                                   |
//! | `drive`      | `Drive`                                                        |
//! | `cleanup`    | `Cleanup`                                                      |
//! | `config`     | `Config`                                                       |
//! | `item`       | `Item`                                                         |

pub mod checkpoint;
pub mod cleanup;
pub mod config;
pub mod drive;
pub mod events;
pub mod item;
pub mod lifecycle;
pub mod query;
mod session;

pub use checkpoint::cmd_checkpoint;
pub use cleanup::cmd_cleanup;
pub use config::cmd_config;
pub use drive::cmd_drive;
pub use events::{EmitArgs, EventQuery, cmd_consolidate, cmd_emit, cmd_events};
pub use item::cmd_item;
pub use lifecycle::{cmd_advance, cmd_cancel, cmd_fail, cmd_pause, cmd_recover, cmd_resume, cmd_start};
pub use query::{ListArgs, cmd_list, cmd_status, cmd_workflows};
pub use session::Session;
