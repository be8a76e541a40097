//! CLI command implementations.
//!
//! | Module      | Commands handled     |
//! |-------------|----------------------|
//! | `pipelines` | `Pipelines`          |
//! | `run`       | `Run`, `Status`      |
//! | `config`    | `Config`             |

pub mod config;
pub mod pipelines;
pub mod run;

pub use config::cmd_config;
pub use pipelines::cmd_pipelines;
pub use run::cmd_run;
