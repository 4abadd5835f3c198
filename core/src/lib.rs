pub mod error;
pub mod linalg;
pub mod point_cloud;
pub mod runtime;

pub use error::{Error, Result};
pub use linalg::{is_positive_semi_definite, solve_linear_system, SolveMethod};
pub use point_cloud::*;
pub use runtime::{current_cpu_threads, init_global_thread_pool, Backend, ComputeMode};
