//! Thread pool setup and backend selection.

use crate::{Error, Result};
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::num::NonZeroUsize;
use std::sync::OnceLock;

/// Environment variable read when no explicit thread count is given.
pub const THREADS_ENV: &str = "LGCPD_CPU_THREADS";

static GLOBAL_POOL: OnceLock<Result<usize>> = OnceLock::new();

/// Build the global Rayon pool once and return its size.
///
/// The thread count comes from `num_threads`, then `LGCPD_CPU_THREADS`, then
/// Rayon's own default. Only the first call configures the pool; later calls
/// return the first outcome unchanged.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<usize> {
    GLOBAL_POOL
        .get_or_init(|| {
            let env_value = match env::var(THREADS_ENV) {
                Ok(v) => Some(v),
                Err(env::VarError::NotPresent) => None,
                Err(e) => return Err(Error::InvalidInput(format!("{THREADS_ENV}: {e}"))),
            };

            let mut builder = ThreadPoolBuilder::new();
            if let Some(n) = requested_threads(num_threads, env_value.as_deref())? {
                builder = builder.num_threads(n.get());
            }
            builder
                .build_global()
                .map_err(|e| Error::InvalidInput(format!("global thread pool: {e}")))?;
            Ok(current_cpu_threads())
        })
        .clone()
}

pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

/// Thread count asked for, if any. An explicit count shadows the environment.
fn requested_threads(
    explicit: Option<usize>,
    env_value: Option<&str>,
) -> Result<Option<NonZeroUsize>> {
    match (explicit, env_value) {
        (Some(n), _) => NonZeroUsize::new(n)
            .map(Some)
            .ok_or_else(|| invalid_thread_count(n)),
        (None, Some(raw)) => raw
            .trim()
            .parse::<NonZeroUsize>()
            .map(Some)
            .map_err(|_| invalid_thread_count(format!("{THREADS_ENV}={raw:?}"))),
        (None, None) => Ok(None),
    }
}

fn invalid_thread_count(value: impl Display) -> Error {
    Error::invalid_parameter("num_threads", value, "a positive integer")
}

/// Numeric backend requested in a configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeMode {
    /// Pick a backend from the available parallelism.
    #[default]
    Auto,
    /// Single-threaded.
    Serial,
    /// Data-parallel over the Rayon pool.
    Parallel,
}

/// Backend an engine actually runs on, fixed once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Serial,
    Parallel,
}

impl ComputeMode {
    pub fn resolve(self) -> Backend {
        match self {
            ComputeMode::Serial => Backend::Serial,
            ComputeMode::Parallel => Backend::Parallel,
            ComputeMode::Auto => {
                if current_cpu_threads() > 1 {
                    Backend::Parallel
                } else {
                    Backend::Serial
                }
            }
        }
    }
}
