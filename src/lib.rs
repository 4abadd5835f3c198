pub use lgcpd_core as core;
pub use lgcpd_registration as registration;

/// Size the Rayon pool behind [`core::ComputeMode::Parallel`].
///
/// Optional: without it Rayon builds its default pool lazily. When called,
/// do so before the first registration; the returned value is the pool size.
/// See [`core::init_global_thread_pool`] for how the count is chosen.
pub fn init_thread_pool(num_threads: Option<usize>) -> lgcpd_core::Result<usize> {
    lgcpd_core::init_global_thread_pool(num_threads)
}
