use candle_core::Device;

/// Metal when built with the `metal` feature and available, unless
/// `APP_DEVICE=cpu` pins the embedder to the CPU.
pub fn select_device() -> Device {
    let forced_cpu = std::env::var("APP_DEVICE").is_ok_and(|v| v.eq_ignore_ascii_case("cpu"));
    #[cfg(feature = "metal")]
    {
        if !forced_cpu {
            match Device::new_metal(0) {
                Ok(dev) => { tracing::info!(device = "metal", "embedding device selected"); return dev; }
                Err(e) => tracing::warn!(error = %e, "metal unavailable; falling back to cpu"),
            }
        }
    }
    tracing::info!(device = "cpu", forced = forced_cpu, "embedding device selected");
    Device::Cpu
}
