/// Capability provider for the target the crate was compiled for
#[cfg(unix)]
pub type NativePlatform = c8run_unix::UnixPlatform;

#[cfg(windows)]
pub type NativePlatform = c8run_windows::WindowsPlatform;

#[cfg(not(any(unix, windows)))]
pub type NativePlatform = c8run_core::UnsupportedCapabilities;

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformFactory;

impl PlatformFactory {
    pub fn create_platform() -> NativePlatform {
        #[cfg(unix)]
        return c8run_unix::UnixPlatformFactory::create_platform();

        #[cfg(windows)]
        return c8run_windows::WindowsPlatformFactory::create_platform();

        #[cfg(not(any(unix, windows)))]
        return c8run_core::UnsupportedCapabilities::new(std::env::consts::OS);
    }

    pub fn platform_name() -> &'static str {
        #[cfg(unix)]
        return c8run_unix::UnixPlatformFactory::platform_name();

        #[cfg(windows)]
        return c8run_windows::WindowsPlatformFactory::platform_name();

        #[cfg(not(any(unix, windows)))]
        return std::env::consts::OS;
    }
}
